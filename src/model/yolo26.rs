// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/yolo26.rs - YOLO26 RKNN 模型
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::{RgbImage, imageops::FilterType};
use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectItem, DetectResult, Model},
};

const YOLO26_NUM_INPUTS: u32 = 1;
const YOLO26_NUM_OUTPUTS: u32 = 6;
const YOLO26_INPUT_W: u32 = 640;
const YOLO26_INPUT_H: u32 = 640;
const YOLO26_HEAD_SIZES: [(usize, usize); 3] = [(80, 80), (40, 40), (20, 20)];
const YOLO26_STRIDES: [f32; 3] = [8.0, 16.0, 32.0];
const YOLO26_DEFAULT_CONFIDENCE: f32 = 0.5;

pub struct Yolo26 {
  context: Context,
  confidence: f32,
}

#[derive(Error, Debug)]
pub enum Yolo26Error {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型输出形状错误: {0}")]
  OutputShape(String),
}

impl Yolo26Error {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    Yolo26Error::ModelInvalid(msg.to_string(), e)
  }
}

pub struct Yolo26Builder {
  model_path: String,
  confidence: f32,
  flags: InitFlags,
}

impl FromUrlWithScheme for Yolo26Builder {
  const SCHEME: &'static str = "yolo26";
}

impl FromUrl for Yolo26Builder {
  type Error = Yolo26Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolo26Error::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let confidence = match url.query_pairs().find(|(k, _)| k == "confidence") {
      Some((_, v)) => v
        .parse::<f32>()
        .ok()
        .filter(|c| (0.0..=1.0).contains(c))
        .ok_or_else(|| Yolo26Error::ModelPathError(format!("置信度阈值无效: {}", v)))?,
      None => YOLO26_DEFAULT_CONFIDENCE,
    };

    Ok(Yolo26Builder {
      model_path: url.path().to_string(),
      confidence,
      flags: InitFlags::default(),
    })
  }
}

impl Yolo26Builder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build(self) -> Result<Yolo26, Yolo26Error> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, self.flags)?;

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(Yolo26Error::invalid("无法查询 SDK 版本", e));
      }
    }

    let num_inputs = context
      .num_inputs()
      .map_err(|e| Yolo26Error::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| Yolo26Error::invalid("无法获取输出数量", e))?;

    if num_inputs != YOLO26_NUM_INPUTS || num_outputs != YOLO26_NUM_OUTPUTS {
      let msg = format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        YOLO26_NUM_INPUTS, YOLO26_NUM_OUTPUTS, num_inputs, num_outputs
      );
      error!("{}", msg);
      return Err(Yolo26Error::invalid(&msg, rknpu::Error::InvalidModel));
    }

    info!("模型加载完成，置信度阈值 {:.2}", self.confidence);
    Ok(Yolo26 {
      context,
      confidence: self.confidence,
    })
  }
}

/// 根据张量大小匹配回归和分类输出，返回 (reg, cls)
///
/// 回归输出固定为 `4 * spatial`，分类输出为 `num_classes * spatial`。
/// 类别数恰好为 4 时两者大小相同，按输出顺序取前者为回归。
fn match_reg_cls_tensors<'a>(
  tensor1: &'a [f32],
  tensor2: &'a [f32],
  spatial: usize,
) -> Option<(&'a [f32], &'a [f32])> {
  let reg_expected = 4 * spatial;
  let is_cls = |t: &[f32]| !t.is_empty() && t.len() % spatial == 0;
  if tensor1.len() == reg_expected && is_cls(tensor2) {
    Some((tensor1, tensor2))
  } else if tensor2.len() == reg_expected && is_cls(tensor1) {
    Some((tensor2, tensor1))
  } else {
    None
  }
}

/// 解码单个检测头，类别数由分类张量大小推出
fn decode_head(
  reg: &[f32],
  cls: &[f32],
  (map_h, map_w): (usize, usize),
  stride: f32,
  confidence: f32,
  items: &mut Vec<DetectItem>,
) {
  let spatial = map_h * map_w;
  let num_classes = cls.len() / spatial;
  let (input_w, input_h) = (YOLO26_INPUT_W as f32, YOLO26_INPUT_H as f32);

  for h in 0..map_h {
    for w in 0..map_w {
      let idx = h * map_w + w;

      let (max_logit, class_id) = (0..num_classes)
        .map(|c| (cls[c * spatial + idx], c))
        .fold((f32::MIN, 0), |best, cur| if cur.0 > best.0 { cur } else { best });
      let score = sigmoid(max_logit);
      if score <= confidence {
        continue;
      }

      let grid_x = (w as f32) + 0.5;
      let grid_y = (h as f32) + 0.5;

      let xmin = ((grid_x - reg[idx]) * stride).clamp(0.0, input_w);
      let ymin = ((grid_y - reg[spatial + idx]) * stride).clamp(0.0, input_h);
      let xmax = ((grid_x + reg[2 * spatial + idx]) * stride).clamp(0.0, input_w);
      let ymax = ((grid_y + reg[3 * spatial + idx]) * stride).clamp(0.0, input_h);

      items.push(DetectItem {
        class_id: class_id as u32,
        score,
        bbox: [
          xmin / input_w,
          ymin / input_h,
          xmax / input_w,
          ymax / input_h,
        ],
      });
    }
  }
}

/// 按 (reg, cls) 成对排列的 6 个输出解码为检测结果
fn decode_outputs(tensors: &[&[f32]], confidence: f32) -> Result<Vec<DetectItem>, Yolo26Error> {
  if tensors.len() != YOLO26_NUM_OUTPUTS as usize {
    return Err(Yolo26Error::OutputShape(format!(
      "预期 {} 个输出，实际为 {}",
      YOLO26_NUM_OUTPUTS,
      tensors.len()
    )));
  }

  let mut items = Vec::new();
  let mut num_classes = None;

  for (head_idx, (&head_size, stride)) in
    YOLO26_HEAD_SIZES.iter().zip(YOLO26_STRIDES).enumerate()
  {
    let spatial = head_size.0 * head_size.1;
    let (tensor1, tensor2) = (tensors[head_idx * 2], tensors[head_idx * 2 + 1]);

    let (reg, cls) = match_reg_cls_tensors(tensor1, tensor2, spatial).ok_or_else(|| {
      Yolo26Error::OutputShape(format!(
        "检测头 {}: 张量1 {}, 张量2 {}, 空间大小 {}",
        head_idx,
        tensor1.len(),
        tensor2.len(),
        spatial
      ))
    })?;

    let head_classes = cls.len() / spatial;
    match num_classes {
      None => num_classes = Some(head_classes),
      Some(n) if n != head_classes => {
        return Err(Yolo26Error::OutputShape(format!(
          "检测头 {} 的类别数 {} 与前一检测头的 {} 不一致",
          head_idx, head_classes, n
        )));
      }
      Some(_) => {}
    }

    decode_head(reg, cls, head_size, stride, confidence, &mut items);
  }

  debug!(
    "检测到 {} 个物体（{} 类）",
    items.len(),
    num_classes.unwrap_or_default()
  );
  Ok(items)
}

impl Yolo26 {
  /// 拉伸到模型输入尺寸；输出框为归一化坐标，可直接映射回原图
  fn preprocess(input: &RgbImage) -> Vec<u8> {
    if input.width() == YOLO26_INPUT_W && input.height() == YOLO26_INPUT_H {
      return input.as_raw().clone();
    }
    image::imageops::resize(input, YOLO26_INPUT_W, YOLO26_INPUT_H, FilterType::Triangle).into_raw()
  }

  fn postprocess(&self, output: rknpu::Output) -> Result<DetectResult, Yolo26Error> {
    debug!("后处理模型输出");
    let tensors = (0..YOLO26_NUM_OUTPUTS as usize)
      .map(|idx| {
        output
          .get_f32(idx)
          .map_err(|e| Yolo26Error::OutputShape(format!("获取第 {} 个输出失败: {}", idx, e)))
      })
      .collect::<Result<Vec<_>, _>>()?;

    decode_outputs(&tensors, self.confidence).map(DetectResult::new)
  }
}

impl Model for Yolo26 {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = Yolo26Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let data = Self::preprocess(input);

    debug!("设置模型输入");
    self
      .context
      .set_input(0, &data, TensorFormat::NHWC, TensorType::UInt8)?;

    debug!("执行模型推理");
    self.context.run()?;

    let output = self.context.get_outputs()?;
    self.postprocess(output)
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}
