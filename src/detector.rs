// 该文件是 Kanjian （看见） 项目的一部分。
// src/detector.rs - 目标检测适配层
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

use std::{
  collections::BTreeSet,
  path::{Path, PathBuf},
  sync::Arc,
  time::Instant,
};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::debug;

use crate::{
  frame::Resolution,
  model::{DetectResult, Labels, ModelError, SharedModel},
  output::draw::Draw,
};

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("failed to read image {}: {source}", .path.display())]
  ImageRead {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
  #[error("failed to open image {}: {source}", .path.display())]
  ImageOpen {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error(transparent)]
  Model(#[from] ModelError),
}

/// 各阶段耗时（毫秒）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Speed {
  pub preprocess: f64,
  pub inference: f64,
}

/// 单次检测的结果：检测框、类别名称表、耗时与原图尺寸
#[derive(Debug, Clone)]
pub struct Detection {
  pub result: DetectResult,
  pub speed: Speed,
  pub orig_shape: Resolution,
  names: Arc<Labels>,
}

impl Detection {
  /// 去重后的类别名称；同一类别的多个框只计一次
  pub fn class_names(&self) -> BTreeSet<String> {
    self
      .result
      .iter()
      .map(|item| self.names.name(item.class_id).to_string())
      .collect()
  }

  /// 返回绘制了检测框与标签的图像副本
  pub fn plot(&self, image: &RgbImage, draw: &Draw) -> RgbImage {
    let mut annotated = image.clone();
    draw.draw_detections(&mut annotated, &self.result, &self.names);
    annotated
  }
}

/// 检测模型的调用入口，进程内只创建一次
pub struct Detector {
  model: SharedModel,
  labels: Arc<Labels>,
}

impl Detector {
  pub fn new(model: SharedModel, labels: Labels) -> Self {
    Self {
      model,
      labels: Arc::new(labels),
    }
  }

  /// 对一帧图像执行一次推理，不做重试
  pub fn detect(&self, image: &RgbImage) -> Result<Detection, DetectorError> {
    let now = Instant::now();
    let result = self.model.infer(image)?;
    let inference = now.elapsed().as_secs_f64() * 1000.0;
    debug!("推理完成，耗时 {:.2} ms，检测到 {} 个对象", inference, result.len());

    Ok(Detection {
      result,
      speed: Speed {
        preprocess: 0.0,
        inference,
      },
      orig_shape: Resolution::of(image),
      names: self.labels.clone(),
    })
  }

  /// 读取并解码图像文件后检测，返回解码后的图像与检测结果
  pub fn detect_path(&self, path: &Path) -> Result<(RgbImage, Detection), DetectorError> {
    let now = Instant::now();
    let image = ImageReader::open(path)
      .map_err(|source| DetectorError::ImageOpen {
        path: path.to_path_buf(),
        source,
      })?
      .with_guessed_format()
      .map_err(|source| DetectorError::ImageOpen {
        path: path.to_path_buf(),
        source,
      })?
      .decode()
      .map_err(|source| DetectorError::ImageRead {
        path: path.to_path_buf(),
        source,
      })?
      .to_rgb8();
    let preprocess = now.elapsed().as_secs_f64() * 1000.0;

    let mut detection = self.detect(&image)?;
    detection.speed.preprocess = preprocess;
    Ok((image, detection))
  }
}
