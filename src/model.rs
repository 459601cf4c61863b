// 该文件是 Kanjian （看见） 项目的一部分。
// src/model.rs - 模型
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

use std::sync::Arc;

use image::RgbImage;
use thiserror::Error;
use url::Url;

#[cfg(feature = "model_yolo26")]
use crate::{FromUrl, FromUrlWithScheme};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，归一化坐标
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn new(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &DetectItem> {
    self.items.iter()
  }
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[cfg(feature = "model_yolo26")]
  #[error("YOLO26 model error: {0}")]
  Yolo26(#[from] Yolo26Error),
  #[error("unsupported model scheme: {0}")]
  SchemeMismatch(String),
  #[error("inference failed: {0}")]
  Inference(String),
  #[error("model worker is no longer running")]
  WorkerGone,
}

/// 服务端共享的检测模型
pub type SharedModel =
  Arc<dyn Model<Input = RgbImage, Output = DetectResult, Error = ModelError> + Send + Sync>;

/// 根据 URL 方案加载模型，模型由独立的工作线程持有
pub fn load_model(url: &Url) -> Result<SharedModel, ModelError> {
  match url.scheme() {
    #[cfg(feature = "model_yolo26")]
    Yolo26Builder::SCHEME => {
      let builder = Yolo26Builder::from_url(url)?;
      let worker = ModelWorker::spawn(move || builder.build())?;
      Ok(Arc::new(worker))
    }
    other => Err(ModelError::SchemeMismatch(other.to_string())),
  }
}

mod labels;
pub use self::labels::Labels;

mod worker;
pub use self::worker::ModelWorker;

#[cfg(feature = "model_yolo26")]
mod yolo26;
#[cfg(feature = "model_yolo26")]
pub use self::yolo26::{Yolo26, Yolo26Builder, Yolo26Error};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("onnx:///models/best.onnx").unwrap();
    match load_model(&url) {
      Err(ModelError::SchemeMismatch(scheme)) => assert_eq!(scheme, "onnx"),
      Err(e) => panic!("unexpected error: {e}"),
      Ok(_) => panic!("onnx scheme must not load"),
    }
  }
}
