// 该文件是 Kanjian （看见） 项目的一部分。
// src/task/image.rs - 单张图像检测任务
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

use std::{path::Path, sync::Arc};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::{
  detector::{Detector, DetectorError},
  frame::Resolution,
  output::{SaveImageFileError, draw::Draw, save_image_atomic},
  task::Task,
};

#[derive(Error, Debug)]
pub enum ImageTaskError {
  #[error(transparent)]
  Detect(#[from] DetectorError),
  #[error("failed to save annotated image: {0}")]
  Save(#[from] SaveImageFileError),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageStats {
  /// 推理耗时（毫秒）
  pub inference_time: f64,
  pub resolution: Resolution,
  /// 去重后的类别名称
  pub detected_objects: Vec<String>,
}

#[derive(Clone)]
pub struct ImageTask {
  detector: Arc<Detector>,
  draw: Arc<Draw>,
}

impl ImageTask {
  pub fn new(detector: Arc<Detector>, draw: Arc<Draw>) -> Self {
    Self { detector, draw }
  }
}

impl Task for ImageTask {
  type Stats = ImageStats;
  type Error = ImageTaskError;

  fn run_task(&self, source: &Path, result: &Path) -> Result<ImageStats, ImageTaskError> {
    info!("开始图像检测: {}", source.display());
    let (image, detection) = self.detector.detect_path(source)?;

    let annotated = detection.plot(&image, &self.draw);
    save_image_atomic(&annotated, result)?;

    let stats = ImageStats {
      inference_time: detection.speed.inference,
      resolution: detection.orig_shape,
      detected_objects: detection.class_names().into_iter().collect(),
    };
    info!(
      "图像检测完成，耗时 {:.2} ms，类别: {:?}",
      stats.inference_time, stats.detected_objects
    );
    Ok(stats)
  }
}

#[cfg(test)]
mod tests {
  use image::{ImageReader, RgbImage};

  use super::*;
  use crate::model::{DetectItem, DetectResult, Labels, Model, ModelError};

  struct ThreeClasses;

  impl Model for ThreeClasses {
    type Input = RgbImage;
    type Output = DetectResult;
    type Error = ModelError;

    fn infer(&self, _input: &RgbImage) -> Result<DetectResult, ModelError> {
      let items = [0, 0, 2, 2, 2, 15]
        .into_iter()
        .map(|class_id| DetectItem {
          class_id,
          score: 0.9,
          bbox: [0.2, 0.2, 0.6, 0.6],
        })
        .collect();
      Ok(DetectResult::new(items))
    }
  }

  fn task() -> ImageTask {
    let detector = Detector::new(Arc::new(ThreeClasses), Labels::coco());
    ImageTask::new(Arc::new(detector), Arc::new(Draw::default()))
  }

  #[test]
  fn annotated_image_and_unique_classes() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.png");
    let result = dir.path().join("result_in.png");
    RgbImage::new(40, 30).save(&source).unwrap();

    let stats = task().run_task(&source, &result).unwrap();
    assert_eq!(stats.resolution.to_string(), "40x30");
    assert_eq!(stats.detected_objects, vec!["car", "cat", "person"]);
    assert!(stats.inference_time >= 0.0);

    let saved = ImageReader::open(&result).unwrap().decode().unwrap().to_rgb8();
    assert_eq!(saved.dimensions(), (40, 30));
    assert_ne!(saved, RgbImage::new(40, 30));
  }

  #[test]
  fn broken_upload_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.jpg");
    let result = dir.path().join("result_in.jpg");
    std::fs::write(&source, b"not a jpeg").unwrap();

    assert!(matches!(
      task().run_task(&source, &result),
      Err(ImageTaskError::Detect(_))
    ));
    assert!(!result.exists());
  }
}
