// 该文件是 Kanjian （看见） 项目的一部分。
// src/task/video.rs - 视频逐帧检测任务
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

use std::{path::Path, sync::Arc, time::Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  codec::VideoCodec,
  detector::{Detector, DetectorError},
  frame::{Resolution, crop_to},
  input::InputError,
  output::{OutputError, draw::Draw},
  task::Task,
};

#[derive(Error, Debug)]
pub enum VideoTaskError {
  #[error("failed to read video: {0}")]
  Input(#[from] InputError),
  #[error("failed to write video: {0}")]
  Output(#[from] OutputError),
  #[error(transparent)]
  Detect(#[from] DetectorError),
  #[error("video resolution {0} is too small to encode")]
  InvalidResolution(Resolution),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VideoStats {
  /// 输出视频的分辨率，宽高均为偶数
  pub resolution: Resolution,
  pub fps: f64,
  /// 视频不做逐帧类别汇总，始终为空
  pub detected_objects: Vec<String>,
}

#[derive(Clone)]
pub struct VideoTask {
  detector: Arc<Detector>,
  draw: Arc<Draw>,
  codec: Arc<dyn VideoCodec>,
}

impl VideoTask {
  pub fn new(detector: Arc<Detector>, draw: Arc<Draw>, codec: Arc<dyn VideoCodec>) -> Self {
    Self {
      detector,
      draw,
      codec,
    }
  }

  fn process(&self, source: &Path, result: &Path) -> Result<VideoStats, VideoTaskError> {
    let mut input = self.codec.open_source(source)?;
    let rate = input.frame_rate().or_default();
    let native = input.resolution();
    let resolution = native.even();
    if resolution.is_empty() {
      return Err(VideoTaskError::InvalidResolution(native));
    }
    info!(
      "视频 {} -> {} @ {:.2} fps",
      native,
      resolution,
      rate.as_f64()
    );

    let mut output = self.codec.open_sink(result, resolution, rate)?;

    let now = Instant::now();
    let mut frames = 0u64;
    for frame in input.by_ref() {
      let frame = frame?;
      let detection = self.detector.detect(&frame.image)?;
      let annotated = crop_to(detection.plot(&frame.image, &self.draw), resolution);
      output.write_frame(&annotated)?;
      frames += 1;
      debug!("第 {} 帧检测到 {} 个对象", frame.index, detection.result.len());
    }
    output.finish()?;

    info!(
      "视频检测完成，共 {} 帧，耗时 {:.2?}",
      frames,
      now.elapsed()
    );

    Ok(VideoStats {
      resolution,
      fps: rate.as_f64(),
      detected_objects: Vec::new(),
    })
  }
}

impl Task for VideoTask {
  type Stats = VideoStats;
  type Error = VideoTaskError;

  fn run_task(&self, source: &Path, result: &Path) -> Result<VideoStats, VideoTaskError> {
    info!("开始视频检测: {}", source.display());
    self.process(source, result).inspect_err(|e| {
      error!("视频处理失败 {}: {}", source.display(), e);
    })
  }
}
