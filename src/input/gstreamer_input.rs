// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频文件输入
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

//! # GStreamer 视频文件输入模块
//!
//! 使用 `decodebin` 解码任意容器中的视频流，统一转换为 RGB 帧。
//!
//! 管道结构：
//!
//! ```text
//! filesrc ! decodebin ! videoconvert ! video/x-raw,format=RGB ! appsink
//! ```
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev \
//!   gstreamer1.0-plugins-good gstreamer1.0-plugins-ugly gstreamer1.0-libav
//! ```

use std::{
  path::Path,
  time::{Duration, Instant},
};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  frame::{Frame, FrameRate, Resolution, unpad_rows},
  input::{FrameSource, InputError},
};

const PULL_INTERVAL_MS: u64 = 100;
const STALL_TIMEOUT_SECS: u64 = 30;

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// 无法获取 appsink 元素
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  /// 无法转换元素为 appsink
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  /// 无法获取 filesrc 元素
  #[error("Failed to get filesrc element")]
  FileSrcNotFound,
  /// 输入路径不是合法的 UTF-8
  #[error("Invalid input path: {0}")]
  InvalidPath(String),
  /// 无法从 caps 获取视频信息
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 视频中没有任何帧
  #[error("No video frames in input")]
  NoFrames,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 缓冲区大小不匹配
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  /// 长时间未收到新帧
  #[error("Timed out waiting for the next frame")]
  Stalled,
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

/// GStreamer 视频文件输入
///
/// 打开时拉取第一帧以确定分辨率和帧率，该帧会作为迭代的第一项返回。
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  resolution: Resolution,
  rate: FrameRate,
  stride: usize,
  pending: Option<gst::Sample>,
  index: u64,
  done: bool,
}

impl GStreamerInput {
  pub fn open(path: &Path) -> Result<Self, GStreamerInputError> {
    gst::init()?;

    let location = path
      .to_str()
      .ok_or_else(|| GStreamerInputError::InvalidPath(path.display().to_string()))?;

    let pipeline_desc = "filesrc name=src ! decodebin ! videoconvert ! video/x-raw,format=RGB ! appsink name=sink sync=false max-buffers=4";
    info!("GStreamer pipeline description: {}", pipeline_desc);

    let pipeline = gst::parse::launch(pipeline_desc)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    pipeline
      .by_name("src")
      .ok_or(GStreamerInputError::FileSrcNotFound)?
      .set_property("location", location);

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;

    let mut input = GStreamerInput {
      pipeline,
      appsink,
      resolution: Resolution::default(),
      rate: FrameRate::default(),
      stride: 0,
      pending: None,
      index: 0,
      done: false,
    };

    let first = input.pull()?.ok_or(GStreamerInputError::NoFrames)?;
    let caps = first
      .caps()
      .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;
    let video_info =
      gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

    input.resolution = Resolution::new(video_info.width(), video_info.height());
    let fps = video_info.fps();
    input.rate = FrameRate::new(fps.numer(), fps.denom()).or_default();
    input.stride = video_info.stride()[0] as usize;
    input.pending = Some(first);

    info!(
      "Video input opened: {} @ {:.2} fps <- {}",
      input.resolution,
      input.rate.as_f64(),
      location
    );

    Ok(input)
  }

  fn check_bus(&self) -> Result<(), GStreamerInputError> {
    if let Some(bus) = self.pipeline.bus()
      && let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error])
      && let gst::MessageView::Error(err) = msg.view()
    {
      return Err(GStreamerInputError::PipelineError(format!(
        "{} ({})",
        err.error(),
        err.debug().map(|d| d.to_string()).unwrap_or_default()
      )));
    }
    Ok(())
  }

  /// 拉取下一个样本；流结束时返回 `None`
  fn pull(&self) -> Result<Option<gst::Sample>, GStreamerInputError> {
    let started = Instant::now();
    loop {
      if let Some(sample) = self
        .appsink
        .try_pull_sample(gst::ClockTime::from_mseconds(PULL_INTERVAL_MS))
      {
        return Ok(Some(sample));
      }
      self.check_bus()?;
      if self.appsink.is_eos() {
        return Ok(None);
      }
      if started.elapsed() > Duration::from_secs(STALL_TIMEOUT_SECS) {
        return Err(GStreamerInputError::Stalled);
      }
    }
  }

  fn convert(&self, sample: &gst::Sample) -> Result<RgbImage, GStreamerInputError> {
    let buffer = sample
      .buffer()
      .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
    let map = buffer.map_readable().map_err(|e| {
      GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
    })?;

    let width = self.resolution.width;
    let height = self.resolution.height;
    let data = unpad_rows(
      map.as_slice(),
      width as usize * 3,
      self.stride,
      height as usize,
    )
    .ok_or(GStreamerInputError::BufferSizeMismatch {
      expected: self.stride * height as usize,
      actual: map.size(),
    })?;

    RgbImage::from_raw(width, height, data).ok_or(GStreamerInputError::BufferSizeMismatch {
      expected: self.resolution.rgb_len(),
      actual: map.size(),
    })
  }

  fn next_frame(&mut self) -> Result<Option<Frame>, GStreamerInputError> {
    let sample = match self.pending.take() {
      Some(sample) => sample,
      None => match self.pull()? {
        Some(sample) => sample,
        None => return Ok(None),
      },
    };

    let image = self.convert(&sample)?;
    let frame = Frame {
      image,
      index: self.index,
    };
    self.index += 1;
    Ok(Some(frame))
  }
}

impl Iterator for GStreamerInput {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.done {
      return None;
    }

    match self.next_frame() {
      Ok(Some(frame)) => Some(Ok(frame)),
      Ok(None) => {
        debug!("视频读取结束，共 {} 帧", self.index);
        self.done = true;
        None
      }
      Err(e) => {
        self.done = true;
        Some(Err(e.into()))
      }
    }
  }
}

impl FrameSource for GStreamerInput {
  fn resolution(&self) -> Resolution {
    self.resolution
  }

  fn frame_rate(&self) -> FrameRate {
    self.rate
  }
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}
