// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/gstreamer_video_output.rs - GStreamer 视频文件输出
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

//! # GStreamer 视频文件输出模块
//!
//! 将标注后的视频帧编码保存为文件，编码器按容器选择：
//!
//! - **MP4 / MOV / AVI** - H.264（x264enc），播放兼容性最好
//! - **WebM** - VP8，WebM 容器不支持 H.264
//!
//! 管道结构：
//!
//! ```text
//! appsrc ! videoconvert ! video/x-raw,format=I420 ! <encoder> ! <muxer> ! filesink
//! ```

use std::path::Path;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  frame::{FrameRate, Resolution, pad_rows},
  output::{FrameSink, OutputError},
};

const FINISH_TIMEOUT_SECS: u64 = 60;

/// GStreamer 视频输出错误类型
#[derive(Error, Debug)]
pub enum GStreamerVideoOutputError {
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsrc 元素
  #[error("Failed to get appsrc element")]
  AppSrcNotFound,
  /// 无法转换元素为 appsrc
  #[error("Failed to convert element to appsrc")]
  AppSrcConversionFailed,
  /// 无法获取 filesink 元素
  #[error("Failed to get filesink element")]
  FileSinkNotFound,
  /// 输出路径不是合法的 UTF-8
  #[error("Invalid output path: {0}")]
  InvalidPath(String),
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  /// 推送缓冲区失败
  #[error("Flow error: {0:?}")]
  FlowError(gst::FlowError),
  /// 等待编码结束超时
  #[error("Timed out waiting for the encoder to finish")]
  FinishTimeout,
}

/// 按容器扩展名选择编码与封装
fn encoder_for(path: &Path) -> &'static str {
  let ext = path
    .extension()
    .map(|e| e.to_string_lossy().to_ascii_lowercase())
    .unwrap_or_default();
  match ext.as_str() {
    "webm" => "vp8enc deadline=1 ! webmmux",
    "avi" => "x264enc speed-preset=fast ! h264parse ! avimux",
    "mov" => "x264enc speed-preset=fast ! h264parse ! qtmux",
    _ => "x264enc speed-preset=fast ! h264parse ! mp4mux",
  }
}

fn bus_error(err: &gst::message::Error) -> GStreamerVideoOutputError {
  GStreamerVideoOutputError::PipelineError(format!(
    "{} ({})",
    err.error(),
    err.debug().map(|d| d.to_string()).unwrap_or_default()
  ))
}

/// GStreamer 视频文件输出
///
/// 管理 GStreamer 编码管道；销毁时管道被置为 `Null` 并释放。
pub struct GStreamerVideoOutput {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  resolution: Resolution,
  rate: FrameRate,
  stride: usize,
  frame_count: u64,
  finished: bool,
}

impl GStreamerVideoOutput {
  pub fn create(
    path: &Path,
    resolution: Resolution,
    rate: FrameRate,
  ) -> Result<Self, GStreamerVideoOutputError> {
    // 重复调用是安全的
    gst::init()?;

    let location = path
      .to_str()
      .ok_or_else(|| GStreamerVideoOutputError::InvalidPath(path.display().to_string()))?;
    let rate = rate.or_default();

    let pipeline_desc = format!(
      "appsrc name=src block=true format=time ! videoconvert ! video/x-raw,format=I420 ! {} ! filesink name=sink",
      encoder_for(path)
    );
    info!("Creating video output pipeline: {}", pipeline_desc);

    let pipeline = gst::parse::launch(&pipeline_desc)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to create pipeline".to_string())
      })?;

    pipeline
      .by_name("sink")
      .ok_or(GStreamerVideoOutputError::FileSinkNotFound)?
      .set_property("location", location);

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerVideoOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerVideoOutputError::AppSrcConversionFailed)?;

    let video_info = gst_video::VideoInfo::builder(
      gst_video::VideoFormat::Rgb,
      resolution.width,
      resolution.height,
    )
    .fps(gst::Fraction::new(rate.numerator, rate.denominator))
    .build()?;
    appsrc.set_caps(Some(&video_info.to_caps()?));
    let stride = video_info.stride()[0] as usize;

    pipeline.set_state(gst::State::Playing)?;

    info!(
      "Video output initialized: {} @ {:.2} fps -> {}",
      resolution,
      rate.as_f64(),
      location
    );

    Ok(GStreamerVideoOutput {
      pipeline,
      appsrc,
      resolution,
      rate,
      stride,
      frame_count: 0,
      finished: false,
    })
  }

  fn check_bus(&self) -> Result<(), GStreamerVideoOutputError> {
    if let Some(bus) = self.pipeline.bus()
      && let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error])
      && let gst::MessageView::Error(err) = msg.view()
    {
      return Err(bus_error(err));
    }
    Ok(())
  }

  fn push_frame(&mut self, data: &[u8]) -> Result<(), GStreamerVideoOutputError> {
    let row_len = self.resolution.width as usize * 3;
    let mut buffer = gst::Buffer::from_mut_slice(pad_rows(data, row_len, self.stride));

    {
      let buffer_ref = buffer.get_mut().ok_or_else(|| {
        GStreamerVideoOutputError::PipelineError("Buffer is not writable".to_string())
      })?;
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(
        self.rate.timestamp_ns(self.frame_count),
      ));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(self.rate.frame_duration_ns()));
    }

    self
      .appsrc
      .push_buffer(buffer)
      .map_err(GStreamerVideoOutputError::FlowError)?;
    self.frame_count += 1;
    Ok(())
  }

  fn wait_for_eos(&self) -> Result<(), GStreamerVideoOutputError> {
    let bus = self.pipeline.bus().ok_or_else(|| {
      GStreamerVideoOutputError::PipelineError("Pipeline has no bus".to_string())
    })?;

    match bus.timed_pop_filtered(
      gst::ClockTime::from_seconds(FINISH_TIMEOUT_SECS),
      &[gst::MessageType::Eos, gst::MessageType::Error],
    ) {
      Some(msg) => match msg.view() {
        gst::MessageView::Error(err) => Err(bus_error(err)),
        _ => Ok(()),
      },
      None => Err(GStreamerVideoOutputError::FinishTimeout),
    }
  }
}

impl FrameSink for GStreamerVideoOutput {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), OutputError> {
    let actual = Resolution::of(image);
    if actual != self.resolution {
      return Err(OutputError::FrameSizeMismatch {
        expected: self.resolution,
        actual,
      });
    }

    self.check_bus()?;
    self.push_frame(image.as_raw())?;
    debug!("已写入第 {} 帧", self.frame_count);
    Ok(())
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    if self.finished {
      return Ok(());
    }
    self.finished = true;

    self
      .appsrc
      .end_of_stream()
      .map_err(GStreamerVideoOutputError::FlowError)?;
    self.wait_for_eos()?;

    info!("Video output closed. Total frames written: {}", self.frame_count);
    Ok(())
  }
}

impl Drop for GStreamerVideoOutput {
  fn drop(&mut self) {
    if !self.finished {
      let _ = self.appsrc.end_of_stream();
    }

    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer video output pipeline: {}", e);
    }
  }
}
