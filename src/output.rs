// 该文件是 Kanjian （看见） 项目的一部分。
// src/output.rs - 输出定义
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

use image::RgbImage;
use thiserror::Error;

use crate::frame::Resolution;

pub mod draw;

mod save_image_file;
pub use self::save_image_file::{SaveImageFileError, save_image_atomic};

#[cfg(feature = "gstreamer_video")]
mod gstreamer_video_output;
#[cfg(feature = "gstreamer_video")]
pub use self::gstreamer_video_output::{GStreamerVideoOutput, GStreamerVideoOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "gstreamer_video")]
  #[error("GStreamer video output error: {0}")]
  GStreamerVideoOutputError(#[from] GStreamerVideoOutputError),
  #[error("frame size {actual} does not match writer size {expected}")]
  FrameSizeMismatch {
    expected: Resolution,
    actual: Resolution,
  },
  #[error("video encoding error: {0}")]
  EncodingError(String),
  #[error("video encoding is not available in this build")]
  Unsupported,
}

/// 逐帧写入的视频输出
pub trait FrameSink {
  /// 写入一帧，尺寸必须与打开时的分辨率一致
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), OutputError>;

  /// 结束写入并等待编码器刷新
  fn finish(&mut self) -> Result<(), OutputError>;
}
