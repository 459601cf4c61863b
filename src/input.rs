// 该文件是 Kanjian （看见） 项目的一部分。
// src/input.rs - 视频输入
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

use thiserror::Error;

use crate::frame::{Frame, FrameRate, Resolution};

#[cfg(feature = "gstreamer_video")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_video")]
pub use self::gstreamer_input::{GStreamerInput, GStreamerInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "gstreamer_video")]
  #[error("GStreamer input error: {0}")]
  GStreamer(#[from] GStreamerInputError),
  #[error("video decoding is not available in this build")]
  Unsupported,
  #[error("video decoding error: {0}")]
  Decode(String),
}

/// 逐帧读取的视频源
///
/// 迭代器产出 `Err` 表示解码中途失败，调用方应停止读取。
pub trait FrameSource: Iterator<Item = Result<Frame, InputError>> {
  /// 源视频的原始分辨率
  fn resolution(&self) -> Resolution;

  /// 源视频帧率，缺失时为默认帧率
  fn frame_rate(&self) -> FrameRate;
}
