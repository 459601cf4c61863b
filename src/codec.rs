// 该文件是 Kanjian （看见） 项目的一部分。
// src/codec.rs - 视频编解码后端选择
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

use crate::{
  frame::{FrameRate, Resolution},
  input::{FrameSource, InputError},
  output::{FrameSink, OutputError},
};

/// 打开视频读取端与写入端的工厂
pub trait VideoCodec: Send + Sync {
  fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, InputError>;

  fn open_sink(
    &self,
    path: &Path,
    resolution: Resolution,
    rate: FrameRate,
  ) -> Result<Box<dyn FrameSink>, OutputError>;
}

#[cfg(feature = "gstreamer_video")]
pub struct GStreamerCodec;

#[cfg(feature = "gstreamer_video")]
impl GStreamerCodec {
  pub fn new() -> Result<Self, gstreamer::glib::Error> {
    gstreamer::init()?;
    Ok(GStreamerCodec)
  }
}

#[cfg(feature = "gstreamer_video")]
impl VideoCodec for GStreamerCodec {
  fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, InputError> {
    Ok(Box::new(crate::input::GStreamerInput::open(path)?))
  }

  fn open_sink(
    &self,
    path: &Path,
    resolution: Resolution,
    rate: FrameRate,
  ) -> Result<Box<dyn FrameSink>, OutputError> {
    Ok(Box::new(crate::output::GStreamerVideoOutput::create(
      path, resolution, rate,
    )?))
  }
}

/// 未启用视频后端时使用，所有视频请求都会失败
pub struct UnsupportedCodec;

impl VideoCodec for UnsupportedCodec {
  fn open_source(&self, _path: &Path) -> Result<Box<dyn FrameSource>, InputError> {
    Err(InputError::Unsupported)
  }

  fn open_sink(
    &self,
    _path: &Path,
    _resolution: Resolution,
    _rate: FrameRate,
  ) -> Result<Box<dyn FrameSink>, OutputError> {
    Err(OutputError::Unsupported)
  }
}

/// 按编译特性选择视频后端
pub fn default_codec() -> anyhow::Result<Arc<dyn VideoCodec>> {
  #[cfg(feature = "gstreamer_video")]
  {
    Ok(Arc::new(GStreamerCodec::new()?))
  }

  #[cfg(not(feature = "gstreamer_video"))]
  {
    tracing::warn!("未启用视频后端，视频上传将返回错误");
    Ok(Arc::new(UnsupportedCodec))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unsupported_codec_refuses_video() {
    let codec = UnsupportedCodec;
    assert!(matches!(
      codec.open_source(Path::new("clip.mp4")),
      Err(InputError::Unsupported)
    ));
    assert!(matches!(
      codec.open_sink(
        Path::new("result_clip.mp4"),
        Resolution::new(2, 2),
        FrameRate::default()
      ),
      Err(OutputError::Unsupported)
    ));
  }
}
