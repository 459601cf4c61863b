// 该文件是 Kanjian （看见） 项目的一部分。
// src/server/state.rs - 共享服务状态
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

use crate::{
  codec::VideoCodec,
  config::AppConfig,
  detector::Detector,
  output::draw::Draw,
  task::{ImageTask, VideoTask},
};

/// 启动时构建一次，按请求克隆
#[derive(Clone)]
pub struct AppState {
  pub config: Arc<AppConfig>,
  pub detector: Arc<Detector>,
  pub draw: Arc<Draw>,
  pub codec: Arc<dyn VideoCodec>,
}

impl AppState {
  pub fn new(
    config: AppConfig,
    detector: Detector,
    draw: Draw,
    codec: Arc<dyn VideoCodec>,
  ) -> Self {
    Self {
      config: Arc::new(config),
      detector: Arc::new(detector),
      draw: Arc::new(draw),
      codec,
    }
  }

  pub fn image_task(&self) -> ImageTask {
    ImageTask::new(self.detector.clone(), self.draw.clone())
  }

  pub fn video_task(&self) -> VideoTask {
    VideoTask::new(self.detector.clone(), self.draw.clone(), self.codec.clone())
  }
}
