// 该文件是 Kanjian （看见） 项目的一部分。
// src/utils.rs - 工具函数
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

use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// RAII 守卫：除非调用 [`PartialFile::keep`]，否则在销毁时删除文件
#[derive(Debug)]
pub struct PartialFile {
  path: PathBuf,
  keep: bool,
}

impl PartialFile {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      keep: false,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 保留文件
  pub fn keep(mut self) {
    self.keep = true;
  }
}

impl Drop for PartialFile {
  fn drop(&mut self) {
    if self.keep || !self.path.exists() {
      return;
    }
    match std::fs::remove_file(&self.path) {
      Ok(()) => info!("已清理文件: {}", self.path.display()),
      Err(e) => warn!("清理文件 {} 失败: {}", self.path.display(), e),
    }
  }
}
