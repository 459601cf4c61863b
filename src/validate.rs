// 该文件是 Kanjian （看见） 项目的一部分。
// src/validate.rs - 上传文件校验
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

use std::{fmt, str::FromStr};

use serde::Serialize;
use thiserror::Error;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "webm"];

/// 上传模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
  #[default]
  Image,
  Video,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown upload mode: {0}")]
pub struct UnknownMode(pub String);

impl UploadMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      UploadMode::Image => "image",
      UploadMode::Video => "video",
    }
  }

  pub fn allowed_extensions(&self) -> &'static [&'static str] {
    match self {
      UploadMode::Image => IMAGE_EXTENSIONS,
      UploadMode::Video => VIDEO_EXTENSIONS,
    }
  }
}

impl fmt::Display for UploadMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for UploadMode {
  type Err = UnknownMode;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "image" => Ok(UploadMode::Image),
      "video" => Ok(UploadMode::Video),
      other => Err(UnknownMode(other.to_string())),
    }
  }
}

/// 取最后一个点之后的扩展名并转为小写，没有点时返回 `None`
pub fn extension_of(filename: &str) -> Option<String> {
  filename
    .rsplit_once('.')
    .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// 文件扩展名（不区分大小写）是否在该模式的白名单中
pub fn allowed_file(filename: &str, mode: UploadMode) -> bool {
  extension_of(filename)
    .map(|ext| mode.allowed_extensions().contains(&ext.as_str()))
    .unwrap_or(false)
}
