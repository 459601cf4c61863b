// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use image::{ImageFormat, RgbImage};
use thiserror::Error;
use tracing::info;

use crate::utils::PartialFile;

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("image error: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("invalid output path: {}", .0.display())]
  InvalidPath(PathBuf),
}

/// 先编码到同目录下的临时文件，再重命名到目标路径
pub fn save_image_atomic(image: &RgbImage, path: &Path) -> Result<(), SaveImageFileError> {
  let format = ImageFormat::from_path(path)?;
  let file_name = path
    .file_name()
    .ok_or_else(|| SaveImageFileError::InvalidPath(path.to_path_buf()))?;

  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }

  let temp = PartialFile::new(path.with_file_name(format!(
    ".{}.partial",
    file_name.to_string_lossy()
  )));
  image.save_with_format(temp.path(), format)?;
  std::fs::rename(temp.path(), path)?;
  temp.keep();

  info!("保存图像到文件: {}", path.display());
  Ok(())
}
