// 该文件是 Kanjian （看见） 项目的一部分。
// src/frame.rs - 帧与尺寸定义
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

use std::fmt;

use image::RgbImage;
use serde::{Serialize, Serializer};

const DEFAULT_FPS: i32 = 25;
const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// 视频中按顺序解码出的一帧
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引
  pub index: u64,
}

/// 图像或视频的分辨率，序列化为 `WxH`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Resolution {
  pub width: u32,
  pub height: u32,
}

impl Resolution {
  pub fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }

  pub fn of(image: &RgbImage) -> Self {
    Self::new(image.width(), image.height())
  }

  /// 宽高各自向下取偶数，奇数尺寸裁掉一个像素
  pub fn even(self) -> Self {
    Self::new(self.width & !1, self.height & !1)
  }

  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }

  /// RGB24 一帧所需的字节数
  pub fn rgb_len(&self) -> usize {
    self.width as usize * self.height as usize * 3
  }
}

impl fmt::Display for Resolution {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}x{}", self.width, self.height)
  }
}

impl Serialize for Resolution {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

/// 以分数表示的帧率，避免浮点近似
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
  pub numerator: i32,
  pub denominator: i32,
}

impl FrameRate {
  pub fn new(numerator: i32, denominator: i32) -> Self {
    Self {
      numerator,
      denominator,
    }
  }

  /// 分子或分母非正时（可变帧率或未知）回退到默认帧率
  pub fn or_default(self) -> Self {
    if self.numerator <= 0 || self.denominator <= 0 {
      Self::default()
    } else {
      self
    }
  }

  pub fn as_f64(&self) -> f64 {
    if self.denominator == 0 {
      return 0.0;
    }
    self.numerator as f64 / self.denominator as f64
  }

  /// 第 `index` 帧的时间戳（纳秒）
  pub fn timestamp_ns(&self, index: u64) -> u64 {
    let rate = self.or_default();
    let ns = index as u128 * NANOS_PER_SECOND * rate.denominator as u128 / rate.numerator as u128;
    u64::try_from(ns).unwrap_or(u64::MAX)
  }

  /// 单帧持续时间（纳秒）
  pub fn frame_duration_ns(&self) -> u64 {
    let rate = self.or_default();
    let ns = NANOS_PER_SECOND * rate.denominator as u128 / rate.numerator as u128;
    u64::try_from(ns).unwrap_or(u64::MAX)
  }
}

impl Default for FrameRate {
  fn default() -> Self {
    Self::new(DEFAULT_FPS, 1)
  }
}

/// 将图像裁剪到目标分辨率（从左上角开始），尺寸一致时直接返回
pub fn crop_to(image: RgbImage, target: Resolution) -> RgbImage {
  if Resolution::of(&image) == target {
    return image;
  }
  let width = target.width.min(image.width());
  let height = target.height.min(image.height());
  image::imageops::crop_imm(&image, 0, 0, width, height).to_image()
}

/// 将紧密排列的 RGB 行补齐到 `stride` 字节
pub fn pad_rows(data: &[u8], row_len: usize, stride: usize) -> Vec<u8> {
  if stride == row_len || row_len == 0 {
    return data.to_vec();
  }
  let rows = data.len() / row_len;
  let mut out = vec![0u8; stride * rows];
  for (src, dst) in data.chunks_exact(row_len).zip(out.chunks_exact_mut(stride)) {
    dst[..row_len].copy_from_slice(src);
  }
  out
}

/// 去掉每行末尾的对齐字节，得到紧密排列的 RGB 数据
pub fn unpad_rows(data: &[u8], row_len: usize, stride: usize, rows: usize) -> Option<Vec<u8>> {
  if stride < row_len || data.len() < stride * rows.saturating_sub(1) + row_len {
    return None;
  }
  let mut out = Vec::with_capacity(row_len * rows);
  for y in 0..rows {
    let start = y * stride;
    out.extend_from_slice(&data[start..start + row_len]);
  }
  Some(out)
}
