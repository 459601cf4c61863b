// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::info;

use crate::model::{DetectResult, Labels};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const LABEL_TEXT_HORIZONTAL_PADDING: i32 = 3;
const LABEL_TEXT_COLOR: [u8; 3] = [255, 255, 255];
const BOX_THICKNESS: i32 = 2;

// 按类别循环取色
const PALETTE: [[u8; 3]; 20] = [
  [0xFF, 0x38, 0x38],
  [0xFF, 0x9D, 0x97],
  [0xFF, 0x70, 0x1F],
  [0xFF, 0xB2, 0x1D],
  [0xCF, 0xD2, 0x31],
  [0x48, 0xF9, 0x0A],
  [0x92, 0xCC, 0x17],
  [0x3D, 0xDB, 0x86],
  [0x1A, 0x93, 0x34],
  [0x00, 0xD4, 0xBB],
  [0x2C, 0x99, 0xA8],
  [0x00, 0xC2, 0xFF],
  [0x34, 0x45, 0x93],
  [0x64, 0x73, 0xFF],
  [0x00, 0x18, 0xEC],
  [0x84, 0x38, 0xFF],
  [0x52, 0x00, 0x85],
  [0xCB, 0x38, 0xFF],
  [0xFF, 0x95, 0xC8],
  [0xFF, 0x37, 0xC7],
];

pub fn class_color(class_id: u32) -> [u8; 3] {
  PALETTE[class_id as usize % PALETTE.len()]
}

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("invalid font file: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 检测框绘制器
///
/// 服务启动时必须加载字体；`Draw::default()` 不带字体，只画检测框。
pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  thickness: i32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      thickness: BOX_THICKNESS,
    }
  }
}

impl Draw {
  pub fn with_font(font: FontArc) -> Self {
    Self {
      font: Some(font),
      ..Self::default()
    }
  }

  pub fn from_font_file(path: &Path) -> Result<Self, DrawError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)?;
    info!("已加载标签字体: {}", path.display());
    Ok(Self::with_font(font))
  }

  pub fn draw_detections(&self, image: &mut RgbImage, result: &DetectResult, labels: &Labels) {
    for item in result.iter() {
      self.draw_bbox_with_label(
        image,
        &item.bbox,
        labels.name(item.class_id),
        item.score,
        class_color(item.class_id),
      );
    }
  }

  // bbox 为归一化坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label(
    &self,
    image: &mut RgbImage,
    bbox: &[f32; 4],
    name: &str,
    score: f32,
    color: [u8; 3],
  ) {
    if image.width() == 0 || image.height() == 0 {
      return;
    }
    let (w, h) = (image.width() as f32, image.height() as f32);
    let (max_x, max_y) = (image.width() as i32 - 1, image.height() as i32 - 1);

    let x_min = ((bbox[0] * w).floor() as i32).clamp(0, max_x);
    let y_min = ((bbox[1] * h).floor() as i32).clamp(0, max_y);
    let x_max = ((bbox[2] * w).ceil() as i32).clamp(0, max_x);
    let y_max = ((bbox[3] * h).ceil() as i32).clamp(0, max_y);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    for t in 0..self.thickness {
      let (x0, y0, x1, y1) = (x_min + t, y_min + t, x_max - t, y_max - t);
      if x0 >= x1 || y0 >= y1 {
        break;
      }
      let rect = Rect::at(x0, y0).of_size((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32);
      draw_hollow_rect_mut(image, rect, Rgb(color));
    }

    let Some(font) = &self.font else {
      return;
    };

    let label = format!("{} {:.2}", name, score);
    let scale = PxScale::from(self.font_size);
    let (text_w, text_h) = text_size(scale, font, &label);
    let label_h = text_h as i32 + 2 * LABEL_TEXT_VERTICAL_PADDING;
    let label_w = (text_w as i32 + 2 * LABEL_TEXT_HORIZONTAL_PADDING).min(max_x + 1 - x_min);

    // 框上方放不下时画在框内
    let label_x = x_min;
    let label_y = if y_min >= label_h { y_min - label_h } else { y_min };

    if label_w <= 0 || label_h <= 0 {
      return;
    }

    let rect = Rect::at(label_x, label_y).of_size(label_w as u32, label_h as u32);
    draw_filled_rect_mut(image, rect, Rgb(color));
    draw_text_mut(
      image,
      Rgb(LABEL_TEXT_COLOR),
      label_x + LABEL_TEXT_HORIZONTAL_PADDING,
      label_y + LABEL_TEXT_VERTICAL_PADDING,
      scale,
      font,
      &label,
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DetectItem;

  fn result_with(bbox: [f32; 4], class_id: u32) -> DetectResult {
    DetectResult::new(vec![DetectItem {
      class_id,
      score: 0.9,
      bbox,
    }])
  }

  #[test]
  fn draws_box_outline_in_class_color() {
    let mut image = RgbImage::new(100, 100);
    let draw = Draw::default();
    draw.draw_detections(&mut image, &result_with([0.1, 0.2, 0.5, 0.6], 2), &Labels::coco());

    let color = Rgb(class_color(2));
    assert_eq!(*image.get_pixel(10, 40), color);
    assert_eq!(*image.get_pixel(30, 20), color);
    assert_eq!(*image.get_pixel(11, 40), color);
    // 框内部保持不变
    assert_eq!(*image.get_pixel(30, 40), Rgb([0, 0, 0]));
  }

  #[test]
  fn degenerate_box_is_skipped() {
    let mut image = RgbImage::new(50, 50);
    let draw = Draw::default();
    draw.draw_detections(&mut image, &result_with([0.5, 0.5, 0.5, 0.9], 0), &Labels::coco());
    assert!(image.pixels().all(|p| p.0 == [0, 0, 0]));
  }

  #[test]
  fn out_of_range_box_is_clamped() {
    let mut image = RgbImage::new(20, 10);
    let draw = Draw::default();
    draw.draw_detections(&mut image, &result_with([-0.5, -0.5, 1.5, 1.5], 0), &Labels::coco());
    assert_eq!(*image.get_pixel(0, 0), Rgb(class_color(0)));
    assert_eq!(*image.get_pixel(19, 9), Rgb(class_color(0)));
  }

  #[test]
  fn palette_cycles() {
    assert_eq!(class_color(0), class_color(20));
    assert_ne!(class_color(0), class_color(1));
  }

  #[test]
  fn missing_font_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      Draw::from_font_file(&dir.path().join("none.ttf")),
      Err(DrawError::IoError(_))
    ));
    let bogus = dir.path().join("bogus.ttf");
    std::fs::write(&bogus, b"not a font").unwrap();
    assert!(matches!(
      Draw::from_font_file(&bogus),
      Err(DrawError::InvalidFont(_))
    ));
  }
}
