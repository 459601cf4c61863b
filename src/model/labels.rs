// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/labels.rs - 类别名称表
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

use tracing::info;

/// COCO 数据集类别名称
const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

const UNKNOWN_LABEL: &str = "unknown";

/// 类别索引到名称的映射
#[derive(Debug, Clone)]
pub struct Labels {
  names: Box<[String]>,
}

impl Default for Labels {
  fn default() -> Self {
    Self::coco()
  }
}

impl Labels {
  pub fn coco() -> Self {
    Self::from_names(COCO_CLASSES)
  }

  pub fn from_names<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      names: names.into_iter().map(Into::into).collect(),
    }
  }

  /// 从文本文件读取类别名称，每行一个，忽略空行
  pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    let labels = Self::from_names(
      content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty()),
    );
    info!("从 {} 读取到 {} 个类别", path.display(), labels.len());
    Ok(labels)
  }

  pub fn name(&self, class_id: u32) -> &str {
    self
      .names
      .get(class_id as usize)
      .map(String::as_str)
      .unwrap_or(UNKNOWN_LABEL)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}
