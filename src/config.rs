// 该文件是 Kanjian （看见） 项目的一部分。
// src/config.rs - 服务参数配置
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

use std::{
  net::{IpAddr, SocketAddr},
  path::{Path, PathBuf},
};

use clap::Parser;
use url::Url;

/// 上传大小上限（字节）
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

const UPLOAD_FOLDER: &str = "uploads";
const RESULT_FOLDER: &str = "results";

/// Kanjian 服务参数配置
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 yolo26:///opt/models/yolo26.rknn?confidence=0.5
  #[arg(long, env = "KANJIAN_MODEL", value_name = "MODEL")]
  pub model: Url,

  /// 类别名称文件，每行一个；缺省为 COCO 80 类
  #[arg(long, env = "KANJIAN_LABELS", value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 检测框标签使用的字体（TrueType / OpenType）
  #[arg(long, env = "KANJIAN_FONT", value_name = "FILE")]
  pub font: PathBuf,

  /// 监听地址
  #[arg(long, env = "KANJIAN_HOST", default_value = "0.0.0.0")]
  pub host: IpAddr,

  /// 监听端口
  #[arg(long, env = "KANJIAN_PORT", default_value_t = 5001)]
  pub port: u16,

  /// 静态文件目录，上传与结果文件保存在其子目录中
  #[arg(long, env = "KANJIAN_STATIC_DIR", default_value = "static")]
  pub static_dir: PathBuf,
}

/// 启动后不再变化的服务配置
#[derive(Debug, Clone)]
pub struct AppConfig {
  pub bind: SocketAddr,
  pub static_dir: PathBuf,
  pub max_upload_bytes: usize,
}

impl From<&Args> for AppConfig {
  fn from(args: &Args) -> Self {
    Self {
      bind: SocketAddr::new(args.host, args.port),
      static_dir: args.static_dir.clone(),
      max_upload_bytes: MAX_UPLOAD_BYTES,
    }
  }
}

impl AppConfig {
  pub fn new(static_dir: impl Into<PathBuf>) -> Self {
    Self {
      bind: SocketAddr::from(([0, 0, 0, 0], 5001)),
      static_dir: static_dir.into(),
      max_upload_bytes: MAX_UPLOAD_BYTES,
    }
  }

  pub fn upload_dir(&self) -> PathBuf {
    self.static_dir.join(UPLOAD_FOLDER)
  }

  pub fn result_dir(&self) -> PathBuf {
    self.static_dir.join(RESULT_FOLDER)
  }

  pub fn upload_path(&self, name: &str) -> PathBuf {
    self.upload_dir().join(name)
  }

  pub fn result_path(&self, name: &str) -> PathBuf {
    self.result_dir().join(name)
  }

  pub fn static_dir(&self) -> &Path {
    &self.static_dir
  }

  /// 创建上传与结果目录
  pub fn prepare_dirs(&self) -> std::io::Result<()> {
    std::fs::create_dir_all(self.upload_dir())?;
    std::fs::create_dir_all(self.result_dir())
  }
}

/// 上传文件在 `/static` 下的访问路径
pub fn upload_url(name: &str) -> String {
  format!("/static/{}/{}", UPLOAD_FOLDER, name)
}

/// 结果文件在 `/static` 下的访问路径
pub fn result_url(name: &str) -> String {
  format!("/static/{}/{}", RESULT_FOLDER, name)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_from_command_line() {
    let args = Args::try_parse_from([
      "kanjian-server",
      "--model",
      "yolo26:///opt/models/yolo26.rknn",
      "--font",
      "/usr/share/fonts/DejaVuSans.ttf",
    ])
    .unwrap();
    let config = AppConfig::from(&args);

    assert_eq!(config.bind.to_string(), "0.0.0.0:5001");
    assert_eq!(config.upload_dir(), Path::new("static/uploads"));
    assert_eq!(config.result_dir(), Path::new("static/results"));
    assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
    assert!(args.labels.is_none());
  }

  #[test]
  fn font_is_required() {
    let err = Args::try_parse_from([
      "kanjian-server",
      "--model",
      "yolo26:///opt/models/yolo26.rknn",
    ])
    .unwrap_err();
    assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
  }

  #[test]
  fn prepare_creates_both_folders() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::new(dir.path().join("static"));
    config.prepare_dirs().unwrap();
    assert!(config.upload_dir().is_dir());
    assert!(config.result_dir().is_dir());
  }

  #[test]
  fn public_urls() {
    assert_eq!(upload_url("a.png"), "/static/uploads/a.png");
    assert_eq!(result_url("result_a.png"), "/static/results/result_a.png");
  }
}
