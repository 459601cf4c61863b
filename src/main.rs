// 该文件是 Kanjian （看见） 项目的一部分。
// src/main.rs - 服务主程序
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

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kanjian::{
  codec::default_codec,
  config::{AppConfig, Args},
  detector::Detector,
  model::{Labels, load_model},
  output::draw::Draw,
  server::{AppState, create_router},
};

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("静态目录: {}", args.static_dir.display());

  let config = AppConfig::from(&args);
  config
    .prepare_dirs()
    .with_context(|| format!("无法创建目录 {}", config.static_dir.display()))?;

  let labels = match &args.labels {
    Some(path) => Labels::from_file(path)
      .with_context(|| format!("无法读取类别文件 {}", path.display()))?,
    None => Labels::coco(),
  };
  info!("类别数: {}", labels.len());

  info!("正在加载模型...");
  let model = load_model(&args.model)?;
  info!("模型加载完成");

  let draw = Draw::from_font_file(&args.font)
    .with_context(|| format!("无法加载字体 {}", args.font.display()))?;

  let codec = default_codec()?;
  let state = AppState::new(config.clone(), Detector::new(model, labels), draw, codec);
  let app = create_router(state);

  let listener = tokio::net::TcpListener::bind(config.bind)
    .await
    .with_context(|| format!("无法监听 {}", config.bind))?;
  info!("服务已启动: http://{}", config.bind);

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  info!("服务已关闭");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!("无法监听中断信号: {}", e);
    std::future::pending::<()>().await;
  }
  info!("收到中断信号，准备退出...");
}
