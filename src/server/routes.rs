// 该文件是 Kanjian （看见） 项目的一部分。
// src/server/routes.rs - 路由
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

use axum::{
  Router,
  extract::DefaultBodyLimit,
  routing::{get, post},
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::server::{AppState, handlers};

pub fn create_router(state: AppState) -> Router {
  let upload_routes = Router::new()
    .route("/upload", post(handlers::upload))
    .layer(DefaultBodyLimit::max(state.config.max_upload_bytes));

  Router::new()
    .route("/", get(handlers::index))
    .merge(upload_routes)
    .nest_service("/static", ServeDir::new(state.config.static_dir()))
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive())
    .with_state(state)
}
