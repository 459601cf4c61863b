// 该文件是 Kanjian （看见） 项目的一部分。
// src/server/error.rs - 接口错误
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
  Json,
  extract::multipart::MultipartError,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
  /// 客户端输入错误，消息原样返回
  #[error("{0}")]
  BadRequest(String),
  /// 检测流程失败
  #[error("Error processing file: {0}")]
  Processing(String),
  /// 其他意外错误，细节只写入日志
  #[error("Internal server error: {0}")]
  Internal(String),
  #[error("multipart error: {0}")]
  Multipart(#[from] MultipartError),
}

impl ApiError {
  pub fn bad_request(msg: impl Into<String>) -> Self {
    Self::BadRequest(msg.into())
  }

  pub fn internal(msg: impl ToString) -> Self {
    Self::Internal(msg.to_string())
  }
}

#[derive(Serialize)]
struct ErrorBody {
  error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  details: Option<String>,
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, error, details) = match self {
      ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
      ApiError::Processing(details) => (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Error processing file".to_string(),
        Some(details),
      ),
      ApiError::Internal(cause) => {
        error!("请求处理发生意外错误: {}", cause);
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          "Internal server error".to_string(),
          None,
        )
      }
      ApiError::Multipart(err) => (err.status(), err.body_text(), None),
    };

    (status, Json(ErrorBody { error, details })).into_response()
  }
}
