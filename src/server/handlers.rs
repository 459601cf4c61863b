// 该文件是 Kanjian （看见） 项目的一部分。
// src/server/handlers.rs - 请求处理
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

use std::path::PathBuf;

use axum::{
  Json,
  body::Bytes,
  extract::{Multipart, State, multipart::MultipartRejection},
  response::Html,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
  config::{result_url, upload_url},
  server::{ApiError, AppState},
  task::{ImageStats, ImageTaskError, Task, VideoStats, VideoTaskError},
  utils::PartialFile,
  validate::{UploadMode, allowed_file, extension_of},
};

const INDEX_HTML: &str = include_str!("../../assets/index.html");

/// 检测统计，按模式区分
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Stats {
  Image(ImageStats),
  Video(VideoStats),
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
  #[serde(rename = "type")]
  pub kind: UploadMode,
  /// 上传文件的访问路径
  pub original: String,
  /// 标注结果的访问路径
  pub result: String,
  pub stats: Stats,
}

#[derive(Error, Debug)]
enum PipelineError {
  #[error(transparent)]
  Image(#[from] ImageTaskError),
  #[error(transparent)]
  Video(#[from] VideoTaskError),
}

/// 表单中读取到的字段
#[derive(Default)]
struct UploadForm {
  file: Option<(String, Bytes)>,
  mode: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
  let mut form = UploadForm::default();
  while let Some(field) = multipart.next_field().await? {
    // 没有 filename 的 `file` 字段是普通文本字段，不算文件
    match (field.name(), field.file_name()) {
      (Some("file"), Some(filename)) => {
        let filename = filename.to_string();
        let data = field.bytes().await?;
        form.file = Some((filename, data));
      }
      (Some("mode"), _) => form.mode = Some(field.text().await?),
      _ => {}
    }
  }
  Ok(form)
}

pub async fn index() -> Html<&'static str> {
  Html(INDEX_HTML)
}

pub async fn upload(
  State(state): State<AppState>,
  multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
  let multipart = multipart.map_err(|rejection| {
    warn!("上传请求不是 multipart 表单: {}", rejection);
    ApiError::bad_request("No file part")
  })?;
  let form = read_form(multipart).await?;

  let (filename, data) = form
    .file
    .ok_or_else(|| ApiError::bad_request("No file part"))?;
  if filename.is_empty() {
    return Err(ApiError::bad_request("No selected file"));
  }

  let raw_mode = form.mode.unwrap_or_else(|| UploadMode::default().to_string());
  let mode = raw_mode
    .parse::<UploadMode>()
    .ok()
    .filter(|mode| allowed_file(&filename, *mode))
    .ok_or_else(|| ApiError::bad_request(format!("Invalid file type for {} mode", raw_mode)))?;
  let ext = extension_of(&filename)
    .ok_or_else(|| ApiError::bad_request(format!("Invalid file type for {} mode", raw_mode)))?;

  let stored_name = format!("{}.{}", Uuid::new_v4(), ext);
  let result_name = format!("result_{}", stored_name);
  let upload_path = state.config.upload_path(&stored_name);
  let result_path = state.config.result_path(&result_name);

  if let Err(e) = tokio::fs::write(&upload_path, &data).await {
    let _ = tokio::fs::remove_file(&upload_path).await;
    return Err(ApiError::internal(format!(
      "failed to store {}: {}",
      upload_path.display(),
      e
    )));
  }
  info!(
    "已保存上传文件 {} -> {} ({} 字节, {} 模式)",
    filename,
    stored_name,
    data.len(),
    mode
  );
  drop(data);

  let stats = tokio::task::spawn_blocking(move || process(&state, mode, upload_path, result_path))
    .await
    .map_err(ApiError::internal)?
    .map_err(|e| {
      error!("处理 {} 失败: {}", stored_name, e);
      ApiError::Processing(e.to_string())
    })?;

  Ok(Json(UploadResponse {
    kind: mode,
    original: upload_url(&stored_name),
    result: result_url(&result_name),
    stats,
  }))
}

/// 在阻塞线程中运行检测；失败时删除上传文件与不完整的结果文件
fn process(
  state: &AppState,
  mode: UploadMode,
  upload_path: PathBuf,
  result_path: PathBuf,
) -> Result<Stats, PipelineError> {
  let upload = PartialFile::new(upload_path);
  let result = PartialFile::new(result_path);

  let stats = match mode {
    UploadMode::Image => Stats::Image(state.image_task().run_task(upload.path(), result.path())?),
    UploadMode::Video => Stats::Video(state.video_task().run_task(upload.path(), result.path())?),
  };

  upload.keep();
  result.keep();
  Ok(stats)
}
