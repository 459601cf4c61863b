// 该文件是 Kanjian （看见） 项目的一部分。
// tests/upload_api.rs - 上传接口测试
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
  fs::File,
  io::{Cursor, Write},
  path::Path,
  sync::Arc,
};

use axum::{
  Router,
  body::{Body, to_bytes},
  http::{Request, StatusCode, header},
};
use image::{ImageFormat, RgbImage};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use kanjian::{
  codec::VideoCodec,
  config::AppConfig,
  detector::Detector,
  frame::{Frame, FrameRate, Resolution},
  input::{FrameSource, InputError},
  model::{DetectItem, DetectResult, Labels, Model, ModelError},
  output::{FrameSink, OutputError, draw::Draw},
  server::{AppState, create_router},
};

const BOUNDARY: &str = "kanjian-test-boundary";

/// 每次返回 5 个框，共 3 个类别
struct FakeModel;

impl Model for FakeModel {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = ModelError;

  fn infer(&self, _input: &RgbImage) -> Result<DetectResult, ModelError> {
    let items = [0, 0, 2, 2, 15]
      .into_iter()
      .enumerate()
      .map(|(i, class_id)| {
        let offset = i as f32 * 0.1;
        DetectItem {
          class_id,
          score: 0.75,
          bbox: [offset, offset, offset + 0.4, offset + 0.4],
        }
      })
      .collect();
    Ok(DetectResult::new(items))
  }
}

struct FakeSource {
  frames: u64,
  fail_at: Option<u64>,
  next: u64,
}

impl Iterator for FakeSource {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let index = self.next;
    self.next += 1;
    if self.fail_at == Some(index) {
      return Some(Err(InputError::Decode("simulated codec error".to_string())));
    }
    (index < self.frames).then(|| {
      Ok(Frame {
        image: RgbImage::new(639, 480),
        index,
      })
    })
  }
}

impl FrameSource for FakeSource {
  fn resolution(&self) -> Resolution {
    Resolution::new(639, 480)
  }

  fn frame_rate(&self) -> FrameRate {
    FrameRate::new(30, 1)
  }
}

struct FileSink {
  file: File,
  resolution: Resolution,
}

impl FrameSink for FileSink {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), OutputError> {
    let actual = Resolution::of(image);
    if actual != self.resolution {
      return Err(OutputError::FrameSizeMismatch {
        expected: self.resolution,
        actual,
      });
    }
    self
      .file
      .write_all(image.as_raw())
      .map_err(|e| OutputError::EncodingError(e.to_string()))
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    self
      .file
      .flush()
      .map_err(|e| OutputError::EncodingError(e.to_string()))
  }
}

/// 输出原始 RGB 帧的视频后端
struct FakeCodec {
  fail_at: Option<u64>,
}

impl VideoCodec for FakeCodec {
  fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, InputError> {
    if !path.exists() {
      return Err(InputError::Decode(format!("{} not found", path.display())));
    }
    Ok(Box::new(FakeSource {
      frames: 3,
      fail_at: self.fail_at,
      next: 0,
    }))
  }

  fn open_sink(
    &self,
    path: &Path,
    resolution: Resolution,
    _rate: FrameRate,
  ) -> Result<Box<dyn FrameSink>, OutputError> {
    let file = File::create(path).map_err(|e| OutputError::EncodingError(e.to_string()))?;
    Ok(Box::new(FileSink { file, resolution }))
  }
}

struct TestApp {
  router: Router,
  dir: TempDir,
}

impl TestApp {
  fn new() -> Self {
    Self::with(FakeCodec { fail_at: None }, |_| {})
  }

  fn with(codec: FakeCodec, tweak: impl FnOnce(&mut AppConfig)) -> Self {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::new(dir.path().join("static"));
    tweak(&mut config);
    config.prepare_dirs().unwrap();

    let detector = Detector::new(Arc::new(FakeModel), Labels::coco());
    let state = AppState::new(config, detector, Draw::default(), Arc::new(codec));
    Self {
      router: create_router(state),
      dir,
    }
  }

  fn files_in(&self, folder: &str) -> Vec<String> {
    let mut names: Vec<_> = std::fs::read_dir(self.dir.path().join("static").join(folder))
      .unwrap()
      .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
      .collect();
    names.sort();
    names
  }

  async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = self.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
  }

  async fn upload(&self, parts: &[Part<'_>]) -> (StatusCode, Value) {
    let (status, body) = self.send(upload_request(parts)).await;
    (status, serde_json::from_slice(&body).unwrap())
  }
}

enum Part<'a> {
  File(&'a str, &'a [u8]),
  Text(&'a str, &'a str),
}

fn upload_request(parts: &[Part<'_>]) -> Request<Body> {
  let mut body = Vec::new();
  for part in parts {
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    match part {
      Part::File(filename, data) => {
        body.extend_from_slice(
          format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n",
            filename
          )
          .as_bytes(),
        );
        body.extend_from_slice(data);
      }
      Part::Text(name, value) => {
        body.extend_from_slice(
          format!(
            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}",
            name, value
          )
          .as_bytes(),
        );
      }
    }
    body.extend_from_slice(b"\r\n");
  }
  body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

  Request::builder()
    .method("POST")
    .uri("/upload")
    .header(
      header::CONTENT_TYPE,
      format!("multipart/form-data; boundary={}", BOUNDARY),
    )
    .body(Body::from(body))
    .unwrap()
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
  let mut out = Cursor::new(Vec::new());
  RgbImage::from_pixel(width, height, image::Rgb([90, 120, 200]))
    .write_to(&mut out, ImageFormat::Png)
    .unwrap();
  out.into_inner()
}

#[tokio::test]
async fn landing_page_is_served() {
  let app = TestApp::new();
  let (status, body) = app
    .send(Request::get("/").body(Body::empty()).unwrap())
    .await;
  assert_eq!(status, StatusCode::OK);
  assert!(String::from_utf8(body).unwrap().contains("<form"));
}

#[tokio::test]
async fn empty_filename_is_rejected() {
  let app = TestApp::new();
  let (status, body) = app
    .upload(&[Part::File("", b""), Part::Text("mode", "image")])
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body, serde_json::json!({ "error": "No selected file" }));
}

#[tokio::test]
async fn missing_file_part_is_rejected() {
  let app = TestApp::new();
  let (status, body) = app.upload(&[Part::Text("mode", "image")]).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], "No file part");

  let (status, body) = app
    .upload(&[Part::Text("file", "street.png"), Part::Text("mode", "image")])
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], "No file part");

  let request = Request::post("/upload")
    .header(header::CONTENT_TYPE, "application/json")
    .body(Body::from("{}"))
    .unwrap();
  let (status, body) = app.send(request).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  let body: Value = serde_json::from_slice(&body).unwrap();
  assert_eq!(body["error"], "No file part");
}

#[tokio::test]
async fn wrong_extension_for_mode_is_rejected() {
  let app = TestApp::new();

  let (status, body) = app
    .upload(&[Part::File("photo.GIF", b"GIF89a"), Part::Text("mode", "image")])
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], "Invalid file type for image mode");

  let (status, body) = app
    .upload(&[Part::File("clip.mp4", b"...."), Part::Text("mode", "image")])
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], "Invalid file type for image mode");

  let (status, body) = app
    .upload(&[Part::File("clip.mp4", b"...."), Part::Text("mode", "audio")])
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], "Invalid file type for audio mode");

  assert!(app.files_in("uploads").is_empty());
}

#[tokio::test]
async fn image_upload_reports_unique_objects() {
  let app = TestApp::new();
  let png = png_bytes(64, 48);
  let (status, body) = app
    .upload(&[Part::Text("mode", "image"), Part::File("street.PNG", &png)])
    .await;

  assert_eq!(status, StatusCode::OK, "{body}");
  assert_eq!(body["type"], "image");
  assert_eq!(body["stats"]["resolution"], "64x48");
  assert!(body["stats"]["inference_time"].as_f64().unwrap() >= 0.0);

  let objects: Vec<&str> = body["stats"]["detected_objects"]
    .as_array()
    .unwrap()
    .iter()
    .map(|v| v.as_str().unwrap())
    .collect();
  assert!(objects.len() <= 3);
  let mut unique = objects.clone();
  unique.dedup();
  assert_eq!(unique, objects);
  assert_eq!(objects, vec!["car", "cat", "person"]);

  let original = body["original"].as_str().unwrap();
  let result = body["result"].as_str().unwrap();
  assert!(original.starts_with("/static/uploads/") && original.ends_with(".png"));
  let stored = original.trim_start_matches("/static/uploads/");
  assert_eq!(result, format!("/static/results/result_{}", stored));

  let (status, served) = app
    .send(Request::get(result).body(Body::empty()).unwrap())
    .await;
  assert_eq!(status, StatusCode::OK);
  let annotated = image::load_from_memory(&served).unwrap();
  assert_eq!((annotated.width(), annotated.height()), (64, 48));
}

#[tokio::test]
async fn mode_defaults_to_image() {
  let app = TestApp::new();
  let png = png_bytes(16, 16);
  let (status, body) = app.upload(&[Part::File("a.png", &png)]).await;
  assert_eq!(status, StatusCode::OK, "{body}");
  assert_eq!(body["type"], "image");
}

#[tokio::test]
async fn same_file_twice_gets_distinct_names() {
  let app = TestApp::new();
  let png = png_bytes(32, 32);
  let (_, first) = app.upload(&[Part::File("same.png", &png)]).await;
  let (_, second) = app.upload(&[Part::File("same.png", &png)]).await;

  assert_ne!(first["original"], second["original"]);
  assert_ne!(first["result"], second["result"]);
  assert_eq!(app.files_in("uploads").len(), 2);
  assert_eq!(app.files_in("results").len(), 2);
}

#[tokio::test]
async fn undecodable_image_cleans_up() {
  let app = TestApp::new();
  let (status, body) = app
    .upload(&[Part::File("broken.jpg", b"not really a jpeg")])
    .await;
  assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
  assert_eq!(body["error"], "Error processing file");
  assert!(body["details"].is_string());
  assert!(app.files_in("uploads").is_empty());
  assert!(app.files_in("results").is_empty());
}

#[tokio::test]
async fn video_resolution_is_clamped_to_even() {
  let app = TestApp::new();
  let (status, body) = app
    .upload(&[Part::File("clip.MP4", b"fake video"), Part::Text("mode", "video")])
    .await;

  assert_eq!(status, StatusCode::OK, "{body}");
  assert_eq!(body["type"], "video");
  assert_eq!(body["stats"]["resolution"], "638x480");
  assert_eq!(body["stats"]["fps"], 30.0);
  assert_eq!(body["stats"]["detected_objects"], serde_json::json!([]));
  assert!(body["result"].as_str().unwrap().ends_with(".mp4"));

  let results = app.files_in("results");
  assert_eq!(results.len(), 1);
  let written = std::fs::metadata(app.dir.path().join("static/results").join(&results[0]))
    .unwrap()
    .len();
  assert_eq!(written, 3 * 638 * 480 * 3);
}

#[tokio::test]
async fn mid_video_failure_leaves_no_result() {
  let app = TestApp::with(FakeCodec { fail_at: Some(1) }, |_| {});
  let (status, body) = app
    .upload(&[Part::File("clip.webm", b"fake video"), Part::Text("mode", "video")])
    .await;

  assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
  assert_eq!(body["error"], "Error processing file");
  assert!(
    body["details"]
      .as_str()
      .unwrap()
      .contains("simulated codec error")
  );
  assert!(app.files_in("results").is_empty());
  assert!(app.files_in("uploads").is_empty());
}

#[tokio::test]
async fn oversized_upload_is_refused() {
  let app = TestApp::with(FakeCodec { fail_at: None }, |config| {
    config.max_upload_bytes = 1024;
  });
  let big = vec![0u8; 64 * 1024];
  let (status, body) = app.upload(&[Part::File("huge.png", &big)]).await;

  assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
  assert!(body["error"].is_string());
  assert!(app.files_in("uploads").is_empty());
}
