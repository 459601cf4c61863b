// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/worker.rs - 模型工作线程
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

//! 模型在独立线程中创建并常驻，推理请求经由通道串行提交。
//! 推理上下文因此无需满足 `Send`/`Sync`。

use std::{sync::mpsc, thread};

use image::RgbImage;
use tracing::{error, info};

use super::{DetectResult, Model, ModelError};

struct Job {
  image: RgbImage,
  reply: mpsc::SyncSender<Result<DetectResult, ModelError>>,
}

pub struct ModelWorker {
  sender: mpsc::Sender<Job>,
}

impl ModelWorker {
  /// 在工作线程中调用 `factory` 加载模型，加载完成（或失败）后返回
  pub fn spawn<M, E, F>(factory: F) -> Result<Self, ModelError>
  where
    F: FnOnce() -> Result<M, E> + Send + 'static,
    M: Model<Input = RgbImage, Output = DetectResult>,
    M::Error: Into<ModelError>,
    E: Into<ModelError> + Send + 'static,
  {
    let (sender, receiver) = mpsc::channel::<Job>();
    let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), ModelError>>(1);

    thread::Builder::new()
      .name("model-worker".to_string())
      .spawn(move || {
        let model = match factory() {
          Ok(model) => {
            let _ = ready_tx.send(Ok(()));
            model
          }
          Err(e) => {
            let e = e.into();
            error!("模型加载失败: {}", e);
            let _ = ready_tx.send(Err(e));
            return;
          }
        };
        info!("模型工作线程已就绪");

        for job in receiver {
          let result = model.infer(&job.image).map_err(Into::into);
          let _ = job.reply.send(result);
        }
        info!("模型工作线程退出");
      })
      .map_err(|e| ModelError::Inference(format!("failed to spawn model worker: {e}")))?;

    ready_rx.recv().map_err(|_| ModelError::WorkerGone)??;
    Ok(Self { sender })
  }
}

impl Model for ModelWorker {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let (reply, response) = mpsc::sync_channel(1);
    self
      .sender
      .send(Job {
        image: input.clone(),
        reply,
      })
      .map_err(|_| ModelError::WorkerGone)?;
    response.recv().map_err(|_| ModelError::WorkerGone)?
  }
}

#[cfg(test)]
mod tests {
  use std::cell::Cell;

  use super::*;
  use crate::model::DetectItem;

  // 非 Sync 的模型，只能在工作线程内部使用
  struct CountingModel {
    calls: Cell<u32>,
  }

  impl Model for CountingModel {
    type Input = RgbImage;
    type Output = DetectResult;
    type Error = ModelError;

    fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
      self.calls.set(self.calls.get() + 1);
      if input.width() == 0 {
        return Err(ModelError::Inference("empty frame".to_string()));
      }
      Ok(DetectResult::new(vec![DetectItem {
        class_id: self.calls.get(),
        score: 0.9,
        bbox: [0.1, 0.1, 0.5, 0.5],
      }]))
    }
  }

  #[test]
  fn runs_inference_on_worker_thread() {
    let worker = ModelWorker::spawn(|| {
      Ok::<_, ModelError>(CountingModel {
        calls: Cell::new(0),
      })
    })
    .unwrap();

    let image = RgbImage::new(8, 8);
    assert_eq!(worker.infer(&image).unwrap().items[0].class_id, 1);
    assert_eq!(worker.infer(&image).unwrap().items[0].class_id, 2);
    assert!(matches!(
      worker.infer(&RgbImage::new(0, 0)),
      Err(ModelError::Inference(_))
    ));
  }

  #[test]
  fn load_failure_is_reported() {
    let result = ModelWorker::spawn(|| {
      Err::<CountingModel, _>(ModelError::Inference("missing weights".to_string()))
    });
    assert!(matches!(result, Err(ModelError::Inference(msg)) if msg == "missing weights"));
  }
}
