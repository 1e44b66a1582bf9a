// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 批处理任务
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
  sync::mpsc::{Receiver, channel},
  thread,
  time::{Duration, Instant},
};

use image::RgbImage;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  barcode::{Recovery, RecoveryError, Scanner},
  input::{InputError, NamedImage},
  model::{DetectResult, DetectorError, Model},
  output::{OutputError, Render},
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<BatchSummary, Self::Error>;
}

/// 单张图像处理失败的原因，批处理记录后继续下一张
#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("输入无效: {0}")]
  EmptyInput(String),
  #[error("引擎错误: {0}")]
  Engine(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("输出错误: {0}")]
  Output(#[from] OutputError),
}

impl From<InputError> for PipelineError {
  fn from(err: InputError) -> Self {
    PipelineError::EmptyInput(err.to_string())
  }
}

impl From<DetectorError> for PipelineError {
  fn from(err: DetectorError) -> Self {
    match err {
      DetectorError::EmptyInput(e) => PipelineError::EmptyInput(e.to_string()),
      DetectorError::Engine(e) => PipelineError::Engine(e),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageSummary {
  pub name: String,
  pub objects: usize,
  pub symbols: Vec<String>,
  pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
  pub processed: usize,
  pub succeeded: usize,
  pub failed: usize,
  /// 至少扫出一个符号的图像数量
  pub decoded: usize,
  pub interrupted: bool,
  pub images: Vec<ImageSummary>,
}

impl BatchSummary {
  /// 解码率（百分比），以处理过的图像总数为分母
  pub fn decode_rate(&self) -> f64 {
    if self.processed == 0 {
      0.0
    } else {
      self.decoded as f64 * 100.0 / self.processed as f64
    }
  }

  pub fn to_json(&self) -> serde_json::Value {
    json!({
      "processed": self.processed,
      "succeeded": self.succeeded,
      "failed": self.failed,
      "decoded": self.decoded,
      "decode_rate": self.decode_rate(),
      "interrupted": self.interrupted,
      "finished_at": chrono::Local::now().to_rfc3339(),
      "images": self.images.iter().map(|image| json!({
        "name": image.name,
        "objects": image.objects,
        "symbols": image.symbols,
        "error": image.error,
      })).collect::<Vec<_>>(),
    })
  }

  fn record(&mut self, name: String, outcome: Result<(usize, Vec<String>), PipelineError>) {
    self.processed += 1;
    match outcome {
      Ok((objects, symbols)) => {
        self.succeeded += 1;
        if !symbols.is_empty() {
          self.decoded += 1;
        }
        self.images.push(ImageSummary {
          name,
          objects,
          symbols,
          error: None,
        });
      }
      Err(e) => {
        error!("处理图像 {} 失败: {}", name, e);
        self.failed += 1;
        self.images.push(ImageSummary {
          name,
          error: Some(e.to_string()),
          ..Default::default()
        });
      }
    }
  }

  fn log(&self) {
    info!(
      "共处理 {} 张图像，成功 {} 张，失败 {} 张",
      self.processed, self.succeeded, self.failed
    );
  }
}

/// 安装 Ctrl-C 处理器。收到信号后当前图像处理完即退出循环，30 秒后仍未退出则强制结束。
pub fn interrupt_channel() -> Result<Receiver<()>, ctrlc::Error> {
  let (tx, rx) = channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;
  Ok(rx)
}

/// 重复推理 `repeat` 次并记录耗时，返回最后一次的结果
fn timed_infer<M, ME>(
  model: &M,
  image: &RgbImage,
  repeat: usize,
) -> Result<DetectResult, PipelineError>
where
  M: Model<Input = RgbImage, Output = DetectResult, Error = ME>,
  ME: Into<PipelineError>,
{
  let repeat = repeat.max(1);
  let mut times = Vec::with_capacity(repeat);
  let mut result = DetectResult::default();
  for _ in 0..repeat {
    let now = Instant::now();
    result = model.infer(image).map_err(Into::into)?;
    times.push(now.elapsed());
  }

  if repeat > 1 {
    let total: Duration = times.iter().sum();
    let min = times.iter().min().copied().unwrap_or_default();
    let max = times.iter().max().copied().unwrap_or_default();
    info!(
      "重复 {} 次，平均耗时 {:.2?}，最大 {:.2?}，最小 {:.2?}",
      repeat,
      total / repeat as u32,
      max,
      min
    );
  } else if let Some(elapsed) = times.first() {
    info!("推理完成，耗时: {:.2?}", elapsed);
  }
  info!("检测到 {} 个目标", result.len());
  Ok(result)
}

fn interrupted(stop: &Option<Receiver<()>>) -> bool {
  stop.as_ref().map(|rx| rx.try_recv().is_ok()).unwrap_or(false)
}

/// 只做检测，不扫码
#[derive(Default)]
pub struct DetectTask {
  repeat: usize,
  stop: Option<Receiver<()>>,
}

impl DetectTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat;
    self
  }

  pub fn with_interrupt(mut self, stop: Option<Receiver<()>>) -> Self {
    self.stop = stop;
    self
  }
}

impl<I, M, O, ME> Task<I, M, O> for DetectTask
where
  I: Iterator<Item = Result<NamedImage, InputError>>,
  M: Model<Input = RgbImage, Output = DetectResult, Error = ME>,
  ME: Into<PipelineError>,
  O: Render<NamedImage, DetectResult, Error = OutputError>,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<BatchSummary, Self::Error> {
    info!("开始检测任务...");
    let mut summary = BatchSummary::default();

    for (index, item) in input.enumerate() {
      let name = item
        .as_ref()
        .map(|frame| frame.name.clone())
        .unwrap_or_else(|_| format!("#{}", index));
      info!("处理第 {} 张图像: {}", index + 1, name);

      let outcome = item.map_err(PipelineError::from).and_then(|frame| {
        let result = timed_infer(&model, &frame.image, self.repeat)?;
        output.render_result(&frame, &result)?;
        Ok((result.len(), Vec::new()))
      });
      summary.record(name, outcome);

      if interrupted(&self.stop) {
        warn!("中断信号接收，退出任务循环");
        summary.interrupted = true;
        break;
      }
    }

    summary.log();
    Ok(summary)
  }
}

/// 检测后对每个目标执行逐级增强扫码
pub struct ScanTask<S> {
  scanner: S,
  recovery: Recovery,
  repeat: usize,
  stop: Option<Receiver<()>>,
}

impl<S: Scanner> ScanTask<S> {
  pub fn new(scanner: S, recovery: Recovery) -> Self {
    Self {
      scanner,
      recovery,
      repeat: 1,
      stop: None,
    }
  }

  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat;
    self
  }

  pub fn with_interrupt(mut self, stop: Option<Receiver<()>>) -> Self {
    self.stop = stop;
    self
  }

  /// 对一张图像中的全部检测框扫码，返回扫出的文本
  pub fn scan_objects(
    &mut self,
    image: &RgbImage,
    result: &DetectResult,
  ) -> Result<Vec<String>, PipelineError> {
    let gray = image::imageops::grayscale(image);
    let mut decoded = Vec::new();

    for (i, item) in result.iter().enumerate() {
      let [x0, y0, x1, y1] = item.bbox.corners();
      info!(
        "{:2}: {:3.0}%, [{:4.0}, {:4.0}, {:4.0}, {:4.0}]",
        item.label,
        item.score * 100.0,
        x0,
        y0,
        x1,
        y1
      );

      match self.recovery.recover(&mut self.scanner, &gray, &item.bbox) {
        Ok(report) => {
          for symbol in &report.symbols {
            info!("解码内容: [{}], 类型: [{}]", symbol.data, symbol.symbol_type);
          }
          if !report.is_decoded() {
            info!("目标 {} 未能解码，共尝试 {} 次", i, report.attempts.len());
          }
          decoded.extend(report.symbols.into_iter().map(|s| s.data));
        }
        Err(RecoveryError::EmptyRegion(rect)) => {
          return Err(PipelineError::EmptyInput(format!("目标 {} 的裁剪区域为空: {:?}", i, rect)));
        }
        Err(RecoveryError::Scanner(e)) => return Err(PipelineError::Engine(Box::new(e))),
      }
    }
    Ok(decoded)
  }
}

impl<I, M, O, ME, S> Task<I, M, O> for ScanTask<S>
where
  I: Iterator<Item = Result<NamedImage, InputError>>,
  M: Model<Input = RgbImage, Output = DetectResult, Error = ME>,
  ME: Into<PipelineError>,
  O: Render<NamedImage, DetectResult, Error = OutputError>,
  S: Scanner,
{
  type Error = anyhow::Error;

  fn run_task(mut self, input: I, model: M, output: O) -> Result<BatchSummary, Self::Error> {
    info!("开始扫码任务...");
    let mut summary = BatchSummary::default();

    for (index, item) in input.enumerate() {
      let name = item
        .as_ref()
        .map(|frame| frame.name.clone())
        .unwrap_or_else(|_| format!("#{}", index));
      info!("处理第 {} 张图像: {}", index + 1, name);

      let outcome = item.map_err(PipelineError::from).and_then(|frame| {
        let result = timed_infer(&model, &frame.image, self.repeat)?;
        output.render_result(&frame, &result)?;
        let symbols = self.scan_objects(&frame.image, &result)?;
        Ok((result.len(), symbols))
      });
      summary.record(name, outcome);

      if interrupted(&self.stop) {
        warn!("中断信号接收，退出任务循环");
        summary.interrupted = true;
        break;
      }
    }

    summary.log();
    info!(
      "总图像数: {}，解码成功: {}，解码率: {:.1}%",
      summary.processed,
      summary.decoded,
      summary.decode_rate()
    );
    Ok(summary)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decode_rate_handles_empty_batch() {
    assert_eq!(BatchSummary::default().decode_rate(), 0.0);
  }

  #[test]
  fn summary_counts_successes_and_failures() {
    let mut summary = BatchSummary::default();
    summary.record("a".into(), Ok((1, vec!["hello".into()])));
    summary.record("b".into(), Ok((2, Vec::new())));
    summary.record("c".into(), Err(PipelineError::EmptyInput("坏图".into())));
    summary.record("d".into(), Ok((1, vec!["x".into(), "y".into()])));

    assert_eq!(summary.processed, 4);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.decoded, 2);
    assert_eq!(summary.decode_rate(), 50.0);

    let value = summary.to_json();
    assert_eq!(value["decoded"], 2);
    assert_eq!(value["images"][0]["symbols"][0], "hello");
    assert!(value["images"][2]["error"].as_str().unwrap().contains("坏图"));
    assert!(value["finished_at"].is_string());
  }

  #[test]
  fn detector_errors_map_to_pipeline_errors() {
    let empty = crate::letterbox::LetterboxError::EmptyImage {
      width: 0,
      height: 0,
    };
    let err: PipelineError = DetectorError::EmptyInput(empty).into();
    assert!(matches!(err, PipelineError::EmptyInput(_)));
  }

  use crate::barcode::Symbol;

  struct NeverScanner;

  impl Scanner for NeverScanner {
    type Error = std::convert::Infallible;

    fn clear_results(&mut self) {}

    fn scan(&mut self, _image: &image::GrayImage) -> Result<Vec<Symbol>, Self::Error> {
      Ok(Vec::new())
    }
  }

  #[test]
  fn degenerate_object_aborts_image() {
    let result = DetectResult {
      items: vec![crate::model::DetectItem {
        label: 0,
        score: 0.9,
        bbox: crate::geometry::Rect::new(10.0, 10.0, 0.0, 20.0),
      }]
      .into_boxed_slice(),
    };
    let mut task = ScanTask::new(NeverScanner, Recovery::default());
    let err = task.scan_objects(&RgbImage::new(32, 32), &result).unwrap_err();
    assert!(matches!(err, PipelineError::EmptyInput(_)));
  }
}
