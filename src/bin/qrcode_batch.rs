// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/qrcode_batch.rs - 目录批量检测并扫码
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use shanan_qr::{
  FromUrl,
  barcode::{Recovery, RecoveryConfig, RqrrScanner},
  input::InputWrapper,
  model::{Detector, DetectorConfig, Labels, TractEngine},
  output::DirectoryRecordOutput,
  task::{ScanTask, Task, interrupt_channel},
};

/// 检测二维码区域并逐级增强扫码，统计解码率
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型，例如 yolo:///models/qrcode.onnx?size=640,640&classes=1&encoding=dfl16
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，image:///a.jpg 或 folder:///images?suffix=jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出目录，folder:///out?draw=true&record=id
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 置信度阈值，覆盖模型 URL 中的 conf
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,
  /// NMS IoU 阈值，覆盖模型 URL 中的 nms
  #[arg(long, value_name = "THRESHOLD")]
  pub nms_threshold: Option<f32>,
  /// 类别名称文件，每行一个
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,
  /// 每张图像重复推理次数
  #[arg(long, default_value = "1", value_name = "COUNT")]
  pub repeat: usize,
  /// 单个目标扫码重试的时间上限（毫秒）
  #[arg(long, value_name = "MILLIS")]
  pub deadline_ms: Option<u64>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let config = DetectorConfig::from_url(&args.model)?
    .with_thresholds(args.confidence, args.nms_threshold)?;
  let engine = TractEngine::new(&config.model_path, config.input_height, config.input_width)?;
  let model = Detector::new(engine, config);

  let input = InputWrapper::from_url(&args.input)?;
  info!("待处理图像: {} 张", input.len_hint());
  let mut output = DirectoryRecordOutput::from_url(&args.output)?;
  if let Some(path) = &args.labels {
    output = output.with_labels(Labels::from_file(path)?);
  }

  let deadline = args.deadline_ms.map(Duration::from_millis);
  let recovery = Recovery::new(RecoveryConfig::default().with_deadline(deadline));

  let summary = ScanTask::new(RqrrScanner::new(), recovery)
    .with_repeat(args.repeat)
    .with_interrupt(Some(interrupt_channel()?))
    .run_task(input, model, &output)?;
  output.write_summary(&summary.to_json())?;

  Ok(())
}
