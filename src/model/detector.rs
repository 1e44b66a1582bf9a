// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/detector.rs - 单阶段检测器
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  letterbox::{self, LETTERBOX_FILL, LetterboxError, LetterboxParams},
  model::{
    DetectResult, Model,
    decode::{
      DecoderConfig, HeadEncoding, ProposalDecoder, ScoreActivation, StrideLevel, TensorLayout,
    },
    engine::InferenceEngine,
    suppress::suppress_with,
  },
  query_value,
};

const DEFAULT_STRIDES: [u32; 3] = [8, 16, 32];
const DEFAULT_SCORE_THRESHOLD: f32 = 0.45;
const DEFAULT_NMS_THRESHOLD: f32 = 0.45;

#[derive(Error, Debug)]
pub enum DetectorConfigError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch { expected: String, actual: String },
  #[error("参数 {key}={value} 无效: {reason}")]
  InvalidParam {
    key: String,
    value: String,
    reason: String,
  },
}

impl DetectorConfigError {
  fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
    DetectorConfigError::InvalidParam {
      key: key.to_string(),
      value: value.to_string(),
      reason: reason.into(),
    }
  }
}

/// 检测器配置，可由模型 URL 的查询参数给出，例如
/// `yolo:///models/qrcode.onnx?size=640,640&classes=1&strides=8,16,32&encoding=dfl16`
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
  pub model_path: String,
  pub input_height: u32,
  pub input_width: u32,
  pub num_classes: usize,
  pub strides: Vec<u32>,
  pub encoding: HeadEncoding,
  pub layout: TensorLayout,
  pub activation: ScoreActivation,
  pub score_threshold: f32,
  pub nms_threshold: f32,
  pub fill: [u8; 3],
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      model_path: String::new(),
      input_height: 640,
      input_width: 640,
      num_classes: 1,
      strides: DEFAULT_STRIDES.to_vec(),
      encoding: HeadEncoding::default(),
      layout: TensorLayout::default(),
      activation: ScoreActivation::default(),
      score_threshold: DEFAULT_SCORE_THRESHOLD,
      nms_threshold: DEFAULT_NMS_THRESHOLD,
      fill: LETTERBOX_FILL,
    }
  }
}

impl FromUrlWithScheme for DetectorConfig {
  const SCHEME: &'static str = "yolo";
}

impl FromUrl for DetectorConfig {
  type Error = DetectorConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DetectorConfigError::SchemeMismatch {
        expected: Self::SCHEME.to_string(),
        actual: url.scheme().to_string(),
      });
    }

    let mut config = DetectorConfig {
      model_path: url.path().to_string(),
      ..Default::default()
    };

    if let Some(size) = query_value(url, "size") {
      let (h, w) = parse_size(&size).ok_or_else(|| {
        DetectorConfigError::invalid("size", &size, "应为 H,W 形式的正整数")
      })?;
      config.input_height = h;
      config.input_width = w;
    }
    if let Some(classes) = query_value(url, "classes") {
      config.num_classes = classes
        .parse::<usize>()
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| DetectorConfigError::invalid("classes", &classes, "应为正整数"))?;
    }
    if let Some(strides) = query_value(url, "strides") {
      config.strides = parse_list(&strides)
        .filter(|s: &Vec<u32>| !s.is_empty() && s.iter().all(|&v| v > 0))
        .ok_or_else(|| DetectorConfigError::invalid("strides", &strides, "应为逗号分隔的正整数"))?;
    }
    if let Some(encoding) = query_value(url, "encoding") {
      config.encoding = encoding
        .parse()
        .map_err(|e: String| DetectorConfigError::invalid("encoding", &encoding, e))?;
    }
    if let Some(layout) = query_value(url, "layout") {
      config.layout = layout
        .parse()
        .map_err(|e: String| DetectorConfigError::invalid("layout", &layout, e))?;
    }
    if let Some(activation) = query_value(url, "activation") {
      config.activation = activation
        .parse()
        .map_err(|e: String| DetectorConfigError::invalid("activation", &activation, e))?;
    }
    if let Some(conf) = query_value(url, "conf") {
      config.score_threshold = parse_unit(&conf)
        .ok_or_else(|| DetectorConfigError::invalid("conf", &conf, "应在 [0, 1] 之间"))?;
    }
    if let Some(nms) = query_value(url, "nms") {
      config.nms_threshold = parse_unit(&nms)
        .ok_or_else(|| DetectorConfigError::invalid("nms", &nms, "应在 [0, 1] 之间"))?;
    }
    if let Some(fill) = query_value(url, "fill") {
      let v = fill
        .parse::<u8>()
        .map_err(|_| DetectorConfigError::invalid("fill", &fill, "应为 0-255 的整数"))?;
      config.fill = [v, v, v];
    }

    Ok(config)
  }
}

fn parse_list<T: std::str::FromStr>(s: &str) -> Option<Vec<T>> {
  s.split(',').map(|v| v.trim().parse::<T>().ok()).collect()
}

fn parse_size(s: &str) -> Option<(u32, u32)> {
  match parse_list::<u32>(s)?.as_slice() {
    &[h, w] if h > 0 && w > 0 => Some((h, w)),
    &[n] if n > 0 => Some((n, n)),
    _ => None,
  }
}

fn parse_unit(s: &str) -> Option<f32> {
  s.parse::<f32>().ok().filter(|v| (0.0..=1.0).contains(v))
}

fn check_unit(key: &str, value: f32) -> Result<f32, DetectorConfigError> {
  if (0.0..=1.0).contains(&value) {
    Ok(value)
  } else {
    Err(DetectorConfigError::invalid(key, &value.to_string(), "应在 [0, 1] 之间"))
  }
}

impl DetectorConfig {
  /// 用命令行给出的阈值覆盖 URL 中的配置
  pub fn with_thresholds(
    mut self,
    score_threshold: Option<f32>,
    nms_threshold: Option<f32>,
  ) -> Result<Self, DetectorConfigError> {
    if let Some(score) = score_threshold {
      self.score_threshold = check_unit("confidence", score)?;
    }
    if let Some(nms) = nms_threshold {
      self.nms_threshold = check_unit("nms-threshold", nms)?;
    }
    Ok(self)
  }

  pub fn decoder_config(&self) -> DecoderConfig {
    DecoderConfig {
      input_width: self.input_width,
      input_height: self.input_height,
      num_classes: self.num_classes,
      layout: self.layout,
      activation: self.activation,
    }
  }
}

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("输入图像无效: {0}")]
  EmptyInput(#[from] LetterboxError),
  #[error("推理引擎错误: {0}")]
  Engine(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub struct Detector<E> {
  engine: E,
  config: DetectorConfig,
  decoder: ProposalDecoder,
}

impl<E: InferenceEngine> Detector<E> {
  pub fn new(engine: E, config: DetectorConfig) -> Self {
    let decoder = ProposalDecoder::new(config.decoder_config(), config.encoding);
    debug!(
      "检测器: 输入 {}x{}, 类别 {}, 步长 {:?}, 编码 {:?}",
      config.input_width, config.input_height, config.num_classes, config.strides, config.encoding
    );
    Self {
      engine,
      config,
      decoder,
    }
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  pub fn engine(&self) -> &E {
    &self.engine
  }

  /// 解码 + NMS + 坐标还原；各检测头全部解码完成后才进行 NMS
  pub fn postprocess(&self, outputs: &[Vec<f32>], params: &LetterboxParams) -> DetectResult {
    debug!("后处理模型输出");
    if outputs.len() != self.config.strides.len() {
      warn!(
        "模型输出数量为 {}, 配置的检测头数量为 {}",
        outputs.len(),
        self.config.strides.len()
      );
    }

    let levels: Vec<StrideLevel<'_>> = self
      .config
      .strides
      .iter()
      .enumerate()
      .map(|(i, &stride)| match outputs.get(i) {
        Some(tensor) => StrideLevel::new(stride, tensor),
        None => StrideLevel::missing(stride),
      })
      .collect();

    let proposals = self.decoder.decode(&levels, self.config.score_threshold);
    let items = suppress_with(proposals, self.config.nms_threshold, params);
    debug!("检测到 {} 个物体", items.len());
    DetectResult::from(items)
  }
}

impl<E: InferenceEngine> Model for Detector<E> {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = DetectorError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let (frame, params) = letterbox::to_input_with_fill(
      input,
      self.config.input_height,
      self.config.input_width,
      self.config.fill,
    )?;

    debug!("执行模型推理");
    let outputs = self
      .engine
      .run(&frame)
      .map_err(|e| DetectorError::Engine(Box::new(e)))?;

    Ok(self.postprocess(&outputs, &params))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::RgbNhwcFrame;

  #[derive(Debug, Error)]
  #[error("设备忙")]
  struct Busy;

  struct FailingEngine;

  impl InferenceEngine for FailingEngine {
    type Error = Busy;

    fn run(&self, _input: &RgbNhwcFrame) -> Result<Vec<Vec<f32>>, Self::Error> {
      Err(Busy)
    }
  }

  struct SilentEngine;

  impl InferenceEngine for SilentEngine {
    type Error = Busy;

    fn run(&self, _input: &RgbNhwcFrame) -> Result<Vec<Vec<f32>>, Self::Error> {
      Ok(Vec::new())
    }
  }

  #[test]
  fn parses_config_from_url() {
    let url = Url::parse(concat!(
      "yolo:///models/qr.onnx?size=320,480&classes=2&strides=8,16",
      "&encoding=ltrb&layout=nchw&activation=identity&conf=0.3&nms=0.6&fill=0",
    ))
    .unwrap();
    let config = DetectorConfig::from_url(&url).unwrap();
    assert_eq!(config.model_path, "/models/qr.onnx");
    assert_eq!((config.input_height, config.input_width), (320, 480));
    assert_eq!(config.num_classes, 2);
    assert_eq!(config.strides, vec![8, 16]);
    assert_eq!(config.encoding, HeadEncoding::Ltrb);
    assert_eq!(config.layout, TensorLayout::Nchw);
    assert_eq!(config.activation, ScoreActivation::Identity);
    assert_eq!(config.score_threshold, 0.3);
    assert_eq!(config.nms_threshold, 0.6);
    assert_eq!(config.fill, [0, 0, 0]);
  }

  #[test]
  fn defaults_match_three_head_layout() {
    let url = Url::parse("yolo:///m.onnx").unwrap();
    let config = DetectorConfig::from_url(&url).unwrap();
    assert_eq!(config.strides, vec![8, 16, 32]);
    assert_eq!(config.encoding, HeadEncoding::Dfl { reg_max: 16 });
    assert_eq!((config.input_height, config.input_width), (640, 640));
  }

  #[test]
  fn rejects_bad_params() {
    for bad in [
      "yolo:///m?size=0,640",
      "yolo:///m?classes=0",
      "yolo:///m?strides=8,x",
      "yolo:///m?conf=1.5",
      "yolo:///m?encoding=anchor",
      "file:///m",
    ] {
      let url = Url::parse(bad).unwrap();
      assert!(DetectorConfig::from_url(&url).is_err(), "{}", bad);
    }
  }

  #[test]
  fn cli_thresholds_override_url() {
    let config = DetectorConfig::default()
      .with_thresholds(Some(0.25), None)
      .unwrap();
    assert_eq!(config.score_threshold, 0.25);
    assert_eq!(config.nms_threshold, DEFAULT_NMS_THRESHOLD);
  }

  #[test]
  fn cli_thresholds_outside_unit_range_are_rejected() {
    for (score, nms) in [(Some(1.5), None), (None, Some(-0.1)), (Some(f32::NAN), None)] {
      assert!(matches!(
        DetectorConfig::default().with_thresholds(score, nms),
        Err(DetectorConfigError::InvalidParam { .. })
      ));
    }
  }

  #[test]
  fn engine_failure_is_propagated() {
    let detector = Detector::new(FailingEngine, DetectorConfig::default());
    let image = RgbImage::new(32, 32);
    assert!(matches!(detector.infer(&image), Err(DetectorError::Engine(_))));
  }

  #[test]
  fn empty_image_is_rejected() {
    let detector = Detector::new(SilentEngine, DetectorConfig::default());
    let image = RgbImage::new(0, 0);
    assert!(matches!(detector.infer(&image), Err(DetectorError::EmptyInput(_))));
  }

  #[test]
  fn missing_outputs_yield_empty_result() {
    let detector = Detector::new(SilentEngine, DetectorConfig::default());
    let image = RgbImage::new(64, 48);
    let result = detector.infer(&image).unwrap();
    assert!(result.is_empty());
  }
}
