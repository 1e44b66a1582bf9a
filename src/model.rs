// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{path::Path, str::FromStr};

use crate::geometry::Rect;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 最终检测结果，坐标位于原图像素空间
#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub label: u32,
  pub score: f32,
  pub bbox: Rect,
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem> {
    self.items.iter()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

/// 类别名称表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
  names: Vec<String>,
}

impl Labels {
  pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
    Self {
      names: names.into_iter().map(Into::into).collect(),
    }
  }

  /// 每行一个类别名称，空行忽略
  pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
    let text = std::fs::read_to_string(path)?;
    Ok(Self::new(
      text.lines().map(str::trim).filter(|l| !l.is_empty()),
    ))
  }

  pub fn name(&self, label: u32) -> &str {
    self
      .names
      .get(label as usize)
      .map(String::as_str)
      .unwrap_or("unknown")
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}

impl Default for Labels {
  fn default() -> Self {
    Self::new(["QRCode"])
  }
}

impl FromStr for Labels {
  type Err = std::convert::Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(Self::new(
      s.split(',').map(str::trim).filter(|l| !l.is_empty()),
    ))
  }
}

mod decode;
mod detector;
mod engine;
mod suppress;
#[cfg(feature = "engine_tract")]
mod tract_engine;

pub use self::decode::{
  BoxEncoding, CxCyWh, DecodeError, DecoderConfig, Dfl, HeadEncoding, Ltrb, Proposal,
  ProposalDecoder, ScoreActivation, StrideLevel, TensorLayout,
};
pub use self::detector::{Detector, DetectorConfig, DetectorConfigError, DetectorError};
pub use self::engine::InferenceEngine;
pub use self::suppress::{iou, nms, suppress, suppress_with};
#[cfg(feature = "engine_tract")]
pub use self::tract_engine::{TractEngine, TractEngineError};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn labels_fall_back_to_unknown() {
    let labels: Labels = "QRCode, DataMatrix".parse().unwrap();
    assert_eq!(labels.len(), 2);
    assert_eq!(labels.name(1), "DataMatrix");
    assert_eq!(labels.name(7), "unknown");
  }
}
