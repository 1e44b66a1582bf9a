// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/decode.rs - 多尺度检测头输出解码
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, error};

use crate::geometry::Rect;

/// 候选框，坐标位于模型输入画布空间
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proposal {
  pub bbox: Rect,
  pub label: u32,
  pub score: f32,
}

/// 单个检测头的输出张量及其步长
#[derive(Debug, Clone, Copy)]
pub struct StrideLevel<'a> {
  pub stride: u32,
  pub tensor: Option<&'a [f32]>,
}

impl<'a> StrideLevel<'a> {
  pub fn new(stride: u32, tensor: &'a [f32]) -> Self {
    Self {
      stride,
      tensor: Some(tensor),
    }
  }

  pub fn missing(stride: u32) -> Self {
    Self {
      stride,
      tensor: None,
    }
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
  #[error("步长 {stride} 的输出张量缺失")]
  MissingTensor { stride: u32 },
  #[error("步长 {stride} 对输入尺寸 {input_width}x{input_height} 无效")]
  InvalidStride {
    stride: u32,
    input_width: u32,
    input_height: u32,
  },
  #[error("步长 {stride} 的输出大小不匹配: 期望 {expected}, 实际 {actual}")]
  SizeMismatch {
    stride: u32,
    expected: usize,
    actual: usize,
  },
}

/// 张量在内存中的排列方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorLayout {
  /// 逐单元连续：[h][w][回归 + 分类]
  #[default]
  Nhwc,
  /// 逐通道平面：[回归 + 分类][h][w]
  Nchw,
}

impl FromStr for TensorLayout {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "nhwc" => Ok(TensorLayout::Nhwc),
      "nchw" => Ok(TensorLayout::Nchw),
      other => Err(format!("未知的张量排列: {}", other)),
    }
  }
}

/// 分类分支的激活函数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoreActivation {
  #[default]
  Sigmoid,
  /// 模型已输出概率
  Identity,
}

impl ScoreActivation {
  fn apply(self, x: f32) -> f32 {
    match self {
      ScoreActivation::Sigmoid => sigmoid(x),
      ScoreActivation::Identity => x,
    }
  }
}

impl FromStr for ScoreActivation {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "sigmoid" => Ok(ScoreActivation::Sigmoid),
      "identity" | "none" => Ok(ScoreActivation::Identity),
      other => Err(format!("未知的激活函数: {}", other)),
    }
  }
}

/// 回归分支的编码方式
pub trait BoxEncoding {
  /// 每个网格单元回归分支占用的通道数
  fn channels(&self) -> usize;

  /// `reg` 长度等于 `channels()`，`anchor` 为网格单元中心，
  /// 返回画布坐标 [x_min, y_min, x_max, y_max]
  fn decode_box(&self, reg: &[f32], anchor_x: f32, anchor_y: f32, stride: f32) -> [f32; 4];
}

/// 直接回归到四条边的距离，单位为步长
#[derive(Debug, Clone, Copy, Default)]
pub struct Ltrb;

impl BoxEncoding for Ltrb {
  fn channels(&self) -> usize {
    4
  }

  fn decode_box(&self, reg: &[f32], anchor_x: f32, anchor_y: f32, stride: f32) -> [f32; 4] {
    [
      anchor_x - reg[0] * stride,
      anchor_y - reg[1] * stride,
      anchor_x + reg[2] * stride,
      anchor_y + reg[3] * stride,
    ]
  }
}

/// 直接回归中心偏移与宽高，单位为步长
#[derive(Debug, Clone, Copy, Default)]
pub struct CxCyWh;

impl BoxEncoding for CxCyWh {
  fn channels(&self) -> usize {
    4
  }

  fn decode_box(&self, reg: &[f32], anchor_x: f32, anchor_y: f32, stride: f32) -> [f32; 4] {
    let cx = anchor_x + reg[0] * stride;
    let cy = anchor_y + reg[1] * stride;
    let half_w = reg[2] * stride / 2.0;
    let half_h = reg[3] * stride / 2.0;
    [cx - half_w, cy - half_h, cx + half_w, cy + half_h]
  }
}

/// 分布式回归（DFL），每条边 `reg_max` 个分箱，取 softmax 期望
#[derive(Debug, Clone, Copy)]
pub struct Dfl {
  pub reg_max: usize,
}

impl Default for Dfl {
  fn default() -> Self {
    Self { reg_max: 16 }
  }
}

impl BoxEncoding for Dfl {
  fn channels(&self) -> usize {
    4 * self.reg_max
  }

  fn decode_box(&self, reg: &[f32], anchor_x: f32, anchor_y: f32, stride: f32) -> [f32; 4] {
    let mut ltrb = [0f32; 4];
    if self.reg_max == 0 {
      return [anchor_x, anchor_y, anchor_x, anchor_y];
    }
    for (side, bins) in ltrb.iter_mut().zip(reg.chunks_exact(self.reg_max)) {
      *side = softmax_expectation(bins) * stride;
    }
    [
      anchor_x - ltrb[0],
      anchor_y - ltrb[1],
      anchor_x + ltrb[2],
      anchor_y + ltrb[3],
    ]
  }
}

fn softmax_expectation(bins: &[f32]) -> f32 {
  let max = bins.iter().copied().fold(f32::NEG_INFINITY, f32::max);
  let mut sum = 0f32;
  let mut weighted = 0f32;
  for (i, &v) in bins.iter().enumerate() {
    let e = (v - max).exp();
    sum += e;
    weighted += e * i as f32;
  }
  if sum > 0.0 { weighted / sum } else { 0.0 }
}

/// 可由配置选择的编码方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadEncoding {
  Ltrb,
  CxCyWh,
  Dfl { reg_max: usize },
}

impl Default for HeadEncoding {
  fn default() -> Self {
    HeadEncoding::Dfl { reg_max: 16 }
  }
}

impl BoxEncoding for HeadEncoding {
  fn channels(&self) -> usize {
    match *self {
      HeadEncoding::Ltrb => Ltrb.channels(),
      HeadEncoding::CxCyWh => CxCyWh.channels(),
      HeadEncoding::Dfl { reg_max } => Dfl { reg_max }.channels(),
    }
  }

  fn decode_box(&self, reg: &[f32], anchor_x: f32, anchor_y: f32, stride: f32) -> [f32; 4] {
    match *self {
      HeadEncoding::Ltrb => Ltrb.decode_box(reg, anchor_x, anchor_y, stride),
      HeadEncoding::CxCyWh => CxCyWh.decode_box(reg, anchor_x, anchor_y, stride),
      HeadEncoding::Dfl { reg_max } => Dfl { reg_max }.decode_box(reg, anchor_x, anchor_y, stride),
    }
  }
}

impl FromStr for HeadEncoding {
  type Err = String;

  /// `ltrb`、`cxcywh`、`dfl`（默认 16 分箱）或 `dfl<N>`
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let lower = s.to_ascii_lowercase();
    match lower.as_str() {
      "ltrb" => Ok(HeadEncoding::Ltrb),
      "cxcywh" => Ok(HeadEncoding::CxCyWh),
      "dfl" => Ok(HeadEncoding::default()),
      other => match other.strip_prefix("dfl").map(str::parse::<usize>) {
        Some(Ok(reg_max)) if reg_max > 0 => Ok(HeadEncoding::Dfl { reg_max }),
        _ => Err(format!("未知的回归编码: {}", s)),
      },
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
  pub input_width: u32,
  pub input_height: u32,
  pub num_classes: usize,
  pub layout: TensorLayout,
  pub activation: ScoreActivation,
}

impl Default for DecoderConfig {
  fn default() -> Self {
    Self {
      input_width: 640,
      input_height: 640,
      num_classes: 1,
      layout: TensorLayout::default(),
      activation: ScoreActivation::default(),
    }
  }
}

pub struct ProposalDecoder<E = HeadEncoding> {
  config: DecoderConfig,
  encoding: E,
}

impl<E: BoxEncoding> ProposalDecoder<E> {
  pub fn new(config: DecoderConfig, encoding: E) -> Self {
    Self { config, encoding }
  }

  pub fn config(&self) -> &DecoderConfig {
    &self.config
  }

  /// 每个网格单元的通道数（回归 + 分类）
  pub fn cell_channels(&self) -> usize {
    self.encoding.channels() + self.config.num_classes
  }

  /// 返回 (grid_h, grid_w)
  pub fn grid_size(&self, stride: u32) -> Result<(usize, usize), DecodeError> {
    let DecoderConfig {
      input_width,
      input_height,
      ..
    } = self.config;
    if stride == 0 || stride > input_width || stride > input_height {
      return Err(DecodeError::InvalidStride {
        stride,
        input_width,
        input_height,
      });
    }
    Ok((
      (input_height / stride) as usize,
      (input_width / stride) as usize,
    ))
  }

  /// 张量应有的元素个数
  pub fn expected_len(&self, stride: u32) -> Result<usize, DecodeError> {
    let (grid_h, grid_w) = self.grid_size(stride)?;
    Ok(grid_h * grid_w * self.cell_channels())
  }

  /// 解码单个检测头；置信度不低于 `score_threshold` 的单元产生候选框
  pub fn decode_level(
    &self,
    level: &StrideLevel<'_>,
    score_threshold: f32,
  ) -> Result<Vec<Proposal>, DecodeError> {
    let stride = level.stride;
    let tensor = level
      .tensor
      .ok_or(DecodeError::MissingTensor { stride })?;
    let (grid_h, grid_w) = self.grid_size(stride)?;
    let spatial = grid_h * grid_w;
    let channels = self.cell_channels();
    let expected = self.expected_len(stride)?;
    if tensor.len() != expected {
      return Err(DecodeError::SizeMismatch {
        stride,
        expected,
        actual: tensor.len(),
      });
    }

    let layout = self.config.layout;
    let at = |cell: usize, c: usize| match layout {
      TensorLayout::Nhwc => tensor[cell * channels + c],
      TensorLayout::Nchw => tensor[c * spatial + cell],
    };

    let reg_channels = self.encoding.channels();
    let max_x = self.config.input_width as f32;
    let max_y = self.config.input_height as f32;
    let stride_f = stride as f32;
    let mut reg = vec![0f32; reg_channels];
    let mut proposals = Vec::new();

    for gy in 0..grid_h {
      for gx in 0..grid_w {
        let cell = gy * grid_w + gx;

        let (logit, label) = {
          let mut max_logit = f32::NEG_INFINITY;
          let mut cls_idx = 0usize;
          for c in 0..self.config.num_classes {
            let v = at(cell, reg_channels + c);
            if v > max_logit {
              max_logit = v;
              cls_idx = c;
            }
          }
          (max_logit, cls_idx as u32)
        };

        let score = self.config.activation.apply(logit).clamp(0.0, 1.0);
        // NaN 也在此被过滤
        if !(score >= score_threshold) {
          continue;
        }

        for (k, slot) in reg.iter_mut().enumerate() {
          *slot = at(cell, k);
        }
        let anchor_x = (gx as f32 + 0.5) * stride_f;
        let anchor_y = (gy as f32 + 0.5) * stride_f;
        let [x0, y0, x1, y1] = self.encoding.decode_box(&reg, anchor_x, anchor_y, stride_f);

        let bbox = Rect::from_corners(
          x0.clamp(0.0, max_x),
          y0.clamp(0.0, max_y),
          x1.clamp(0.0, max_x),
          y1.clamp(0.0, max_y),
        );
        if bbox.width <= 0.0 || bbox.height <= 0.0 {
          continue;
        }

        proposals.push(Proposal { bbox, label, score });
      }
    }

    Ok(proposals)
  }

  /// 逐个检测头解码并拼接，失败的检测头记录日志后跳过
  pub fn decode(&self, levels: &[StrideLevel<'_>], score_threshold: f32) -> Vec<Proposal> {
    let mut proposals = Vec::new();
    for (head_idx, level) in levels.iter().enumerate() {
      match self.decode_level(level, score_threshold) {
        Ok(found) => {
          debug!(
            "检测头 {} (步长 {}): {} 个候选框",
            head_idx,
            level.stride,
            found.len()
          );
          proposals.extend(found);
        }
        Err(e) => {
          error!("检测头 {} 解码失败: {}", head_idx, e);
          continue;
        }
      }
    }
    proposals
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}
