// 该文件是 Shanan （山南西风） 项目的一部分。
// src/barcode/recovery.rs - 逐级增强重试的扫码流程
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
  fmt,
  time::{Duration, Instant},
};

use image::GrayImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  barcode::{
    Scanner, Symbol,
    enhance::{self, ThresholdMode},
  },
  geometry::{CropRect, Rect},
};

/// 单次扫码前对区域所做的增强
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
  Raw,
  Threshold { mode: ThresholdMode, level: u8 },
  Unsharp { sigma: f32, weight: f32 },
  ExpandPixels { pixels: u32 },
  Rescale { width: u32, height: u32 },
  ExpandRatio { ratio: f32 },
  Clahe { clip_limit: f32, grid_x: u32, grid_y: u32 },
}

impl fmt::Display for Strategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Strategy::Raw => write!(f, "raw"),
      Strategy::Threshold { mode, level } => write!(f, "threshold({}, {})", mode.name(), level),
      Strategy::Unsharp { sigma, weight } => {
        write!(f, "unsharp(sigma={}, weight={:.1})", sigma, weight)
      }
      Strategy::ExpandPixels { pixels } => write!(f, "expand({}px)", pixels),
      Strategy::Rescale { width, height } => write!(f, "rescale({}x{})", width, height),
      Strategy::ExpandRatio { ratio } => write!(f, "expand({:.0}%)", ratio * 100.0),
      Strategy::Clahe {
        clip_limit,
        grid_x,
        grid_y,
      } => write!(f, "clahe({}, {}x{})", clip_limit, grid_x, grid_y),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryConfig {
  pub threshold_modes: Vec<ThresholdMode>,
  pub threshold_levels: Vec<u8>,
  pub unsharp_sigmas: Vec<f32>,
  pub unsharp_weights: Vec<f32>,
  pub expand_pixels: Vec<u32>,
  pub rescale_width: u32,
  pub rescale_height: u32,
  pub expand_ratios: Vec<f32>,
  pub clahe_clip_limit: f32,
  pub clahe_grid: (u32, u32),
  /// 整个重试流程的时间上限，超时后返回已有结果（通常为空）
  pub deadline: Option<Duration>,
}

impl Default for RecoveryConfig {
  fn default() -> Self {
    Self {
      threshold_modes: vec![ThresholdMode::Binary, ThresholdMode::ToZero],
      threshold_levels: vec![97, 112, 127, 142, 157],
      unsharp_sigmas: vec![1.0, 3.0, 5.0],
      unsharp_weights: vec![0.5, 0.6, 0.7],
      expand_pixels: (15..35).collect(),
      rescale_width: 192,
      rescale_height: 192,
      expand_ratios: (1..=9).map(|k| k as f32 * 0.01).collect(),
      clahe_clip_limit: 2.0,
      clahe_grid: (8, 8),
      deadline: None,
    }
  }
}

impl RecoveryConfig {
  pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
    self.deadline = deadline;
    self
  }

  /// 按固定顺序惰性生成全部策略
  pub fn strategies(&self) -> StrategyIter<'_> {
    let thresholds = self.threshold_modes.iter().flat_map(move |&mode| {
      self
        .threshold_levels
        .iter()
        .map(move |&level| Strategy::Threshold { mode, level })
    });
    let unsharps = self.unsharp_sigmas.iter().flat_map(move |&sigma| {
      self
        .unsharp_weights
        .iter()
        .map(move |&weight| Strategy::Unsharp { sigma, weight })
    });
    let pixels = self
      .expand_pixels
      .iter()
      .map(|&pixels| Strategy::ExpandPixels { pixels });
    let rescale = std::iter::once(Strategy::Rescale {
      width: self.rescale_width,
      height: self.rescale_height,
    });
    let ratios = self
      .expand_ratios
      .iter()
      .map(|&ratio| Strategy::ExpandRatio { ratio });
    let clahe = std::iter::once(Strategy::Clahe {
      clip_limit: self.clahe_clip_limit,
      grid_x: self.clahe_grid.0,
      grid_y: self.clahe_grid.1,
    });

    StrategyIter {
      inner: Box::new(
        std::iter::once(Strategy::Raw)
          .chain(thresholds)
          .chain(unsharps)
          .chain(pixels)
          .chain(rescale)
          .chain(ratios)
          .chain(clahe),
      ),
    }
  }
}

pub struct StrategyIter<'a> {
  inner: Box<dyn Iterator<Item = Strategy> + 'a>,
}

impl Iterator for StrategyIter<'_> {
  type Item = Strategy;

  fn next(&mut self) -> Option<Self::Item> {
    self.inner.next()
  }
}

/// 一次扫码尝试；成功时 `symbols` 为扫出的符号，否则为空
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryAttempt {
  pub strategy: Strategy,
  pub success: bool,
  pub symbols: Vec<Symbol>,
}

/// 一个区域的扫码结果。`symbols` 为空表示所有策略都已尝试（或超时）。
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
  pub symbols: Vec<Symbol>,
  pub attempts: Vec<RecoveryAttempt>,
  pub timed_out: bool,
}

impl RecoveryReport {
  pub fn is_decoded(&self) -> bool {
    !self.symbols.is_empty()
  }

  /// 成功时使用的策略
  pub fn strategy(&self) -> Option<Strategy> {
    self.attempts.iter().find(|a| a.success).map(|a| a.strategy)
  }
}

#[derive(Error, Debug)]
pub enum RecoveryError<E: std::error::Error + 'static> {
  #[error("检测框 {0:?} 在图像中的面积为 0")]
  EmptyRegion(Rect),
  #[error("扫码器错误: {0}")]
  Scanner(#[source] E),
}

#[derive(Debug, Clone, Default)]
pub struct Recovery {
  config: RecoveryConfig,
}

impl Recovery {
  pub fn new(config: RecoveryConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &RecoveryConfig {
    &self.config
  }

  /// 在整幅灰度图的 `roi` 区域上按顺序尝试各策略，第一次扫到符号即返回。
  pub fn recover<S: Scanner>(
    &self,
    scanner: &mut S,
    image: &GrayImage,
    roi: &Rect,
  ) -> Result<RecoveryReport, RecoveryError<S::Error>> {
    let (img_w, img_h) = image.dimensions();
    let base = CropRect::from_rect(roi, img_w, img_h).ok_or(RecoveryError::EmptyRegion(*roi))?;
    let region = enhance::crop(image, base);
    debug!("扫码区域: {}x{}", base.width, base.height);

    let started = Instant::now();
    let mut report = RecoveryReport::default();

    for strategy in self.config.strategies() {
      if let Some(deadline) = self.config.deadline {
        if !report.attempts.is_empty() && started.elapsed() >= deadline {
          warn!("扫码超时 ({:?})，已尝试 {} 次", deadline, report.attempts.len());
          report.timed_out = true;
          break;
        }
      }

      let Some(candidate) = self.prepare(strategy, image, &region, roi) else {
        debug!("策略 {} 得到空区域，跳过", strategy);
        continue;
      };

      scanner.clear_results();
      let symbols = scanner.scan(&candidate).map_err(RecoveryError::Scanner)?;
      let success = !symbols.is_empty();
      report.attempts.push(RecoveryAttempt {
        strategy,
        success,
        symbols: symbols.clone(),
      });

      if success {
        info!("扫码成功，策略: {}", strategy);
        report.symbols = symbols;
        return Ok(report);
      }
    }

    debug!("所有策略均未扫到符号");
    Ok(report)
  }

  fn prepare(
    &self,
    strategy: Strategy,
    image: &GrayImage,
    region: &GrayImage,
    roi: &Rect,
  ) -> Option<GrayImage> {
    let (img_w, img_h) = image.dimensions();
    match strategy {
      Strategy::Raw => Some(region.clone()),
      Strategy::Threshold { mode, level } => Some(enhance::threshold(region, level, mode)),
      Strategy::Unsharp { sigma, weight } => Some(enhance::unsharp(region, sigma, weight)),
      Strategy::ExpandPixels { pixels } => {
        enhance::expand_by_pixels(roi, pixels, img_w, img_h).map(|crop| enhance::crop(image, crop))
      }
      Strategy::Rescale { width, height } => Some(enhance::rescale(region, width, height)),
      Strategy::ExpandRatio { ratio } => {
        enhance::expand_by_ratio(roi, ratio, img_w, img_h).map(|crop| enhance::crop(image, crop))
      }
      Strategy::Clahe {
        clip_limit,
        grid_x,
        grid_y,
      } => Some(enhance::clahe(region, clip_limit, grid_x, grid_y)),
    }
  }
}
