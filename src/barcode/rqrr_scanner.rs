// 该文件是 Shanan （山南西风） 项目的一部分。
// src/barcode/rqrr_scanner.rs - 基于 rqrr 的二维码扫码器
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

use std::convert::Infallible;

use image::GrayImage;
use rqrr::PreparedImage;
use tracing::debug;

use crate::barcode::{Scanner, Symbol};

/// 只识别 QR 码。单个网格解码失败只记录日志，不视为扫码器错误。
#[derive(Debug, Default)]
pub struct RqrrScanner {
  results: Vec<Symbol>,
}

impl RqrrScanner {
  pub fn new() -> Self {
    Self::default()
  }

  /// 最近一次扫描得到的符号
  pub fn results(&self) -> &[Symbol] {
    &self.results
  }
}

impl Scanner for RqrrScanner {
  type Error = Infallible;

  fn clear_results(&mut self) {
    self.results.clear();
  }

  fn scan(&mut self, image: &GrayImage) -> Result<Vec<Symbol>, Self::Error> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Ok(Vec::new());
    }

    let mut prepared =
      PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
        image.get_pixel(x as u32, y as u32)[0]
      });
    for grid in prepared.detect_grids() {
      match grid.decode() {
        Ok((_meta, content)) => self.results.push(Symbol::qr(content)),
        Err(e) => debug!("网格解码失败: {}", e),
      }
    }
    Ok(self.results.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Luma;

  #[test]
  fn blank_image_has_no_symbols() {
    let mut scanner = RqrrScanner::new();
    let image = GrayImage::from_pixel(64, 64, Luma([255]));
    assert!(scanner.scan(&image).unwrap().is_empty());
    assert!(scanner.scan(&GrayImage::new(0, 0)).unwrap().is_empty());
  }

  #[test]
  fn clear_results_drops_previous_symbols() {
    let mut scanner = RqrrScanner::new();
    scanner.results.push(Symbol::qr("stale"));
    scanner.clear_results();
    assert!(scanner.results().is_empty());
  }
}
