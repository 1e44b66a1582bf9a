// 该文件是 Shanan （山南西风） 项目的一部分。
// src/barcode.rs - 条码识别
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

use std::fmt;

use image::GrayImage;

/// 码制
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SymbolType {
  QrCode,
  Other(String),
}

impl fmt::Display for SymbolType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SymbolType::QrCode => write!(f, "QR-Code"),
      SymbolType::Other(name) => write!(f, "{}", name),
    }
  }
}

/// 一次解码得到的符号：文本内容与码制
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
  pub data: String,
  pub symbol_type: SymbolType,
}

impl Symbol {
  pub fn qr(data: impl Into<String>) -> Self {
    Self {
      data: data.into(),
      symbol_type: SymbolType::QrCode,
    }
  }
}

/// 扫码器。实例在多个区域之间复用，每次 `scan` 之前先调用 `clear_results`。
pub trait Scanner {
  type Error: std::error::Error + Send + Sync + 'static;

  fn clear_results(&mut self);

  fn scan(&mut self, image: &GrayImage) -> Result<Vec<Symbol>, Self::Error>;
}

impl<S: Scanner + ?Sized> Scanner for &mut S {
  type Error = S::Error;

  fn clear_results(&mut self) {
    (**self).clear_results()
  }

  fn scan(&mut self, image: &GrayImage) -> Result<Vec<Symbol>, Self::Error> {
    (**self).scan(image)
  }
}

pub mod enhance;
mod recovery;
#[cfg(feature = "scanner_rqrr")]
mod rqrr_scanner;

pub use self::recovery::{
  Recovery, RecoveryAttempt, RecoveryConfig, RecoveryError, RecoveryReport, Strategy, StrategyIter,
};
#[cfg(feature = "scanner_rqrr")]
pub use self::rqrr_scanner::RqrrScanner;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn symbol_type_names() {
    assert_eq!(SymbolType::QrCode.to_string(), "QR-Code");
    assert_eq!(SymbolType::Other("EAN-13".into()).to_string(), "EAN-13");
    assert_eq!(Symbol::qr("hello").symbol_type, SymbolType::QrCode);
  }
}
