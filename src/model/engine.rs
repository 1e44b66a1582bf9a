// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/engine.rs - 推理引擎接口
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use crate::frame::RgbNhwcFrame;

/// 推理引擎：输入 letterbox 之后的画布，输出各检测头的原始浮点张量。
///
/// 输出顺序与 `DetectorConfig::strides` 一一对应，少返回的检测头按缺失处理。
pub trait InferenceEngine {
  type Error: std::error::Error + Send + Sync + 'static;

  fn run(&self, input: &RgbNhwcFrame) -> Result<Vec<Vec<f32>>, Self::Error>;
}

impl<T: InferenceEngine + ?Sized> InferenceEngine for Box<T> {
  type Error = T::Error;

  fn run(&self, input: &RgbNhwcFrame) -> Result<Vec<Vec<f32>>, Self::Error> {
    (**self).run(input)
  }
}
