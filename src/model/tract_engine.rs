// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/tract_engine.rs - 基于 tract 的 ONNX 推理引擎
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};
use tract_onnx::prelude::*;

use crate::{frame::RgbNhwcFrame, model::engine::InferenceEngine};

#[derive(Error, Debug)]
pub enum TractEngineError {
  #[error("加载模型 {path} 失败: {message}")]
  Load { path: String, message: String },
  #[error("输入尺寸 {actual_width}x{actual_height} 与模型输入 {width}x{height} 不一致")]
  InputShape {
    width: u32,
    height: u32,
    actual_width: usize,
    actual_height: usize,
  },
  #[error("推理失败: {0}")]
  Run(String),
}

/// 在 CPU 上运行 ONNX 模型，输入为 1x3xHxW 的 f32 张量，取值 [0, 1]
pub struct TractEngine {
  plan: SimplePlan<TypedFact, Box<dyn TypedOp>>,
  width: u32,
  height: u32,
}

impl TractEngine {
  pub fn new<P: AsRef<Path>>(
    model_path: P,
    height: u32,
    width: u32,
  ) -> Result<Self, TractEngineError> {
    let model_path = model_path.as_ref();
    let load_error = |e: TractError| TractEngineError::Load {
      path: model_path.display().to_string(),
      message: format!("{:#}", e),
    };

    info!("加载模型: {}", model_path.display());
    let plan = tract_onnx::onnx()
      .model_for_path(model_path)
      .map_err(load_error)?
      .with_input_fact(
        0,
        InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, height as usize, width as usize)),
      )
      .map_err(load_error)?
      .into_optimized()
      .map_err(load_error)?
      .into_runnable()
      .map_err(load_error)?;

    Ok(Self {
      plan,
      width,
      height,
    })
  }
}

impl InferenceEngine for TractEngine {
  type Error = TractEngineError;

  fn run(&self, input: &RgbNhwcFrame) -> Result<Vec<Vec<f32>>, Self::Error> {
    if input.width() != self.width as usize || input.height() != self.height as usize {
      return Err(TractEngineError::InputShape {
        width: self.width,
        height: self.height,
        actual_width: input.width(),
        actual_height: input.height(),
      });
    }

    let data = input.to_nchw_f32();
    let tensor = Tensor::from_shape(&[1, 3, input.height(), input.width()], &data)
      .map_err(|e| TractEngineError::Run(format!("{:#}", e)))?;

    let outputs = self
      .plan
      .run(tvec!(tensor.into()))
      .map_err(|e| TractEngineError::Run(format!("{:#}", e)))?;
    debug!("模型输出 {} 个张量", outputs.len());

    outputs
      .iter()
      .map(|output| {
        output
          .to_array_view::<f32>()
          .map(|view| view.iter().copied().collect())
          .map_err(|e| TractEngineError::Run(format!("{:#}", e)))
      })
      .collect()
  }
}
