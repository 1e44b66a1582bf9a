// 该文件是 Shanan （山南西风） 项目的一部分。
// src/letterbox.rs - 等比缩放加边框的预处理及其逆变换
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

use image::{RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

use crate::{frame::RgbNhwcFrame, geometry::Rect};

/// 默认填充色（中灰）
pub const LETTERBOX_FILL: [u8; 3] = [114, 114, 114];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LetterboxError {
  #[error("源图像尺寸为空: {width}x{height}")]
  EmptyImage { width: u32, height: u32 },
  #[error("目标画布尺寸为空: {width}x{height}")]
  EmptyTarget { width: u32, height: u32 },
}

/// 一次 letterbox 变换的参数，正向与逆向共用
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxParams {
  pub scale: f32,
  pub pad_x: u32,
  pub pad_y: u32,
  pub src_width: u32,
  pub src_height: u32,
  pub dst_width: u32,
  pub dst_height: u32,
  pub resized_width: u32,
  pub resized_height: u32,
}

impl LetterboxParams {
  pub fn new(src_h: u32, src_w: u32, dst_h: u32, dst_w: u32) -> Result<Self, LetterboxError> {
    if src_h == 0 || src_w == 0 {
      return Err(LetterboxError::EmptyImage {
        width: src_w,
        height: src_h,
      });
    }
    if dst_h == 0 || dst_w == 0 {
      return Err(LetterboxError::EmptyTarget {
        width: dst_w,
        height: dst_h,
      });
    }

    let scale = (dst_h as f32 / src_h as f32).min(dst_w as f32 / src_w as f32);
    let resized_width = ((src_w as f32 * scale) as u32).clamp(1, dst_w);
    let resized_height = ((src_h as f32 * scale) as u32).clamp(1, dst_h);

    Ok(Self {
      scale,
      pad_x: (dst_w - resized_width) / 2,
      pad_y: (dst_h - resized_height) / 2,
      src_width: src_w,
      src_height: src_h,
      dst_width: dst_w,
      dst_height: dst_h,
      resized_width,
      resized_height,
    })
  }

  /// 原图坐标 -> 画布坐标
  pub fn to_input_coords(&self, rect: &Rect) -> Rect {
    Rect {
      x: rect.x * self.scale + self.pad_x as f32,
      y: rect.y * self.scale + self.pad_y as f32,
      width: rect.width * self.scale,
      height: rect.height * self.scale,
    }
  }

  /// 画布坐标 -> 原图坐标，减去边框再除以缩放比例
  pub fn to_original(&self, rect: &Rect) -> Rect {
    Rect {
      x: (rect.x - self.pad_x as f32) / self.scale,
      y: (rect.y - self.pad_y as f32) / self.scale,
      width: rect.width / self.scale,
      height: rect.height / self.scale,
    }
  }
}

/// 以默认中灰色填充的 letterbox
pub fn to_input(
  image: &RgbImage,
  target_h: u32,
  target_w: u32,
) -> Result<(RgbNhwcFrame, LetterboxParams), LetterboxError> {
  to_input_with_fill(image, target_h, target_w, LETTERBOX_FILL)
}

pub fn to_input_with_fill(
  image: &RgbImage,
  target_h: u32,
  target_w: u32,
  fill: [u8; 3],
) -> Result<(RgbNhwcFrame, LetterboxParams), LetterboxError> {
  let params = LetterboxParams::new(image.height(), image.width(), target_h, target_w)?;
  debug!(
    "letterbox: {}x{} -> {}x{}, 缩放 {:.4}, 边框 ({}, {})",
    params.src_width,
    params.src_height,
    params.resized_width,
    params.resized_height,
    params.scale,
    params.pad_x,
    params.pad_y
  );

  let mut frame = RgbNhwcFrame::filled(target_h as usize, target_w as usize, fill);
  let same_size =
    params.resized_width == image.width() && params.resized_height == image.height();
  let resized;
  let source = if same_size {
    image
  } else {
    resized = image::imageops::resize(
      image,
      params.resized_width,
      params.resized_height,
      FilterType::Triangle,
    );
    &resized
  };

  for (x, y, pixel) in source.enumerate_pixels() {
    frame.put_pixel(
      (x + params.pad_x) as usize,
      (y + params.pad_y) as usize,
      pixel.0,
    );
  }

  Ok((frame, params))
}
