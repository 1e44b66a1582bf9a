// 该文件是 Shanan （山南西风） 项目的一部分。
// src/barcode/enhance.rs - 扫码前的图像增强
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

//! 所有变换都不修改输入，返回新的图像或区域。

use image::{GrayImage, Luma, imageops};
use imageproc::{contrast::ThresholdType, filter::gaussian_blur_f32};

use crate::geometry::{CropRect, Rect};

/// 二值化方式，与 OpenCV 的 THRESH_BINARY / THRESH_TOZERO 一致
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdMode {
  /// 大于阈值取 255，否则取 0
  Binary,
  /// 大于阈值保持原值，否则取 0
  ToZero,
}

impl ThresholdMode {
  pub fn name(&self) -> &'static str {
    match self {
      ThresholdMode::Binary => "binary",
      ThresholdMode::ToZero => "tozero",
    }
  }
}

impl From<ThresholdMode> for ThresholdType {
  fn from(mode: ThresholdMode) -> Self {
    match mode {
      ThresholdMode::Binary => ThresholdType::Binary,
      ThresholdMode::ToZero => ThresholdType::ToZero,
    }
  }
}

pub fn crop(image: &GrayImage, rect: CropRect) -> GrayImage {
  imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image()
}

pub fn threshold(image: &GrayImage, level: u8, mode: ThresholdMode) -> GrayImage {
  imageproc::contrast::threshold(image, level, mode.into())
}

/// 反锐化掩模：`(src - (1 - weight) * blur) / weight`，结果四舍五入并截断到 [0, 255]
pub fn unsharp(image: &GrayImage, sigma: f32, weight: f32) -> GrayImage {
  if sigma <= 0.0 || weight <= 0.0 || image.width() == 0 || image.height() == 0 {
    return image.clone();
  }

  let blurred = gaussian_blur_f32(image, sigma);
  let mut out = GrayImage::new(image.width(), image.height());
  for ((src, blur), dst) in image.pixels().zip(blurred.pixels()).zip(out.pixels_mut()) {
    let v = (src[0] as f32 - (1.0 - weight) * blur[0] as f32) / weight;
    *dst = Luma([v.round().clamp(0.0, 255.0) as u8]);
  }
  out
}

/// 检测框四周各外扩 `pixels` 个像素，角点截断取整后裁到图像范围
pub fn expand_by_pixels(roi: &Rect, pixels: u32, img_w: u32, img_h: u32) -> Option<CropRect> {
  let p = pixels as f32;
  CropRect::from_corners(
    (roi.x - p) as i64,
    (roi.y - p) as i64,
    (roi.right() + p) as i64,
    (roi.bottom() + p) as i64,
    img_w,
    img_h,
  )
}

/// 按比例外扩：左上角乘以 `1 - ratio`，右下角乘以 `1 + ratio`
pub fn expand_by_ratio(roi: &Rect, ratio: f32, img_w: u32, img_h: u32) -> Option<CropRect> {
  CropRect::from_corners(
    ((1.0 - ratio) * roi.x) as i64,
    ((1.0 - ratio) * roi.y) as i64,
    ((1.0 + ratio) * roi.right()) as i64,
    ((1.0 + ratio) * roi.bottom()) as i64,
    img_w,
    img_h,
  )
}

pub fn rescale(image: &GrayImage, width: u32, height: u32) -> GrayImage {
  imageops::resize(image, width, height, imageops::FilterType::Triangle)
}

/// 限制对比度的自适应直方图均衡（CLAHE）。
///
/// 图像被划分为 `grid_x × grid_y` 个块，每块的直方图按 `clip_limit` 截断并均匀回填，
/// 像素值由相邻四个块的映射表双线性插值得到。
pub fn clahe(image: &GrayImage, clip_limit: f32, grid_x: u32, grid_y: u32) -> GrayImage {
  let (width, height) = image.dimensions();
  if width == 0 || height == 0 || grid_x == 0 || grid_y == 0 {
    return image.clone();
  }

  let tile_w = width.div_ceil(grid_x.min(width));
  let tile_h = height.div_ceil(grid_y.min(height));
  let tiles_x = width.div_ceil(tile_w) as usize;
  let tiles_y = height.div_ceil(tile_h) as usize;

  let mut luts = vec![[0u8; 256]; tiles_x * tiles_y];
  for ty in 0..tiles_y {
    for tx in 0..tiles_x {
      let x0 = tx as u32 * tile_w;
      let y0 = ty as u32 * tile_h;
      let x1 = (x0 + tile_w).min(width);
      let y1 = (y0 + tile_h).min(height);

      let mut hist = [0u32; 256];
      for y in y0..y1 {
        for x in x0..x1 {
          hist[image.get_pixel(x, y)[0] as usize] += 1;
        }
      }
      let area = (x1 - x0) * (y1 - y0);
      luts[ty * tiles_x + tx] = tile_lut(&mut hist, area, clip_limit);
    }
  }

  let mut out = GrayImage::new(width, height);
  for y in 0..height {
    let (ty0, ty1, fy) = neighbours(y, tile_h, tiles_y);
    for x in 0..width {
      let (tx0, tx1, fx) = neighbours(x, tile_w, tiles_x);
      let v = image.get_pixel(x, y)[0] as usize;

      let lut = |ty: usize, tx: usize| luts[ty * tiles_x + tx][v] as f32;
      let top = lut(ty0, tx0) * (1.0 - fx) + lut(ty0, tx1) * fx;
      let bottom = lut(ty1, tx0) * (1.0 - fx) + lut(ty1, tx1) * fx;
      let value = top * (1.0 - fy) + bottom * fy;
      out.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
    }
  }
  out
}

fn tile_lut(hist: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
  if clip_limit > 0.0 {
    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
    let mut clipped = 0u32;
    for count in hist.iter_mut() {
      if *count > limit {
        clipped += *count - limit;
        *count = limit;
      }
    }

    let bonus = clipped / 256;
    let mut residual = clipped % 256;
    for count in hist.iter_mut() {
      *count += bonus;
    }
    if residual > 0 {
      let step = (256 / residual).max(1) as usize;
      let mut i = 0;
      while i < 256 && residual > 0 {
        hist[i] += 1;
        residual -= 1;
        i += step;
      }
    }
  }

  let scale = 255.0 / area.max(1) as f32;
  let mut lut = [0u8; 256];
  let mut sum = 0u32;
  for (value, count) in hist.iter().enumerate() {
    sum += count;
    lut[value] = (sum as f32 * scale).round().min(255.0) as u8;
  }
  lut
}

/// 像素所在位置左右（上下）两个块的下标与插值权重
fn neighbours(pos: u32, tile: u32, tiles: usize) -> (usize, usize, f32) {
  let t = (pos as f32 + 0.5) / tile as f32 - 0.5;
  if t <= 0.0 {
    return (0, 0, 0.0);
  }
  let t0 = t.floor() as usize;
  if t0 + 1 >= tiles {
    return (tiles - 1, tiles - 1, 0.0);
  }
  (t0, t0 + 1, t - t0 as f32)
}
