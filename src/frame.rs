// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - NHWC 帧定义
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

const RGB_CHANNELS: usize = 3;

pub trait AsNhwcFrame {
  fn as_nhwc(&self) -> &[u8];
}

/// 模型输入画布，RGB 三通道，按 NHWC 排列
#[derive(Debug, Clone)]
pub struct RgbNhwcFrame {
  data: Box<[u8]>,
  height: usize,
  width: usize,
}

impl RgbNhwcFrame {
  pub fn with_shape(height: usize, width: usize) -> Self {
    Self::filled(height, width, [0, 0, 0])
  }

  /// 以固定颜色填充整块画布
  pub fn filled(height: usize, width: usize, fill: [u8; 3]) -> Self {
    let data = fill
      .iter()
      .copied()
      .cycle()
      .take(RGB_CHANNELS * height * width)
      .collect::<Vec<u8>>()
      .into_boxed_slice();
    Self {
      data,
      height,
      width,
    }
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
    let idx = (y * self.width + x) * RGB_CHANNELS;
    [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
  }

  pub fn put_pixel(&mut self, x: usize, y: usize, rgb: [u8; 3]) {
    let idx = (y * self.width + x) * RGB_CHANNELS;
    self.data[idx..idx + RGB_CHANNELS].copy_from_slice(&rgb);
  }

  /// 转为 NCHW 排列的浮点张量，像素值缩放到 [0, 1]
  pub fn to_nchw_f32(&self) -> Vec<f32> {
    let plane = self.height * self.width;
    let mut out = vec![0f32; plane * RGB_CHANNELS];
    for (idx, px) in self.data.chunks_exact(RGB_CHANNELS).enumerate() {
      for c in 0..RGB_CHANNELS {
        out[c * plane + idx] = px[c] as f32 / 255.0;
      }
    }
    out
  }
}

impl AsNhwcFrame for RgbNhwcFrame {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn filled_frame_repeats_fill_color() {
    let frame = RgbNhwcFrame::filled(2, 3, [114, 114, 114]);
    assert_eq!(frame.as_nhwc().len(), 18);
    assert!(frame.as_nhwc().iter().all(|&v| v == 114));
  }

  #[test]
  fn nchw_conversion_splits_planes() {
    let mut frame = RgbNhwcFrame::with_shape(1, 2);
    frame.put_pixel(0, 0, [255, 0, 0]);
    frame.put_pixel(1, 0, [0, 255, 51]);
    let nchw = frame.to_nchw_f32();
    assert_eq!(nchw, vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.2]);
  }
}
