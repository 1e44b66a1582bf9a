// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 检测结果可视化与文本记录
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect as PixelRect};

use crate::model::{DetectItem, DetectResult, Labels};

const BOX_THICKNESS: i32 = 2;

// 按类别轮换的边框颜色
const PALETTE: [[u8; 3]; 6] = [
  [0, 0, 255],
  [255, 0, 0],
  [0, 200, 0],
  [255, 160, 0],
  [160, 0, 255],
  [0, 200, 200],
];

pub struct Draw {
  thickness: i32,
  palette: Vec<[u8; 3]>,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      thickness: BOX_THICKNESS,
      palette: PALETTE.to_vec(),
    }
  }
}

impl Draw {
  pub fn with_thickness(mut self, thickness: i32) -> Self {
    self.thickness = thickness.max(1);
    self
  }

  fn color(&self, label: u32) -> Rgb<u8> {
    Rgb(self.palette[label as usize % self.palette.len()])
  }

  /// 在原图坐标系中绘制边框，边框向内加粗
  pub fn draw_bbox(&self, image: &mut RgbImage, item: &DetectItem) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let [x0, y0, x1, y1] = item.bbox.corners();
    let x_min = (x0.floor() as i32).clamp(0, w - 1);
    let y_min = (y0.floor() as i32).clamp(0, h - 1);
    let x_max = (x1.ceil() as i32).clamp(0, w - 1);
    let y_max = (y1.ceil() as i32).clamp(0, h - 1);
    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = self.color(item.label);
    for t in 0..self.thickness {
      let width = x_max - x_min - 2 * t + 1;
      let height = y_max - y_min - 2 * t + 1;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = PixelRect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }
  }

  pub fn draw_detections(&self, image: &mut RgbImage, result: &DetectResult) {
    for item in result.iter() {
      self.draw_bbox(image, item);
    }
  }
}

/// 检测结果的文本记录，每行 `标签, 置信度%, x0, y0, x1, y1`
pub struct Record {
  pub label_with_name: bool,
}

impl Record {
  pub fn format(&self, result: &DetectResult, labels: &Labels) -> String {
    result
      .iter()
      .map(|item| {
        let name = if self.label_with_name {
          labels.name(item.label).to_string()
        } else {
          item.label.to_string()
        };
        let [x0, y0, x1, y1] = item.bbox.corners();
        format!(
          "{}, {:.1}, {:.0}, {:.0}, {:.0}, {:.0}",
          name,
          item.score * 100.0,
          x0,
          y0,
          x1,
          y1
        )
      })
      .collect::<Vec<_>>()
      .join("\n")
  }

  pub fn record(
    &self,
    result: &DetectResult,
    labels: &Labels,
    path: &Path,
  ) -> Result<(), std::io::Error> {
    std::fs::write(path.with_extension("txt"), self.format(result, labels))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::Rect;

  fn result() -> DetectResult {
    DetectResult::from(vec![
      DetectItem {
        label: 0,
        score: 0.9,
        bbox: Rect::new(10.0, 20.0, 30.0, 40.0),
      },
      DetectItem {
        label: 1,
        score: 0.456,
        bbox: Rect::new(0.0, 0.0, 5.0, 5.0),
      },
    ])
  }

  #[test]
  fn record_lines_use_percent_and_corners() {
    let labels: Labels = "QRCode, Barcode".parse().unwrap();
    let by_id = Record { label_with_name: false }.format(&result(), &labels);
    assert_eq!(by_id, "0, 90.0, 10, 20, 40, 60\n1, 45.6, 0, 0, 5, 5");

    let by_name = Record { label_with_name: true }.format(&result(), &labels);
    assert!(by_name.starts_with("QRCode, 90.0"));
  }

  #[test]
  fn draws_box_outline_only() {
    let mut image = RgbImage::new(64, 64);
    Draw::default().draw_detections(&mut image, &result());
    assert_eq!(image.get_pixel(10, 20), &Rgb(PALETTE[0]));
    assert_eq!(image.get_pixel(11, 21), &Rgb(PALETTE[0]));
    assert_eq!(image.get_pixel(25, 40), &Rgb([0, 0, 0]));
  }

  #[test]
  fn thickness_grows_inward() {
    let mut image = RgbImage::new(64, 64);
    Draw::default()
      .with_thickness(4)
      .draw_detections(&mut image, &result());
    assert_eq!(image.get_pixel(13, 23), &Rgb(PALETTE[0]));
    assert_eq!(image.get_pixel(14, 24), &Rgb([0, 0, 0]));
    assert_eq!(image.get_pixel(9, 19), &Rgb([0, 0, 0]));
  }

  #[test]
  fn out_of_image_boxes_are_ignored() {
    let mut image = RgbImage::new(8, 8);
    let far = DetectResult::from(vec![DetectItem {
      label: 0,
      score: 0.5,
      bbox: Rect::new(100.0, 100.0, 10.0, 10.0),
    }]);
    Draw::default().draw_detections(&mut image, &far);
    assert!(image.pixels().all(|p| p == &Rgb([0, 0, 0])));
  }
}
