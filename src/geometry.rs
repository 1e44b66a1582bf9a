// 该文件是 Shanan （山南西风） 项目的一部分。
// src/geometry.rs - 矩形与交并比
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

/// 轴对齐矩形，左上角 + 宽高
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl Rect {
  pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  /// 由 [x_min, y_min, x_max, y_max] 构造，宽高不会为负
  pub fn from_corners(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
    Self {
      x: x0,
      y: y0,
      width: (x1 - x0).max(0.0),
      height: (y1 - y0).max(0.0),
    }
  }

  pub fn right(&self) -> f32 {
    self.x + self.width
  }

  pub fn bottom(&self) -> f32 {
    self.y + self.height
  }

  pub fn corners(&self) -> [f32; 4] {
    [self.x, self.y, self.right(), self.bottom()]
  }

  pub fn area(&self) -> f32 {
    self.width.max(0.0) * self.height.max(0.0)
  }

  pub fn center(&self) -> (f32, f32) {
    (self.x + self.width / 2.0, self.y + self.height / 2.0)
  }

  /// 交并比，不相交或并集面积为 0 时返回 0
  pub fn iou(&self, other: &Rect) -> f32 {
    let x0 = self.x.max(other.x);
    let y0 = self.y.max(other.y);
    let x1 = self.right().min(other.right());
    let y1 = self.bottom().min(other.bottom());

    let inter = (x1 - x0).max(0.0) * (y1 - y0).max(0.0);
    if inter <= 0.0 {
      return 0.0;
    }

    let union = self.area() + other.area() - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
  }

  /// 将四个角点限制在 [0, max] 范围内
  pub fn clamp(&self, max_x: f32, max_y: f32) -> Rect {
    let [x0, y0, x1, y1] = self.corners();
    Rect::from_corners(
      x0.clamp(0.0, max_x),
      y0.clamp(0.0, max_y),
      x1.clamp(0.0, max_x),
      y1.clamp(0.0, max_y),
    )
  }
}

/// 像素坐标下的整数裁剪区域
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

impl CropRect {
  /// 由角点构造裁剪区域，角点先限制在图像范围内，面积为 0 时返回 None
  pub fn from_corners(x0: i64, y0: i64, x1: i64, y1: i64, img_w: u32, img_h: u32) -> Option<Self> {
    let x0 = x0.clamp(0, img_w as i64);
    let y0 = y0.clamp(0, img_h as i64);
    let x1 = x1.clamp(0, img_w as i64);
    let y1 = y1.clamp(0, img_h as i64);
    if x1 <= x0 || y1 <= y0 {
      return None;
    }
    Some(Self {
      x: x0 as u32,
      y: y0 as u32,
      width: (x1 - x0) as u32,
      height: (y1 - y0) as u32,
    })
  }

  /// 浮点矩形按四舍五入取整后裁到图像范围
  pub fn from_rect(rect: &Rect, img_w: u32, img_h: u32) -> Option<Self> {
    let x0 = rect.x.round() as i64;
    let y0 = rect.y.round() as i64;
    let x1 = x0 + rect.width.round() as i64;
    let y1 = y0 + rect.height.round() as i64;
    Self::from_corners(x0, y0, x1, y1, img_w, img_h)
  }

  pub fn right(&self) -> u32 {
    self.x + self.width
  }

  pub fn bottom(&self) -> u32 {
    self.y + self.height
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-6
  }

  #[test]
  fn iou_is_symmetric() {
    let pairs = [
      (Rect::new(0.0, 0.0, 10.0, 10.0), Rect::new(5.0, 5.0, 10.0, 10.0)),
      (Rect::new(3.0, 1.0, 7.0, 2.0), Rect::new(4.0, 0.0, 1.0, 9.0)),
      (Rect::new(0.0, 0.0, 4.0, 4.0), Rect::new(1.0, 1.0, 2.0, 2.0)),
    ];
    for (a, b) in pairs {
      assert!(close(a.iou(&b), b.iou(&a)));
    }
  }

  #[test]
  fn iou_with_itself_is_one() {
    let a = Rect::new(12.5, 7.0, 30.0, 18.25);
    assert!(close(a.iou(&a), 1.0));
  }

  #[test]
  fn iou_of_disjoint_and_touching_rects_is_zero() {
    let a = Rect::new(0.0, 0.0, 10.0, 10.0);
    assert_eq!(a.iou(&Rect::new(20.0, 20.0, 5.0, 5.0)), 0.0);
    assert_eq!(a.iou(&Rect::new(10.0, 0.0, 5.0, 10.0)), 0.0);
  }

  #[test]
  fn iou_of_zero_area_rects_is_zero() {
    let a = Rect::new(5.0, 5.0, 0.0, 0.0);
    assert_eq!(a.iou(&a), 0.0);
  }

  #[test]
  fn iou_matches_hand_computed_value() {
    let a = Rect::new(0.0, 0.0, 10.0, 10.0);
    let b = Rect::new(5.0, 0.0, 10.0, 10.0);
    // 交集 50，并集 150
    assert!(close(a.iou(&b), 1.0 / 3.0));
  }

  #[test]
  fn crop_rect_clamps_and_rejects_degenerate() {
    let crop = CropRect::from_corners(-5, -5, 20, 20, 10, 10).unwrap();
    assert_eq!(crop, CropRect { x: 0, y: 0, width: 10, height: 10 });
    assert!(CropRect::from_corners(12, 0, 20, 5, 10, 10).is_none());
    assert!(CropRect::from_rect(&Rect::new(3.0, 3.0, 0.2, 4.0), 10, 10).is_none());
  }
}
