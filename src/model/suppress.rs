// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/suppress.rs - 非极大值抑制与坐标还原
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use tracing::debug;

use crate::{
  geometry::Rect,
  letterbox::{LetterboxError, LetterboxParams},
  model::{DetectItem, Proposal},
};

/// 计算两个边界框的 IoU
pub fn iou(a: &Rect, b: &Rect) -> f32 {
  a.iou(b)
}

/// 按置信度降序稳定排序后贪心抑制。
///
/// 同类别且 IoU 严格大于 `iou_threshold` 的候选框被丢弃，
/// IoU 恰好等于阈值时两者都保留。置信度相同的候选框保持输入顺序。
pub fn nms(mut proposals: Vec<Proposal>, iou_threshold: f32) -> Vec<Proposal> {
  proposals.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut picked: Vec<Proposal> = Vec::with_capacity(proposals.len());
  for candidate in proposals {
    let suppressed = picked
      .iter()
      .any(|kept| kept.label == candidate.label && kept.bbox.iou(&candidate.bbox) > iou_threshold);
    if !suppressed {
      picked.push(candidate);
    }
  }
  picked
}

/// 将画布坐标映射回原图并限制在 `[0, img_w - 1] × [0, img_h - 1]`，再执行 NMS。
///
/// 限制后面积为 0 的框（整体落在填充区）被丢弃。
pub fn suppress(
  proposals: Vec<Proposal>,
  iou_threshold: f32,
  img_h: u32,
  img_w: u32,
  input_h: u32,
  input_w: u32,
) -> Result<Vec<DetectItem>, LetterboxError> {
  let params = LetterboxParams::new(img_h, img_w, input_h, input_w)?;
  Ok(suppress_with(proposals, iou_threshold, &params))
}

pub fn suppress_with(
  proposals: Vec<Proposal>,
  iou_threshold: f32,
  params: &LetterboxParams,
) -> Vec<DetectItem> {
  let total = proposals.len();
  let max_x = params.src_width.saturating_sub(1) as f32;
  let max_y = params.src_height.saturating_sub(1) as f32;

  let mapped: Vec<Proposal> = proposals
    .into_iter()
    .filter_map(|p| {
      let bbox = params.to_original(&p.bbox).clamp(max_x, max_y);
      if bbox.area() > 0.0 {
        Some(Proposal { bbox, ..p })
      } else {
        debug!("丢弃落在填充区的候选框: {:?}", p.bbox);
        None
      }
    })
    .collect();

  let picked = nms(mapped, iou_threshold);
  debug!("NMS: {} -> {} 个候选框", total, picked.len());

  picked
    .into_iter()
    .map(|p| DetectItem {
      label: p.label,
      score: p.score,
      bbox: p.bbox,
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn proposal(x: f32, y: f32, w: f32, h: f32, label: u32, score: f32) -> Proposal {
    Proposal {
      bbox: Rect::new(x, y, w, h),
      label,
      score,
    }
  }

  #[test]
  fn overlapping_same_class_boxes_are_suppressed() {
    let kept = nms(
      vec![
        proposal(0.0, 0.0, 10.0, 10.0, 0, 0.8),
        proposal(1.0, 1.0, 10.0, 10.0, 0, 0.95),
        proposal(50.0, 50.0, 10.0, 10.0, 0, 0.6),
      ],
      0.45,
    );
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].score, 0.95);
    assert_eq!(kept[1].score, 0.6);
  }

  #[test]
  fn different_classes_are_not_suppressed() {
    let kept = nms(
      vec![
        proposal(0.0, 0.0, 10.0, 10.0, 0, 0.9),
        proposal(0.0, 0.0, 10.0, 10.0, 1, 0.8),
      ],
      0.45,
    );
    assert_eq!(kept.len(), 2);
  }

  #[test]
  fn iou_equal_to_threshold_keeps_both() {
    // IoU = 50 / 100 = 0.5
    let a = proposal(0.0, 0.0, 10.0, 10.0, 0, 0.9);
    let b = proposal(0.0, 0.0, 10.0, 5.0, 0, 0.8);
    assert_eq!(iou(&a.bbox, &b.bbox), 0.5);
    assert_eq!(nms(vec![a, b], 0.5).len(), 2);
  }

  #[test]
  fn iou_above_threshold_suppresses() {
    let a = proposal(0.0, 0.0, 10.0, 10.0, 0, 0.9);
    let b = proposal(0.0, 0.0, 10.0, 5.1, 0, 0.8);
    assert!(iou(&a.bbox, &b.bbox) > 0.5);
    let kept = nms(vec![a, b], 0.5);
    assert_eq!(kept, vec![a]);
  }

  #[test]
  fn nms_is_idempotent() {
    let input = vec![
      proposal(0.0, 0.0, 10.0, 10.0, 0, 0.9),
      proposal(2.0, 2.0, 10.0, 10.0, 0, 0.85),
      proposal(4.0, 0.0, 10.0, 10.0, 0, 0.7),
      proposal(30.0, 30.0, 8.0, 8.0, 1, 0.6),
      proposal(31.0, 31.0, 8.0, 8.0, 1, 0.55),
      proposal(60.0, 0.0, 5.0, 5.0, 0, 0.3),
    ];
    let once = nms(input, 0.3);
    let twice = nms(once.clone(), 0.3);
    assert_eq!(once, twice);
  }

  #[test]
  fn equal_scores_keep_input_order() {
    let first = proposal(0.0, 0.0, 10.0, 10.0, 0, 0.7);
    let second = proposal(1.0, 0.0, 10.0, 10.0, 0, 0.7);
    let kept = nms(vec![first, second], 0.45);
    assert_eq!(kept, vec![first]);

    let kept = nms(vec![second, first], 0.45);
    assert_eq!(kept, vec![second]);
  }

  #[test]
  fn survivors_are_mapped_back_and_clamped() {
    // 480x640 -> 640x640，上下各 80 像素边框
    let items = suppress(
      vec![
        proposal(100.0, 180.0, 50.0, 40.0, 0, 0.9),
        proposal(600.0, 500.0, 100.0, 100.0, 0, 0.8),
      ],
      0.45,
      480,
      640,
      640,
      640,
    )
    .unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].bbox, Rect::new(100.0, 100.0, 50.0, 40.0));
    assert_eq!(items[1].bbox, Rect::new(600.0, 420.0, 39.0, 59.0));
  }

  #[test]
  fn output_is_stable_under_nms_after_clamping() {
    // 画布 IoU 0.436，两框都伸进上方填充区，限制后在原图中重合
    let items = suppress(
      vec![
        proposal(0.0, 0.0, 100.0, 110.0, 0, 0.9),
        proposal(0.0, 62.0, 100.0, 48.0, 0, 0.8),
      ],
      0.45,
      480,
      640,
      640,
      640,
    )
    .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].bbox, Rect::new(0.0, 0.0, 100.0, 30.0));

    let again = nms(
      items
        .iter()
        .map(|item| Proposal {
          bbox: item.bbox,
          label: item.label,
          score: item.score,
        })
        .collect(),
      0.45,
    );
    assert_eq!(again.len(), items.len());
  }

  #[test]
  fn boxes_inside_padding_are_dropped() {
    let items = suppress(
      vec![
        proposal(144.0, 8.0, 48.0, 48.0, 0, 0.9),
        proposal(100.0, 180.0, 50.0, 40.0, 0, 0.8),
      ],
      0.45,
      480,
      640,
      640,
      640,
    )
    .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].bbox, Rect::new(100.0, 100.0, 50.0, 40.0));
  }

  #[test]
  fn empty_image_is_an_error() {
    assert!(suppress(Vec::new(), 0.45, 0, 640, 640, 640).is_err());
  }
}
