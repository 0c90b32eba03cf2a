// 该文件是 Cengdie （层叠检测） 项目的一部分。
// src/merge.rs - 跨层检测结果合并
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

//! 跨层合并：按置信度排序、按类别隔离的贪心重叠抑制。
//!
//! 池中的检测先按置信度降序做稳定排序，置信度相同时保持入池顺序。
//! 之后逐个与已保留的同类检测比较 IoU，遇到第一个超过阈值的即视为重复并丢弃。
//! 由于排序在前，已保留的检测置信度一定不低于候选，因此首个匹配即可终止比较。

use tracing::debug;

use crate::{model::DetectItem, record::DetectionRecord};

/// 默认的跨层重复判定 IoU 阈值
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;

/// 两个 [x_min, y_min, x_max, y_max] 框的交并比，并集面积不为正时返回 0
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

/// 参与重叠抑制的检测
pub trait Candidate {
  fn class_id(&self) -> u32;
  fn confidence(&self) -> f32;
  fn bbox(&self) -> &[f32; 4];
}

impl Candidate for DetectionRecord {
  fn class_id(&self) -> u32 {
    self.class_id
  }

  fn confidence(&self) -> f32 {
    self.confidence
  }

  fn bbox(&self) -> &[f32; 4] {
    &self.bbox
  }
}

impl Candidate for DetectItem {
  fn class_id(&self) -> u32 {
    self.class_id
  }

  fn confidence(&self) -> f32 {
    self.score
  }

  fn bbox(&self) -> &[f32; 4] {
    &self.bbox
  }
}

/// 贪心抑制，返回按置信度降序排列的保留结果。
///
/// 排序必须是稳定的：置信度完全相同时，入池顺序决定谁被保留。
pub fn greedy_suppress<T: Candidate>(mut pool: Vec<T>, iou_threshold: f32) -> Vec<T> {
  pool.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));

  let mut kept: Vec<T> = Vec::with_capacity(pool.len());
  for candidate in pool {
    let duplicate_of = kept.iter().position(|k| {
      k.class_id() == candidate.class_id() && iou(k.bbox(), candidate.bbox()) > iou_threshold
    });

    match duplicate_of {
      Some(index) => debug!(
        "类别 {} 置信度 {:.3} 的检测与第 {} 个保留结果重复，丢弃",
        candidate.class_id(),
        candidate.confidence(),
        index
      ),
      None => kept.push(candidate),
    }
  }

  kept
}

/// 跨层合并器
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merger {
  iou_threshold: f32,
}

impl Default for Merger {
  fn default() -> Self {
    Self {
      iou_threshold: DEFAULT_IOU_THRESHOLD,
    }
  }
}

impl Merger {
  pub fn new(iou_threshold: f32) -> Self {
    Self { iou_threshold }
  }

  pub fn iou_threshold(&self) -> f32 {
    self.iou_threshold
  }

  /// 合并来自所有层的检测池。层来源不参与判定，同层检测遵循同样规则。
  pub fn merge(&self, pool: Vec<DetectionRecord>) -> Vec<DetectionRecord> {
    let total = pool.len();
    let kept = greedy_suppress(pool, self.iou_threshold);
    debug!("合并完成: {} -> {}", total, kept.len());
    kept
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::record::DetectKind;

  fn det(bbox: [f32; 4], class_id: u32, confidence: f32, layer_index: usize) -> DetectionRecord {
    DetectionRecord {
      bbox,
      class_id,
      confidence,
      layer_index,
      kind: DetectKind::Box,
    }
  }

  #[test]
  fn iou_is_symmetric() {
    let boxes = [
      [0.0, 0.0, 10.0, 10.0],
      [1.0, 1.0, 11.0, 11.0],
      [5.0, -3.0, 7.5, 20.0],
      [50.0, 50.0, 60.0, 60.0],
      [2.0, 2.0, 2.0, 8.0],
    ];
    for a in &boxes {
      for b in &boxes {
        assert_eq!(iou(a, b), iou(b, a));
      }
    }
  }

  #[test]
  fn iou_with_itself_is_one() {
    let a = [3.0, 4.0, 17.5, 9.25];
    assert_eq!(iou(&a, &a), 1.0);
  }

  #[test]
  fn iou_of_degenerate_boxes_is_zero() {
    let point = [5.0, 5.0, 5.0, 5.0];
    assert_eq!(iou(&point, &point), 0.0);
    assert_eq!(iou(&[0.0, 0.0, 10.0, 10.0], &[20.0, 20.0, 30.0, 30.0]), 0.0);
  }

  #[test]
  fn overlapping_same_class_keeps_higher_confidence() {
    let pool = vec![
      det([0.0, 0.0, 10.0, 10.0], 1, 0.9, 0),
      det([1.0, 1.0, 11.0, 11.0], 1, 0.6, 1),
      det([50.0, 50.0, 60.0, 60.0], 1, 0.8, 2),
    ];

    let merged = Merger::default().merge(pool);

    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].layer_index, 0);
    assert_eq!(merged[0].confidence, 0.9);
    assert_eq!(merged[1].layer_index, 2);
    assert_eq!(merged[1].confidence, 0.8);
  }

  #[test]
  fn different_classes_are_never_suppressed() {
    let pool = vec![
      det([0.0, 0.0, 10.0, 10.0], 1, 0.9, 0),
      det([1.0, 1.0, 11.0, 11.0], 2, 0.6, 1),
      det([50.0, 50.0, 60.0, 60.0], 1, 0.8, 2),
    ];
    assert_eq!(Merger::default().merge(pool).len(), 3);

    let identical = vec![
      det([0.0, 0.0, 10.0, 10.0], 1, 0.7, 0),
      det([0.0, 0.0, 10.0, 10.0], 3, 0.4, 0),
    ];
    assert_eq!(Merger::default().merge(identical).len(), 2);
  }

  #[test]
  fn overlap_at_threshold_is_not_a_duplicate() {
    // 交集 1，并集 2，IoU 恰好为 0.5
    let pool = vec![
      det([0.0, 0.0, 2.0, 1.0], 0, 0.9, 0),
      det([0.0, 0.0, 1.0, 1.0], 0, 0.5, 1),
    ];
    assert_eq!(Merger::new(0.5).merge(pool.clone()).len(), 2);
    assert_eq!(Merger::new(0.49).merge(pool).len(), 1);
  }

  #[test]
  fn lower_confidence_first_in_pool_still_loses() {
    let pool = vec![
      det([1.0, 1.0, 11.0, 11.0], 1, 0.6, 0),
      det([0.0, 0.0, 10.0, 10.0], 1, 0.9, 3),
    ];
    let merged = Merger::default().merge(pool);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].layer_index, 3);
  }

  #[test]
  fn equal_confidence_keeps_pool_order() {
    let pool = vec![
      det([0.0, 0.0, 10.0, 10.0], 1, 0.7, 2),
      det([0.5, 0.5, 10.5, 10.5], 1, 0.7, 0),
    ];
    let merged = Merger::default().merge(pool);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].layer_index, 2);
  }

  #[test]
  fn merge_is_idempotent() {
    let pool = vec![
      det([0.0, 0.0, 10.0, 10.0], 1, 0.9, 0),
      det([1.0, 1.0, 11.0, 11.0], 1, 0.6, 1),
      det([4.0, 4.0, 14.0, 14.0], 1, 0.65, 1),
      det([50.0, 50.0, 60.0, 60.0], 1, 0.8, 2),
      det([52.0, 52.0, 61.0, 61.0], 7, 0.3, 3),
      det([0.0, 0.0, 10.0, 10.0], 7, 0.3, 0),
    ];

    let merger = Merger::default();
    let once = merger.merge(pool.clone());
    let twice = merger.merge(once.clone());

    assert_eq!(once, twice);
    assert!(once.len() <= pool.len());
  }

  #[test]
  fn output_is_confidence_descending() {
    let pool = vec![
      det([0.0, 0.0, 1.0, 1.0], 0, 0.2, 0),
      det([10.0, 0.0, 11.0, 1.0], 0, 0.95, 1),
      det([20.0, 0.0, 21.0, 1.0], 0, 0.5, 2),
    ];
    let merged = Merger::default().merge(pool);
    let confidences: Vec<f32> = merged.iter().map(|d| d.confidence).collect();
    assert_eq!(confidences, vec![0.95, 0.5, 0.2]);
  }

  #[test]
  fn empty_and_single() {
    assert!(Merger::default().merge(Vec::new()).is_empty());

    let single = vec![det([1.0, 2.0, 3.0, 4.0], 5, 0.33, 1)];
    assert_eq!(Merger::default().merge(single.clone()), single);
  }
}
