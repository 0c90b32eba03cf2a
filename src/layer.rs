// 该文件是 Cengdie （层叠检测） 项目的一部分。
// src/layer.rs - 检测层描述与单层执行
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

use std::panic::{AssertUnwindSafe, catch_unwind};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  model::{DetectItem, DetectResult, Model},
  record::{DetectKind, DetectionRecord},
};

/// 检测层配置，流水线构建后不再改变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDescriptor {
  pub name: String,
  /// 传给模型的置信度阈值
  pub confidence: f32,
  /// 传给模型内部 NMS 的 IoU 阈值，跨层合并不使用
  pub overlap: f32,
  #[serde(default)]
  pub purpose: String,
  #[serde(default = "default_color")]
  pub color: [u8; 3],
}

fn default_color() -> [u8; 3] {
  [0, 255, 0]
}

impl LayerDescriptor {
  pub fn new(name: impl Into<String>, confidence: f32, overlap: f32) -> Self {
    LayerDescriptor {
      name: name.into(),
      confidence,
      overlap,
      purpose: String::new(),
      color: default_color(),
    }
  }

  pub fn purpose(mut self, purpose: impl Into<String>) -> Self {
    self.purpose = purpose.into();
    self
  }

  pub fn color(mut self, color: [u8; 3]) -> Self {
    self.color = color;
    self
  }
}

/// 一个检测层：描述 + 模型
pub struct Layer<M> {
  pub descriptor: LayerDescriptor,
  pub model: M,
}

impl<M> Layer<M> {
  pub fn new(descriptor: LayerDescriptor, model: M) -> Self {
    Layer { descriptor, model }
  }

  pub fn name(&self) -> &str {
    &self.descriptor.name
  }
}

/// 单层失败，只在本层内恢复，不会中断整次运行
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerFailure {
  #[error("层 {layer_name} 推理失败: {message}")]
  Detector {
    layer_name: String,
    layer_index: usize,
    message: String,
  },
  #[error("层 {layer_name} 输出无效: {message}")]
  Malformed {
    layer_name: String,
    layer_index: usize,
    message: String,
  },
  #[error("层 {layer_name} 推理过程崩溃: {message}")]
  Panicked {
    layer_name: String,
    layer_index: usize,
    message: String,
  },
}

impl LayerFailure {
  pub fn layer_name(&self) -> &str {
    match self {
      LayerFailure::Detector { layer_name, .. }
      | LayerFailure::Malformed { layer_name, .. }
      | LayerFailure::Panicked { layer_name, .. } => layer_name,
    }
  }

  pub fn layer_index(&self) -> usize {
    match self {
      LayerFailure::Detector { layer_index, .. }
      | LayerFailure::Malformed { layer_index, .. }
      | LayerFailure::Panicked { layer_index, .. } => *layer_index,
    }
  }
}

/// 在一张图像上运行一层，并把原始输出归一化为带层索引的检测记录。
///
/// 模型返回的错误、无效数据以及推理过程中的 panic 都在这里被截获为 [`LayerFailure`]。
/// 调用可能阻塞一次完整推理的时间。
pub fn run_layer<M>(
  layer: &Layer<M>,
  layer_index: usize,
  input: &M::Input,
) -> Result<Vec<DetectionRecord>, LayerFailure>
where
  M: Model,
  M::Error: std::fmt::Display,
{
  let descriptor = &layer.descriptor;
  info!("{} 运行中...", descriptor.name);

  let inferred = catch_unwind(AssertUnwindSafe(|| {
    layer
      .model
      .infer(input, descriptor.confidence, descriptor.overlap)
  }));

  let output = match inferred {
    Ok(Ok(output)) => output,
    Ok(Err(e)) => {
      return Err(LayerFailure::Detector {
        layer_name: descriptor.name.clone(),
        layer_index,
        message: e.to_string(),
      });
    }
    Err(payload) => {
      return Err(LayerFailure::Panicked {
        layer_name: descriptor.name.clone(),
        layer_index,
        message: panic_message(payload.as_ref()),
      });
    }
  };

  let records = normalize(output, layer_index).map_err(|message| LayerFailure::Malformed {
    layer_name: descriptor.name.clone(),
    layer_index,
    message,
  })?;

  if records.is_empty() {
    info!("  - {} 未检测到对象", descriptor.name);
  } else {
    info!("  ✓ {} 检测到 {} 个对象", descriptor.name, records.len());
  }

  Ok(records)
}

/// 原始输出 -> 检测记录，掩码按下标对齐到检测框
pub fn normalize(output: DetectResult, layer_index: usize) -> Result<Vec<DetectionRecord>, String> {
  let mut records = Vec::with_capacity(output.len());

  for (i, item) in output.items.iter().enumerate() {
    validate_item(i, item)?;

    let kind = match output.mask_of(i) {
      Some(mask) => {
        if !mask.iter().flatten().all(|v| v.is_finite()) {
          return Err(format!("第 {} 个掩码含有非有限坐标", i));
        }
        DetectKind::Segment { mask: mask.clone() }
      }
      None => DetectKind::Box,
    };

    debug!(
      "层 {} 检测 {}: 类别 {} 置信度 {:.3} 框 {:?}",
      layer_index, i, item.class_id, item.score, item.bbox
    );

    records.push(DetectionRecord {
      bbox: item.bbox,
      class_id: item.class_id,
      confidence: item.score,
      layer_index,
      kind,
    });
  }

  if let Some(masks) = &output.masks
    && masks.len() > output.items.len()
  {
    warn!(
      "层 {} 掩码数量 {} 多于检测数量 {}，多余的掩码已忽略",
      layer_index,
      masks.len(),
      output.items.len()
    );
  }

  Ok(records)
}

fn validate_item(index: usize, item: &DetectItem) -> Result<(), String> {
  let [x1, y1, x2, y2] = item.bbox;
  if !item.bbox.iter().all(|v| v.is_finite()) {
    return Err(format!("第 {} 个检测框含有非有限坐标: {:?}", index, item.bbox));
  }
  if x1 > x2 || y1 > y2 {
    return Err(format!("第 {} 个检测框坐标顺序错误: {:?}", index, item.bbox));
  }
  if !(0.0..=1.0).contains(&item.score) {
    return Err(format!("第 {} 个检测置信度超出 [0, 1]: {}", index, item.score));
  }
  Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "未知 panic".to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::Cell;

  struct Stub {
    output: Result<DetectResult, String>,
    seen: Cell<Option<(f32, f32)>>,
  }

  impl Stub {
    fn new(output: Result<DetectResult, String>) -> Self {
      Stub {
        output,
        seen: Cell::new(None),
      }
    }
  }

  impl Model for Stub {
    type Input = ();
    type Error = String;

    fn infer(&self, _: &(), confidence: f32, overlap: f32) -> Result<DetectResult, String> {
      self.seen.set(Some((confidence, overlap)));
      self.output.clone()
    }
  }

  struct Exploding;

  impl Model for Exploding {
    type Input = ();
    type Error = String;

    fn infer(&self, _: &(), _: f32, _: f32) -> Result<DetectResult, String> {
      panic!("显存不足")
    }
  }

  fn item(class_id: u32, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox,
    }
  }

  #[test]
  fn tags_records_with_layer_and_forwards_thresholds() {
    let model = Stub::new(Ok(DetectResult::from(vec![
      item(0, 0.9, [0.0, 0.0, 5.0, 5.0]),
      item(2, 0.4, [1.0, 1.0, 3.0, 4.0]),
    ])));
    let layer = Layer::new(LayerDescriptor::new("L2", 0.4, 0.45), model);

    let records = run_layer(&layer, 1, &()).unwrap();

    assert_eq!(layer.model.seen.get(), Some((0.4, 0.45)));
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.layer_index == 1));
    assert!(records.iter().all(|r| r.kind == DetectKind::Box));
    assert_eq!(records[1].class_id, 2);
    assert_eq!(records[1].confidence, 0.4);
  }

  #[test]
  fn aligned_masks_turn_records_into_segments() {
    let output = DetectResult {
      items: vec![
        item(0, 0.9, [0.0, 0.0, 5.0, 5.0]),
        item(1, 0.8, [1.0, 1.0, 3.0, 4.0]),
        item(1, 0.7, [2.0, 2.0, 3.0, 3.0]),
      ]
      .into_boxed_slice(),
      masks: Some(
        vec![
          vec![[0.0, 0.0], [5.0, 0.0], [5.0, 5.0]],
          vec![],
          vec![[2.0, 2.0], [3.0, 3.0], [2.0, 3.0]],
          vec![[9.0, 9.0]],
        ]
        .into_boxed_slice(),
      ),
    };

    let records = normalize(output, 3).unwrap();

    assert_eq!(records.len(), 3);
    assert!(records[0].kind.is_segment());
    assert_eq!(records[1].kind, DetectKind::Box);
    assert_eq!(records[2].kind.mask().map(|m| m.len()), Some(3));
  }

  #[test]
  fn empty_output_is_not_a_failure() {
    let layer = Layer::new(
      LayerDescriptor::new("empty", 0.5, 0.4),
      Stub::new(Ok(DetectResult::default())),
    );
    assert_eq!(run_layer(&layer, 0, &()), Ok(Vec::new()));
  }

  #[test]
  fn detector_error_becomes_layer_failure() {
    let layer = Layer::new(
      LayerDescriptor::new("broken", 0.5, 0.4),
      Stub::new(Err("权重文件缺失".to_string())),
    );

    let failure = run_layer(&layer, 2, &()).unwrap_err();

    assert_eq!(
      failure,
      LayerFailure::Detector {
        layer_name: "broken".to_string(),
        layer_index: 2,
        message: "权重文件缺失".to_string(),
      }
    );
  }

  #[test]
  fn panic_is_caught_at_layer_boundary() {
    let layer = Layer::new(LayerDescriptor::new("boom", 0.5, 0.4), Exploding);

    let failure = run_layer(&layer, 0, &()).unwrap_err();

    assert!(matches!(failure, LayerFailure::Panicked { ref message, .. } if message == "显存不足"));
    assert_eq!(failure.layer_name(), "boom");
  }

  #[test]
  fn malformed_output_is_rejected() {
    let cases = [
      item(0, 1.5, [0.0, 0.0, 1.0, 1.0]),
      item(0, 0.5, [2.0, 0.0, 1.0, 1.0]),
      item(0, 0.5, [0.0, f32::NAN, 1.0, 1.0]),
      item(0, f32::NAN, [0.0, 0.0, 1.0, 1.0]),
    ];

    for bad in cases {
      let layer = Layer::new(
        LayerDescriptor::new("bad", 0.5, 0.4),
        Stub::new(Ok(DetectResult::from(vec![bad]))),
      );
      let failure = run_layer(&layer, 4, &()).unwrap_err();
      assert!(matches!(failure, LayerFailure::Malformed { layer_index: 4, .. }));
    }
  }
}
