// 该文件是 Cengdie （层叠检测） 项目的一部分。
// src/record.rs - 检测记录与检测报告
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

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{layer::LayerFailure, model::Polygon};

/// 检测形状：普通边框，或带掩码多边形的分割结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DetectKind {
  Box,
  Segment { mask: Polygon },
}

impl DetectKind {
  pub fn mask(&self) -> Option<&Polygon> {
    match self {
      DetectKind::Box => None,
      DetectKind::Segment { mask } => Some(mask),
    }
  }

  pub fn is_segment(&self) -> bool {
    matches!(self, DetectKind::Segment { .. })
  }
}

/// 归一化后的单个检测
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
  pub bbox: [f32; 4], // [x1, y1, x2, y2]，像素坐标
  pub class_id: u32,
  pub confidence: f32,
  #[serde(rename = "layer")]
  pub layer_index: usize,
  #[serde(flatten)]
  pub kind: DetectKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerResult {
  pub layer_name: String,
  pub layer_index: usize,
  pub count: usize,
  pub detections: Vec<DetectionRecord>,
}

impl LayerResult {
  pub fn new(
    layer_name: impl Into<String>,
    layer_index: usize,
    detections: Vec<DetectionRecord>,
  ) -> Self {
    LayerResult {
      layer_name: layer_name.into(),
      layer_index,
      count: detections.len(),
      detections,
    }
  }
}

/// 一次运行的结局。全部层失败并不是错误，只是与“运行了但没检测到”区分开。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  #[default]
  Completed,
  AllLayersFailed,
}

/// 流水线对一张图像的完整输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
  pub layer_results: Vec<LayerResult>,
  pub final_detections: Vec<DetectionRecord>,
  pub image_size: (u32, u32), // (宽, 高)
  pub total_layers: usize,
  #[serde(default)]
  pub status: RunStatus,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub failures: Vec<LayerFailure>,
}

#[derive(Error, Debug)]
pub enum ExportError {
  #[error("字段 {0} 含有非有限数值")]
  NonFinite(String),
  #[error("JSON 错误: {0}")]
  Json(#[from] serde_json::Error),
}

impl DetectionReport {
  /// 实际贡献了结果的层数
  pub fn contributed_layers(&self) -> usize {
    self.layer_results.len()
  }

  /// 没有任何层成功运行
  pub fn nothing_ran(&self) -> bool {
    self.status == RunStatus::AllLayersFailed
  }

  pub fn to_json(&self) -> Result<String, ExportError> {
    self.ensure_finite()?;
    Ok(serde_json::to_string_pretty(self)?)
  }

  pub fn to_json_value(&self) -> Result<serde_json::Value, ExportError> {
    self.ensure_finite()?;
    Ok(serde_json::to_value(self)?)
  }

  pub fn from_json(json: &str) -> Result<Self, ExportError> {
    Ok(serde_json::from_str(json)?)
  }

  // serde_json 会把 NaN/inf 写成 null，导出前拒绝
  fn ensure_finite(&self) -> Result<(), ExportError> {
    for result in &self.layer_results {
      for (i, det) in result.detections.iter().enumerate() {
        check_record(det, &format!("layer_results[{}].detections[{}]", result.layer_index, i))?;
      }
    }
    for (i, det) in self.final_detections.iter().enumerate() {
      check_record(det, &format!("final_detections[{}]", i))?;
    }
    Ok(())
  }
}

fn check_record(det: &DetectionRecord, path: &str) -> Result<(), ExportError> {
  if !det.bbox.iter().all(|v| v.is_finite()) {
    return Err(ExportError::NonFinite(format!("{}.bbox", path)));
  }
  if !det.confidence.is_finite() {
    return Err(ExportError::NonFinite(format!("{}.confidence", path)));
  }
  if let Some(mask) = det.kind.mask()
    && !mask.iter().flatten().all(|v| v.is_finite())
  {
    return Err(ExportError::NonFinite(format!("{}.mask", path)));
  }
  Ok(())
}
