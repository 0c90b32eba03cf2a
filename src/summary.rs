// 该文件是 Cengdie （层叠检测） 项目的一部分。
// src/summary.rs - 检测结果汇总
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

use std::{collections::HashMap, fmt};

use serde::Serialize;

use crate::{
  label::WithLabel,
  record::{DetectionReport, RunStatus},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerCount {
  pub layer_name: String,
  pub layer_index: usize,
  pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassCount {
  pub label: String,
  pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceStats {
  pub mean: f32,
  pub min: f32,
  pub max: f32,
}

impl ConfidenceStats {
  /// 空序列没有统计量
  pub fn from_values(values: impl IntoIterator<Item = f32>) -> Option<Self> {
    let mut count = 0usize;
    let mut sum = 0.0f64;
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for v in values {
      count += 1;
      sum += v as f64;
      min = min.min(v);
      max = max.max(v);
    }
    (count > 0).then(|| ConfidenceStats {
      mean: (sum / count as f64) as f32,
      min,
      max,
    })
  }
}

/// 对一份检测报告的统计
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
  pub status: RunStatus,
  pub image_size: (u32, u32),
  pub total_layers: usize,
  pub contributed_layers: usize,
  pub layers: Vec<LayerCount>,
  pub final_count: usize,
  /// 按数量降序，数量相同按标签排序
  pub classes: Vec<ClassCount>,
  pub confidence: Option<ConfidenceStats>,
}

impl Summary {
  pub fn from_report<L: WithLabel + ?Sized>(report: &DetectionReport, labels: &L) -> Self {
    let layers = report
      .layer_results
      .iter()
      .map(|r| LayerCount {
        layer_name: r.layer_name.clone(),
        layer_index: r.layer_index,
        count: r.count,
      })
      .collect();

    let mut histogram: HashMap<String, usize> = HashMap::new();
    for det in &report.final_detections {
      *histogram.entry(labels.label_of(det.class_id)).or_default() += 1;
    }
    let mut classes: Vec<ClassCount> = histogram
      .into_iter()
      .map(|(label, count)| ClassCount { label, count })
      .collect();
    classes.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));

    Summary {
      status: report.status,
      image_size: report.image_size,
      total_layers: report.total_layers,
      contributed_layers: report.contributed_layers(),
      layers,
      final_count: report.final_detections.len(),
      classes,
      confidence: ConfidenceStats::from_values(
        report.final_detections.iter().map(|d| d.confidence),
      ),
    }
  }
}

const RULE: &str = "============================================================";

impl fmt::Display for Summary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "{}", RULE)?;
    writeln!(f, "多层检测结果汇总")?;
    writeln!(f, "{}", RULE)?;
    writeln!(f, "图像尺寸: {}x{}", self.image_size.0, self.image_size.1)?;
    writeln!(f, "检测层数: {}", self.total_layers)?;

    if self.status == RunStatus::AllLayersFailed {
      writeln!(f, "\n所有层均未能运行 (0/{})", self.total_layers)?;
      return write!(f, "{}", RULE);
    }

    writeln!(f, "\n各层检测数 ({}/{} 个层贡献结果):", self.contributed_layers, self.total_layers)?;
    for layer in &self.layers {
      writeln!(f, "  • {}: {} 个", layer.layer_name, layer.count)?;
    }

    writeln!(f, "\n最终合并检测数: {} 个", self.final_count)?;

    if !self.classes.is_empty() {
      writeln!(f, "\n类别分布:")?;
      for class in &self.classes {
        writeln!(f, "  • {}: {} 个", class.label, class.count)?;
      }
    }

    if let Some(stats) = &self.confidence {
      writeln!(f, "\n置信度统计:")?;
      writeln!(f, "  • 平均: {:.3}", stats.mean)?;
      writeln!(f, "  • 最大: {:.3}", stats.max)?;
      writeln!(f, "  • 最小: {:.3}", stats.min)?;
    }

    write!(f, "{}", RULE)
  }
}
