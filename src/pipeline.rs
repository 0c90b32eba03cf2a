// 该文件是 Cengdie （层叠检测） 项目的一部分。
// src/pipeline.rs - 多层检测流水线
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

use std::thread;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  frame::FrameSize,
  layer::{Layer, LayerDescriptor, LayerFailure, run_layer},
  merge::{DEFAULT_IOU_THRESHOLD, Merger},
  model::Model,
  record::{DetectionRecord, DetectionReport, LayerResult, RunStatus},
};

#[derive(Error, Debug, PartialEq)]
pub enum PipelineError {
  #[error("流水线至少需要一个检测层")]
  NoLayers,
  #[error("层 {layer} 的 {field} 阈值 {value} 超出 [0, 1]")]
  LayerThreshold {
    layer: String,
    field: &'static str,
    value: f32,
  },
  #[error("合并 IoU 阈值 {0} 超出 [0, 1]")]
  MergeThreshold(f32),
}

pub struct PipelineBuilder<M> {
  layers: Vec<Layer<M>>,
  iou_threshold: f32,
}

impl<M> Default for PipelineBuilder<M> {
  fn default() -> Self {
    PipelineBuilder {
      layers: Vec::new(),
      iou_threshold: DEFAULT_IOU_THRESHOLD,
    }
  }
}

impl<M> PipelineBuilder<M> {
  pub fn layer(mut self, descriptor: LayerDescriptor, model: M) -> Self {
    self.layers.push(Layer::new(descriptor, model));
    self
  }

  pub fn iou_threshold(mut self, iou_threshold: f32) -> Self {
    self.iou_threshold = iou_threshold;
    self
  }

  pub fn build(self) -> Result<Pipeline<M>, PipelineError> {
    check_thresholds(self.iou_threshold, self.layers.iter().map(|l| &l.descriptor))?;

    info!("层配置:");
    for layer in &self.layers {
      info!("  {}: {}", layer.descriptor.name, layer.descriptor.purpose);
    }

    Ok(Pipeline {
      layers: self.layers,
      merger: Merger::new(self.iou_threshold),
    })
  }
}

/// 至少一层，合并阈值与每层的 confidence、overlap 都在 [0, 1] 内
pub fn check_thresholds<'a>(
  iou_threshold: f32,
  layers: impl IntoIterator<Item = &'a LayerDescriptor>,
) -> Result<(), PipelineError> {
  if !in_unit_range(iou_threshold) {
    return Err(PipelineError::MergeThreshold(iou_threshold));
  }
  let mut count = 0;
  for d in layers {
    count += 1;
    for (field, value) in [("confidence", d.confidence), ("overlap", d.overlap)] {
      if !in_unit_range(value) {
        return Err(PipelineError::LayerThreshold {
          layer: d.name.clone(),
          field,
          value,
        });
      }
    }
  }
  if count == 0 {
    return Err(PipelineError::NoLayers);
  }
  Ok(())
}

fn in_unit_range(value: f32) -> bool {
  (0.0..=1.0).contains(&value)
}

/// 多层检测流水线：依次运行每一层，收集结果后做跨层合并。
pub struct Pipeline<M> {
  layers: Vec<Layer<M>>,
  merger: Merger,
}

impl<M> Pipeline<M> {
  pub fn builder() -> PipelineBuilder<M> {
    PipelineBuilder::default()
  }

  pub fn layers(&self) -> &[Layer<M>] {
    &self.layers
  }

  pub fn merger(&self) -> &Merger {
    &self.merger
  }
}

impl<M> Pipeline<M>
where
  M: Model,
  M::Input: FrameSize,
  M::Error: std::fmt::Display,
{
  /// 按配置顺序逐层运行。单层失败只会让该层从结果中缺席。
  pub fn run(&self, input: &M::Input) -> DetectionReport {
    info!("开始分析图像: {}x{}", input.width(), input.height());
    let outcomes = self
      .layers
      .iter()
      .enumerate()
      .map(|(index, layer)| run_layer(layer, index, input))
      .collect();
    self.assemble(input.size(), outcomes)
  }

  fn assemble(
    &self,
    image_size: (u32, u32),
    outcomes: Vec<Result<Vec<DetectionRecord>, LayerFailure>>,
  ) -> DetectionReport {
    let mut layer_results = Vec::new();
    let mut failures = Vec::new();
    let mut pool = Vec::new();

    for (index, (layer, outcome)) in self.layers.iter().zip(outcomes).enumerate() {
      match outcome {
        Ok(records) => {
          pool.extend(records.iter().cloned());
          layer_results.push(LayerResult::new(layer.name(), index, records));
        }
        Err(failure) => {
          warn!("  ❌ {}", failure);
          failures.push(failure);
        }
      }
    }

    let status = if layer_results.is_empty() {
      warn!("所有 {} 个层都未能运行", self.layers.len());
      RunStatus::AllLayersFailed
    } else {
      RunStatus::Completed
    };

    debug!("检测池共 {} 个检测", pool.len());
    let final_detections = self.merger.merge(pool);
    info!(
      "{}/{} 个层贡献结果，合并后 {} 个检测",
      layer_results.len(),
      self.layers.len(),
      final_detections.len()
    );

    DetectionReport {
      layer_results,
      final_detections,
      image_size,
      total_layers: self.layers.len(),
      status,
      failures,
    }
  }
}

impl<M> Pipeline<M>
where
  M: Model + Sync,
  M::Input: FrameSize + Sync,
  M::Error: std::fmt::Display,
{
  /// 每层一个线程并发运行，全部结束后再合并。结果与 [`Pipeline::run`] 相同。
  pub fn run_concurrent(&self, input: &M::Input) -> DetectionReport {
    info!(
      "开始并发分析图像: {}x{}, {} 个层",
      input.width(),
      input.height(),
      self.layers.len()
    );
    let outcomes = thread::scope(|scope| {
      let handles: Vec<_> = self
        .layers
        .iter()
        .enumerate()
        .map(|(index, layer)| scope.spawn(move || run_layer(layer, index, input)))
        .collect();

      handles
        .into_iter()
        .zip(&self.layers)
        .enumerate()
        .map(|(index, (handle, layer))| {
          // run_layer 已截获模型 panic，这里只兜底线程本身的异常
          handle.join().unwrap_or_else(|_| {
            Err(LayerFailure::Panicked {
              layer_name: layer.descriptor.name.clone(),
              layer_index: index,
              message: "检测线程异常退出".to_string(),
            })
          })
        })
        .collect()
    });
    self.assemble(input.size(), outcomes)
  }
}
