// 该文件是 Cengdie （层叠检测） 项目的一部分。
// src/config.rs - 流水线配置
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

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{
  layer::LayerDescriptor,
  merge::DEFAULT_IOU_THRESHOLD,
  pipeline::{PipelineError, check_thresholds},
};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置解析错误: {0}")]
  ParseError(#[from] toml::de::Error),
  #[error("配置无效: {0}")]
  Invalid(#[from] PipelineError),
}

/// 配置文件：
///
/// ```toml
/// [merge]
/// iou_threshold = 0.5
/// labels = "labels/coco.toml"
///
/// [[layers]]
/// name = "Layer 1: 快速扫描"
/// model = "record:///data/yolo11n.json"
/// confidence = 0.3
/// overlap = 0.5
/// purpose = "在整幅图像中快速找出目标区域"
/// color = [255, 0, 0]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
  #[serde(default)]
  pub merge: MergeConfig,
  #[serde(default)]
  pub layers: Vec<LayerConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
  pub iou_threshold: f32,
  /// 标签文件，缺省使用内置 COCO 类别
  pub labels: Option<PathBuf>,
}

impl Default for MergeConfig {
  fn default() -> Self {
    Self {
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      labels: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
  /// 模型地址，例如 `record:///path/to/layer.json`
  pub model: Url,
  #[serde(flatten)]
  pub descriptor: LayerDescriptor,
}

impl PipelineConfig {
  pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Self::from_toml(&content)
  }

  pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
    let config: PipelineConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let descriptors = self.layers.iter().map(|l| &l.descriptor);
    Ok(check_thresholds(self.merge.iou_threshold, descriptors)?)
  }
}
