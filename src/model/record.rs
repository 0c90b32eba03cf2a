// 该文件是 Cengdie （层叠检测） 项目的一部分。
// src/model/record.rs - 回放预先记录的检测结果
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

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  merge::{Candidate, greedy_suppress},
  model::{DetectItem, DetectResult, Model, Polygon},
};

#[derive(Error, Debug)]
pub enum RecordModelError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 记录解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("文本记录第 {line} 行格式错误: {reason}")]
  LineError { line: usize, reason: String },
  #[error("不支持的记录文件: {0}")]
  UnsupportedFormat(PathBuf),
}

/// 从文件回放原始检测结果的模型。
///
/// `.json` 为序列化的 [`DetectResult`]，`.txt` 每行一个检测：
/// `class_id, score, x1, y1, x2, y2`。
/// 推理时按置信度阈值过滤，再在层内按类别做 NMS。
pub struct RecordModel<Frame> {
  recorded: DetectResult,
  _phantom: std::marker::PhantomData<Frame>,
}

pub struct RecordModelBuilder {
  path: PathBuf,
}

impl FromUrlWithScheme for RecordModelBuilder {
  const SCHEME: &'static str = "record";
}

impl FromUrl for RecordModelBuilder {
  type Error = RecordModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RecordModelError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    Ok(RecordModelBuilder {
      path: PathBuf::from(url.path()),
    })
  }
}

impl RecordModelBuilder {
  pub fn with_path(path: impl Into<PathBuf>) -> Self {
    RecordModelBuilder { path: path.into() }
  }

  pub fn build<Frame>(self) -> Result<RecordModel<Frame>, RecordModelError> {
    info!("加载检测记录: {}", self.path.display());
    let recorded = load_record(&self.path)?;
    debug!("记录中共 {} 个检测", recorded.len());

    let _phantom = std::marker::PhantomData::<Frame>;
    Ok(RecordModel { recorded, _phantom })
  }
}

impl<Frame> RecordModel<Frame> {
  pub fn from_result(recorded: DetectResult) -> Self {
    RecordModel {
      recorded,
      _phantom: std::marker::PhantomData,
    }
  }
}

fn load_record(path: &Path) -> Result<DetectResult, RecordModelError> {
  match path.extension().and_then(|e| e.to_str()) {
    Some("json") => Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?),
    Some("txt") => parse_lines(&std::fs::read_to_string(path)?),
    _ => Err(RecordModelError::UnsupportedFormat(path.to_path_buf())),
  }
}

/// 解析 `class_id, score, x1, y1, x2, y2` 文本记录，空行和 `#` 注释行跳过
pub fn parse_lines(content: &str) -> Result<DetectResult, RecordModelError> {
  let mut items = Vec::new();

  for (i, line) in content.lines().enumerate() {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }

    let bad = |reason: String| RecordModelError::LineError { line: i + 1, reason };
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 6 {
      return Err(bad(format!("期望 6 个字段，实际 {} 个", fields.len())));
    }

    let class_id = fields[0]
      .parse::<u32>()
      .map_err(|e| bad(format!("类别 id '{}': {}", fields[0], e)))?;
    let mut numbers = [0f32; 5];
    for (slot, field) in numbers.iter_mut().zip(&fields[1..]) {
      *slot = field
        .parse::<f32>()
        .map_err(|e| bad(format!("数值 '{}': {}", field, e)))?;
    }
    let [score, x1, y1, x2, y2] = numbers;

    items.push(DetectItem {
      class_id,
      score,
      bbox: [x1, y1, x2, y2],
    });
  }

  Ok(DetectResult::from(items))
}

struct MaskedItem {
  item: DetectItem,
  mask: Option<Polygon>,
}

impl Candidate for MaskedItem {
  fn class_id(&self) -> u32 {
    self.item.class_id
  }

  fn confidence(&self) -> f32 {
    self.item.score
  }

  fn bbox(&self) -> &[f32; 4] {
    &self.item.bbox
  }
}

impl<Frame> Model for RecordModel<Frame> {
  type Input = Frame;
  type Error = RecordModelError;

  fn infer(
    &self,
    _input: &Self::Input,
    confidence: f32,
    overlap: f32,
  ) -> Result<DetectResult, Self::Error> {
    let has_masks = self.recorded.masks.is_some();
    let candidates: Vec<MaskedItem> = self
      .recorded
      .items
      .iter()
      .enumerate()
      .filter(|(_, item)| item.score >= confidence)
      .map(|(i, item)| MaskedItem {
        item: item.clone(),
        mask: self.recorded.mask_of(i).cloned(),
      })
      .collect();

    let kept = greedy_suppress(candidates, overlap);
    debug!(
      "回放 {} 个记录，阈值过滤与 NMS 后剩余 {} 个",
      self.recorded.len(),
      kept.len()
    );

    let mut items = Vec::with_capacity(kept.len());
    let mut masks = Vec::with_capacity(kept.len());
    for MaskedItem { item, mask } in kept {
      items.push(item);
      masks.push(mask.unwrap_or_default());
    }

    Ok(DetectResult {
      items: items.into_boxed_slice(),
      masks: has_masks.then(|| masks.into_boxed_slice()),
    })
  }
}
