// 该文件是 Cengdie （层叠检测） 项目的一部分。
// src/model.rs - 模型
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

/// 分割掩码多边形，顶点为图像像素坐标 (x, y)
pub type Polygon = Vec<[f32; 2]>;

/// 检测模型能力：给定图像与阈值，产出原始检测结果。
///
/// 权重加载、推理执行与设备选择都属于模型自身，流水线只通过该接口调用。
pub trait Model {
  type Input;
  type Error;

  fn infer(
    &self,
    input: &Self::Input,
    confidence: f32,
    overlap: f32,
  ) -> Result<DetectResult, Self::Error>;
}

impl<M: Model + ?Sized> Model for Box<M> {
  type Input = M::Input;
  type Error = M::Error;

  fn infer(
    &self,
    input: &Self::Input,
    confidence: f32,
    overlap: f32,
  ) -> Result<DetectResult, Self::Error> {
    (**self).infer(input, confidence, overlap)
  }
}

pub type BoxedModelError = Box<dyn std::error::Error + Send + Sync>;

/// 擦除了具体类型的模型，不同后端的层可以放进同一条流水线
pub type BoxedModel<I> = Box<dyn Model<Input = I, Error = BoxedModelError> + Send + Sync>;

pub trait ModelExt: Model + Sized {
  fn boxed(self) -> BoxedModel<Self::Input>
  where
    Self: Send + Sync + 'static,
    Self::Error: Into<BoxedModelError>,
  {
    Box::new(ErasedError(self))
  }
}

impl<M: Model> ModelExt for M {}

struct ErasedError<M>(M);

impl<M> Model for ErasedError<M>
where
  M: Model,
  M::Error: Into<BoxedModelError>,
{
  type Input = M::Input;
  type Error = BoxedModelError;

  fn infer(
    &self,
    input: &Self::Input,
    confidence: f32,
    overlap: f32,
  ) -> Result<DetectResult, Self::Error> {
    self.0.infer(input, confidence, overlap).map_err(Into::into)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
}

/// 模型原始输出。`masks[i]` 对应 `items[i]`，多余的掩码会被忽略。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub masks: Option<Box<[Polygon]>>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  /// 第 `index` 个检测对应的掩码，空多边形视为没有掩码
  pub fn mask_of(&self, index: usize) -> Option<&Polygon> {
    self
      .masks
      .as_ref()
      .and_then(|masks| masks.get(index))
      .filter(|mask| !mask.is_empty())
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    DetectResult {
      items: items.into_boxed_slice(),
      masks: None,
    }
  }
}

#[cfg(feature = "record_model")]
mod record;
#[cfg(feature = "record_model")]
pub use self::record::{RecordModel, RecordModelBuilder, RecordModelError};
