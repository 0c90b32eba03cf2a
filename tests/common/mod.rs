#![allow(dead_code)]

use cengdie::{
  layer::LayerDescriptor,
  model::{DetectItem, DetectResult, Model},
};
use image::RgbImage;

/// 测试用模型：固定输出、返回错误或直接 panic
pub enum StubModel {
  Fixed(DetectResult),
  Fails(&'static str),
  Panics,
}

impl Model for StubModel {
  type Input = RgbImage;
  type Error = String;

  fn infer(&self, _: &RgbImage, _confidence: f32, _overlap: f32) -> Result<DetectResult, String> {
    match self {
      StubModel::Fixed(result) => Ok(result.clone()),
      StubModel::Fails(message) => Err(message.to_string()),
      StubModel::Panics => panic!("推理后端崩溃"),
    }
  }
}

pub fn item(class_id: u32, score: f32, bbox: [f32; 4]) -> DetectItem {
  DetectItem {
    class_id,
    score,
    bbox,
  }
}

pub fn fixed(items: Vec<DetectItem>) -> StubModel {
  StubModel::Fixed(DetectResult::from(items))
}

pub fn layer(name: &str) -> LayerDescriptor {
  LayerDescriptor::new(name, 0.3, 0.5)
}

pub fn frame() -> RgbImage {
  RgbImage::new(64, 48)
}
