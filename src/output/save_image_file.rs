// 该文件是 Cengdie （层叠检测） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::path::Path;

use ab_glyph::FontArc;
use image::RgbImage;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  label::LabelMap,
  output::{Render, draw::Draw},
  record::DetectionReport,
};

/// 把检测结果画到图像上保存。`?layers` 时输出逐层面板网格，
/// `?font=/path/to/font.ttf` 时在最终结果上标注类别与置信度。
pub struct SaveImageFileOutput {
  path: String,
  draw: Draw,
  layers: bool,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无法加载字体文件: {0}")]
  FontLoadError(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let mut draw = Draw::default();
    if let Some((_, font_path)) = uri.query_pairs().find(|(k, _)| k == "font") {
      let data = std::fs::read(&*font_path).map_err(SaveImageFileError::IoError)?;
      let font = FontArc::try_from_vec(data)
        .map_err(|_| SaveImageFileError::FontLoadError(font_path.to_string()))?;
      info!("标注字体: {}", font_path);
      draw = draw.with_font(font);
    }

    Ok(SaveImageFileOutput {
      path: uri.path().to_string(),
      draw,
      layers: uri.query_pairs().any(|(k, _)| k == "layers"),
    })
  }
}

impl SaveImageFileOutput {
  pub fn with_layer_colors(mut self, colors: impl IntoIterator<Item = [u8; 3]>) -> Self {
    self.draw = self.draw.with_layer_colors(colors);
    self
  }

  pub fn with_labels(mut self, labels: LabelMap) -> Self {
    self.draw = self.draw.with_labels(labels);
    self
  }

  fn save_image(&self, image: RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = Path::new(&self.path).parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(SaveImageFileError::IoError)?;
    }

    image
      .save(&self.path)
      .map_err(SaveImageFileError::ImageError)?;

    info!("结果图像已保存: {}", self.path);

    Ok(())
  }
}

impl Render<RgbImage> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_report(&self, frame: &RgbImage, report: &DetectionReport) -> Result<(), Self::Error> {
    let image = if self.layers {
      self.draw.draw_layers(frame, report)
    } else {
      self.draw.draw_final(frame, report)
    };
    self.save_image(image)
  }
}
