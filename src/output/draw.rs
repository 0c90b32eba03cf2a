// 该文件是 Cengdie （层叠检测） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{GrayImage, Luma, Rgb, RgbImage, imageops};
use imageproc::drawing::{
  draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_polygon_mut,
  draw_text_mut, text_size,
};
use imageproc::point::Point;
use imageproc::rect::Rect;

use crate::{
  label::{LabelMap, WithLabel},
  record::{DetectionRecord, DetectionReport},
};

const PALETTE_SIZE: usize = 80;
const PANELS_PER_ROW: u32 = 3;
const LABEL_FONT_SIZE: f32 = 16.0;
const MASK_ALPHA: f32 = 0.3;

pub struct Draw {
  /// 类别颜色
  colors: Vec<Rgb<u8>>,
  /// 层颜色，下标为层索引
  layer_colors: Vec<Rgb<u8>>,
  labels: LabelMap,
  /// 标注字体，没有字体时只画框
  font: Option<FontArc>,
}

impl Default for Draw {
  fn default() -> Self {
    let colors = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    Self {
      colors,
      layer_colors: Vec::new(),
      labels: LabelMap::coco(),
      font: None,
    }
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

impl Draw {
  pub fn with_layer_colors(mut self, colors: impl IntoIterator<Item = [u8; 3]>) -> Self {
    self.layer_colors = colors.into_iter().map(Rgb).collect();
    self
  }

  pub fn with_labels(mut self, labels: LabelMap) -> Self {
    self.labels = labels;
    self
  }

  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn class_color(&self, class_id: u32) -> Rgb<u8> {
    self.colors[class_id as usize % self.colors.len()]
  }

  pub fn layer_color(&self, layer_index: usize) -> Rgb<u8> {
    self
      .layer_colors
      .get(layer_index)
      .copied()
      .unwrap_or_else(|| self.class_color(layer_index as u32 * 17))
  }

  /// 在图像上绘制边框（2 像素）与半透明填充的分割多边形，`captions` 时在框上方标注类别与置信度
  pub fn draw_detections<'d>(
    &self,
    image: &mut RgbImage,
    detections: impl IntoIterator<Item = &'d DetectionRecord>,
    color_of: impl Fn(&DetectionRecord) -> Rgb<u8>,
    captions: bool,
  ) {
    if image.width() == 0 || image.height() == 0 {
      return;
    }
    let (w, h) = (image.width() as f32, image.height() as f32);

    for det in detections {
      let color = color_of(det);

      if let Some(mask) = det.kind.mask()
        && mask.len() > 1
      {
        fill_polygon(image, mask, color);
        for (a, b) in mask.iter().zip(mask.iter().cycle().skip(1)) {
          draw_line_segment_mut(image, (a[0], a[1]), (b[0], b[1]), color);
        }
      }

      let [x1, y1, x2, y2] = det.bbox;
      let x_min = x1.clamp(0.0, w - 1.0).floor() as i32;
      let y_min = y1.clamp(0.0, h - 1.0).floor() as i32;
      let x_max = x2.clamp(0.0, w - 1.0).ceil() as i32;
      let y_max = y2.clamp(0.0, h - 1.0).ceil() as i32;

      if x_max > x_min && y_max > y_min {
        let width = (x_max - x_min + 1) as u32;
        let height = (y_max - y_min + 1) as u32;
        draw_hollow_rect_mut(image, Rect::at(x_min, y_min).of_size(width, height), color);
        if width > 2 && height > 2 {
          let inner = Rect::at(x_min + 1, y_min + 1).of_size(width - 2, height - 2);
          draw_hollow_rect_mut(image, inner, color);
        }
        if captions {
          self.draw_caption(image, det, color, x_min, y_min);
        }
      }
    }
  }

  fn draw_caption(
    &self,
    image: &mut RgbImage,
    det: &DetectionRecord,
    color: Rgb<u8>,
    x: i32,
    y: i32,
  ) {
    let Some(font) = &self.font else {
      return;
    };

    let label = format!("{} {:.2}", self.labels.label_of(det.class_id), det.confidence);
    let scale = PxScale::from(LABEL_FONT_SIZE);
    let (text_width, text_height) = text_size(scale, font, &label);

    // 标签放在边框上方，超出图像时贴住上边缘
    let label_y = (y - text_height as i32).max(0);
    let label_width = text_width.min(image.width().saturating_sub(x as u32));

    if label_width > 0 && text_height > 0 {
      let rect = Rect::at(x, label_y).of_size(label_width, text_height);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(image, Rgb([255, 255, 255]), x, label_y, scale, font, &label);
    }
  }

  /// 最终合并结果，按类别着色并标注
  pub fn draw_final(&self, frame: &RgbImage, report: &DetectionReport) -> RgbImage {
    let mut image = frame.clone();
    self.draw_detections(
      &mut image,
      &report.final_detections,
      |d| self.class_color(d.class_id),
      true,
    );
    image
  }

  /// 每个贡献层一个面板（层颜色），最后一个面板为合并结果，每行三个面板
  pub fn draw_layers(&self, frame: &RgbImage, report: &DetectionReport) -> RgbImage {
    let mut panels: Vec<RgbImage> = report
      .layer_results
      .iter()
      .map(|result| {
        let mut panel = frame.clone();
        let color = self.layer_color(result.layer_index);
        self.draw_detections(&mut panel, &result.detections, |_| color, false);
        panel
      })
      .collect();
    panels.push(self.draw_final(frame, report));

    let (w, h) = frame.dimensions();
    let count = panels.len() as u32;
    let cols = count.min(PANELS_PER_ROW);
    let rows = count.div_ceil(PANELS_PER_ROW);

    let mut canvas = RgbImage::new(w * cols, h * rows);
    for (i, panel) in panels.iter().enumerate() {
      let i = i as u32;
      let x = (i % PANELS_PER_ROW) * w;
      let y = (i / PANELS_PER_ROW) * h;
      imageops::replace(&mut canvas, panel, x as i64, y as i64);
    }
    canvas
  }
}

/// 以 `MASK_ALPHA` 的不透明度把多边形区域混合为 `color`
fn fill_polygon(image: &mut RgbImage, polygon: &[[f32; 2]], color: Rgb<u8>) {
  let mut points: Vec<Point<i32>> = polygon
    .iter()
    .map(|p| Point::new(p[0].round() as i32, p[1].round() as i32))
    .collect();
  points.dedup();
  // draw_polygon_mut 要求首尾顶点不重合
  while points.len() > 1 && points.first() == points.last() {
    points.pop();
  }
  if points.len() < 3 {
    return;
  }

  let mut coverage = GrayImage::new(image.width(), image.height());
  draw_polygon_mut(&mut coverage, &points, Luma([255u8]));

  for (x, y, covered) in coverage.enumerate_pixels() {
    if covered[0] == 0 {
      continue;
    }
    let pixel = image.get_pixel_mut(x, y);
    for (channel, target) in pixel.0.iter_mut().zip(color.0) {
      let blended = *channel as f32 * (1.0 - MASK_ALPHA) + target as f32 * MASK_ALPHA;
      *channel = blended.round() as u8;
    }
  }
}
