// 该文件是 Cengdie （层叠检测） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use anyhow::Result;
use clap::Parser;
use image::RgbImage;
use tracing::info;

use cengdie::{
  FromUrl,
  config::PipelineConfig,
  input::ImageFileInput,
  label::LabelMap,
  model::{ModelExt, RecordModelBuilder},
  output::{OutputWrapper, Render},
  pipeline::Pipeline,
  summary::Summary,
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("配置文件: {}", args.config.display());
  info!("输入来源: {}", args.input);

  let mut config = PipelineConfig::load(&args.config)?;
  if let Some(iou) = args.merge_iou {
    config.merge.iou_threshold = iou;
  }

  let labels = match &config.merge.labels {
    Some(path) => LabelMap::load(path)?,
    None => LabelMap::coco(),
  };

  info!("正在加载 {} 个检测层...", config.layers.len());
  let mut builder = Pipeline::builder().iou_threshold(config.merge.iou_threshold);
  for layer in &config.layers {
    let model = RecordModelBuilder::from_url(&layer.model)?
      .build::<RgbImage>()?
      .boxed();
    builder = builder.layer(layer.descriptor.clone(), model);
  }
  let pipeline = builder.build()?;
  info!("合并 IoU 阈值: {}", pipeline.merger().iou_threshold());

  let input = ImageFileInput::from_url(&args.input)?;
  let frame = input.image();

  let report = if args.concurrent {
    pipeline.run_concurrent(frame)
  } else {
    pipeline.run(frame)
  };

  println!("{}", Summary::from_report(&report, &labels));

  let colors: Vec<[u8; 3]> = pipeline.layers().iter().map(|l| l.descriptor.color).collect();
  for url in &args.output {
    let output = OutputWrapper::from_url(url)?
      .with_layer_colors(colors.iter().copied())
      .with_labels(&labels);
    output.render_report(frame, &report)?;
  }

  info!("处理完成!");
  Ok(())
}
