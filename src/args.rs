// 该文件是 Cengdie （层叠检测） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;
use url::Url;

/// Cengdie 多层检测参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 流水线配置文件 (TOML)，定义各检测层及合并参数
  #[arg(long, value_name = "FILE")]
  pub config: PathBuf,

  /// 输入图像，例如 image:///data/bus.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出地址，可重复指定
  /// 支持格式:
  /// - JSON 报告: json:///out/report.json
  /// - 按日期归档: folder:///out/records
  /// - 结果图像: image:///out/result.png[?layers][&font=/path/to/font.ttf]
  #[arg(long, value_name = "OUTPUT")]
  pub output: Vec<Url>,

  /// 跨层合并 IoU 阈值 (0.0 - 1.0)，覆盖配置文件
  #[arg(long, value_name = "THRESHOLD")]
  pub merge_iou: Option<f32>,

  /// 各层并发运行
  #[arg(long)]
  pub concurrent: bool,
}
