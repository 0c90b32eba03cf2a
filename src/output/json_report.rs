// 该文件是 Cengdie （层叠检测） 项目的一部分。
// src/output/json_report.rs - JSON 报告文件输出
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
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::Render,
  record::{DetectionReport, ExportError},
};

#[derive(Error, Debug)]
pub enum JsonReportError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("导出错误: {0}")]
  ExportError(#[from] ExportError),
}

pub struct JsonReportOutput {
  path: PathBuf,
}

impl FromUrlWithScheme for JsonReportOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonReportOutput {
  type Error = JsonReportError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonReportError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(JsonReportOutput {
      path: PathBuf::from(uri.path()),
    })
  }
}

impl JsonReportOutput {
  pub fn with_path(path: impl Into<PathBuf>) -> Self {
    JsonReportOutput { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 写入报告。序列化失败时不会留下文件。
  pub fn write_report(&self, report: &DetectionReport) -> Result<(), JsonReportError> {
    write_report_to(&self.path, report)
  }
}

pub(crate) fn write_report_to(
  path: &Path,
  report: &DetectionReport,
) -> Result<(), JsonReportError> {
  let json = report.to_json()?;

  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(path, json)?;

  info!("结果已保存: {}", path.display());
  Ok(())
}

/// 重新加载已保存的报告
pub fn read_report(path: impl AsRef<Path>) -> Result<DetectionReport, JsonReportError> {
  let content = std::fs::read_to_string(path)?;
  Ok(DetectionReport::from_json(&content)?)
}

impl<Frame> Render<Frame> for JsonReportOutput {
  type Error = JsonReportError;

  fn render_report(&self, _frame: &Frame, report: &DetectionReport) -> Result<(), Self::Error> {
    self.write_report(report)
  }
}
