// 该文件是 Cengdie （层叠检测） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use chrono::{DateTime, Datelike, Local};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{
    Render,
    json_report::{JsonReportError, write_report_to},
  },
  record::DetectionReport,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("报告写入错误: {0}")]
  ReportError(#[from] JsonReportError),
}

/// 按日期归档报告：`<dir>/YYYY/MM/DD/detection_results_YYYYmmdd_HHMMSS.json`。
/// 所有层都失败的报告同样写入，读取方据 `status` 区分。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
    })
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    DirectoryRecordOutput {
      directory: directory.into(),
    }
  }

  pub fn report_path(&self, now: DateTime<Local>) -> PathBuf {
    report_path_in(&self.directory, now)
  }

  /// 写入报告，返回文件路径
  pub fn write_report(
    &self,
    report: &DetectionReport,
  ) -> Result<PathBuf, DirectoryRecordOutputError> {
    let path = self.report_path(Local::now());
    write_report_to(&path, report)?;
    Ok(path)
  }
}

fn report_path_in(directory: &Path, now: DateTime<Local>) -> PathBuf {
  directory
    .join(now.year().to_string())
    .join(format!("{:02}", now.month()))
    .join(format!("{:02}", now.day()))
    .join(format!("detection_results_{}.json", now.format("%Y%m%d_%H%M%S")))
}

impl<Frame> Render<Frame> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_report(&self, _frame: &Frame, report: &DetectionReport) -> Result<(), Self::Error> {
    self.write_report(report).map(|_| ())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{layer::LayerFailure, record::RunStatus};
  use chrono::TimeZone;

  #[test]
  fn path_is_grouped_by_date() {
    let output = DirectoryRecordOutput::new("/records");
    let now = Local.with_ymd_and_hms(2026, 3, 7, 9, 5, 1).unwrap();

    assert_eq!(
      output.report_path(now),
      PathBuf::from("/records/2026/03/07/detection_results_20260307_090501.json")
    );
  }

  #[test]
  fn directory_comes_from_url_path() {
    let url = url::Url::parse("folder:///records").unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert_eq!(output.directory, PathBuf::from("/records"));

    let url = url::Url::parse("json:///records").unwrap();
    assert!(matches!(
      DirectoryRecordOutput::from_url(&url),
      Err(DirectoryRecordOutputError::SchemeMismatch)
    ));
  }

  #[test]
  fn report_with_every_layer_failed_is_archived() {
    let dir = tempfile::tempdir().unwrap();
    let report = DetectionReport {
      layer_results: Vec::new(),
      final_detections: Vec::new(),
      image_size: (640, 480),
      total_layers: 2,
      status: RunStatus::AllLayersFailed,
      failures: vec![LayerFailure::Detector {
        layer_name: "Layer 1".to_string(),
        layer_index: 0,
        message: "权重文件缺失".to_string(),
      }],
    };

    let output = DirectoryRecordOutput::new(dir.path());
    let path = output.write_report(&report).unwrap();

    assert!(path.starts_with(dir.path()));
    let written: serde_json::Value =
      serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["status"], "all_layers_failed");
    assert_eq!(written["total_layers"], 2);
    assert_eq!(written["final_detections"].as_array().unwrap().len(), 0);
  }
}
