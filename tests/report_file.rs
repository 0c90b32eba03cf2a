mod common;

use cengdie::{
  FromUrl,
  model::{DetectItem, DetectResult, Model, ModelExt, RecordModelBuilder},
  output::{JsonReportOutput, OutputWrapper, Render, read_report},
  pipeline::Pipeline,
  record::{DetectionReport, RunStatus},
};
use image::RgbImage;
use url::Url;

use common::{StubModel, fixed, frame, item, layer};

fn report() -> DetectionReport {
  let seg = StubModel::Fixed(DetectResult {
    items: vec![item(5, 0.66, [3.5, 4.25, 9.0, 12.0])].into_boxed_slice(),
    masks: Some(vec![vec![[3.5, 4.25], [9.0, 4.25], [6.0, 12.0]]].into_boxed_slice()),
  });
  Pipeline::builder()
    .layer(
      layer("Layer 1"),
      fixed(vec![
        item(1, 0.9, [0.0, 0.0, 10.0, 10.0]),
        item(1, 0.333, [40.0, 1.0, 50.0, 20.0]),
      ]),
    )
    .layer(layer("Layer 2"), StubModel::Fails("断开"))
    .layer(layer("Layer 3"), seg)
    .build()
    .unwrap()
    .run(&frame())
}

#[test]
fn saved_report_reloads_with_identical_records() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("nested").join("report.json");
  let original = report();

  JsonReportOutput::with_path(&path).write_report(&original).unwrap();
  let loaded = read_report(&path).unwrap();

  assert_eq!(loaded.total_layers, original.total_layers);
  assert_eq!(loaded.image_size, original.image_size);
  assert_eq!(loaded.status, original.status);
  assert_eq!(loaded.failures, original.failures);
  assert_eq!(loaded.layer_results.len(), original.layer_results.len());
  for (a, b) in loaded.final_detections.iter().zip(&original.final_detections) {
    assert_eq!(a.bbox, b.bbox);
    assert_eq!(a.class_id, b.class_id);
    assert!((a.confidence - b.confidence).abs() < 1e-6);
    assert_eq!(a.layer_index, b.layer_index);
    assert_eq!(a.kind, b.kind);
  }
}

#[test]
fn saved_report_is_plain_json() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("report.json");
  let url = Url::parse(&format!("json://{}", path.display())).unwrap();

  let output = OutputWrapper::from_url(&url).unwrap();
  output.render_report(&frame(), &report()).unwrap();

  let value: serde_json::Value =
    serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
  assert_eq!(value["total_layers"], 3);
  assert_eq!(value["image_size"], serde_json::json!([64, 48]));
  assert_eq!(value["layer_results"].as_array().unwrap().len(), 2);
  assert_eq!(value["final_detections"][0]["type"], "box");
  assert_eq!(value["final_detections"][1]["type"], "segment");
  assert_eq!(value["final_detections"][1]["layer"], 2);
  assert_eq!(value["failures"][0]["kind"], "detector");
}

#[test]
fn non_finite_report_is_not_written() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("bad.json");
  let mut bad = report();
  bad.final_detections[0].bbox[2] = f32::INFINITY;

  assert!(JsonReportOutput::with_path(&path).write_report(&bad).is_err());
  assert!(!path.exists());
}

#[test]
fn unknown_output_scheme_is_rejected() {
  let url = Url::parse("ftp://example.com/report.json").unwrap();
  assert!(OutputWrapper::from_url(&url).is_err());
}

#[test]
fn recorded_layers_drive_the_pipeline() {
  let dir = tempfile::tempdir().unwrap();
  let fast = dir.path().join("fast.txt");
  std::fs::write(&fast, "0, 0.35, 0, 0, 10, 10\n0, 0.2, 30, 30, 40, 40\n").unwrap();
  let precise = dir.path().join("precise.json");
  let recorded = DetectResult::from(vec![item(0, 0.85, [1.0, 1.0, 10.0, 10.0])]);
  std::fs::write(&precise, serde_json::to_string(&recorded).unwrap()).unwrap();

  let report = Pipeline::builder()
    .layer(
      layer("fast"),
      RecordModelBuilder::with_path(&fast).build::<RgbImage>().unwrap(),
    )
    .layer(
      layer("precise"),
      RecordModelBuilder::with_path(&precise).build::<RgbImage>().unwrap(),
    )
    .build()
    .unwrap()
    .run(&frame());

  assert_eq!(report.layer_results[0].count, 1);
  assert_eq!(report.final_detections.len(), 1);
  assert_eq!(report.final_detections[0].layer_index, 1);
  assert_eq!(report.final_detections[0].confidence, 0.85);
}

/// 固定输出一个检测，错误类型与 RecordModel 不同
struct Constant(DetectItem);

impl Model for Constant {
  type Input = RgbImage;
  type Error = std::io::Error;

  fn infer(&self, _: &RgbImage, _: f32, _: f32) -> Result<DetectResult, Self::Error> {
    Ok(DetectResult::from(vec![self.0.clone()]))
  }
}

#[test]
fn different_backends_share_one_pipeline() {
  let dir = tempfile::tempdir().unwrap();
  let recorded = dir.path().join("recorded.txt");
  std::fs::write(&recorded, "2, 0.6, 0, 0, 20, 20
7, 0.4, 40, 10, 60, 30
").unwrap();

  let report = Pipeline::builder()
    .layer(
      layer("recorded"),
      RecordModelBuilder::with_path(&recorded).build::<RgbImage>().unwrap().boxed(),
    )
    .layer(layer("constant"), Constant(item(2, 0.9, [1.0, 1.0, 20.0, 20.0])).boxed())
    .layer(layer("stub"), StubModel::Fails("离线").boxed())
    .build()
    .unwrap()
    .run_concurrent(&frame());

  assert_eq!(report.status, RunStatus::Completed);
  assert_eq!(report.contributed_layers(), 2);
  assert_eq!(report.failures.len(), 1);
  assert_eq!(report.failures[0].layer_name(), "stub");

  let winners: Vec<_> = report
    .final_detections
    .iter()
    .map(|d| (d.class_id, d.layer_index))
    .collect();
  assert_eq!(winners, [(2, 1), (7, 0)]);
}
