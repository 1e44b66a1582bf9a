// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use tracing::{debug, info};

use crate::{
  FromUrl, FromUrlWithScheme,
  input::NamedImage,
  model::{DetectResult, Labels},
  output::{
    OutputError, Render,
    draw::{Draw, Record},
  },
  query_value,
};

const SUMMARY_FILE: &str = "summary.json";

/// `folder:///out?draw=true&thickness=2&record=id&labels=QRCode`
///
/// 每张图像写出 `<name>.jpg`（绘制检测框）和 `<name>.txt`（检测列表），
/// 批处理结束后写出 `summary.json`。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Option<Draw>,
  record: Option<Record>,
  labels: Labels,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = OutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch {
        expected: Self::SCHEME.to_string(),
        actual: uri.scheme().to_string(),
      });
    }

    let thickness = match query_value(uri, "thickness") {
      None => None,
      Some(value) => match value.parse::<i32>() {
        Ok(t) if t > 0 => Some(t),
        _ => {
          return Err(OutputError::InvalidParam {
            key: "thickness".to_string(),
            value,
          });
        }
      },
    };

    let draw = match query_value(uri, "draw").as_deref() {
      None | Some("true") | Some("1") => Some(match thickness {
        Some(t) => Draw::default().with_thickness(t),
        None => Draw::default(),
      }),
      Some("false") | Some("0") => None,
      Some(other) => {
        return Err(OutputError::InvalidParam {
          key: "draw".to_string(),
          value: other.to_string(),
        });
      }
    };

    let record = match query_value(uri, "record").as_deref() {
      None | Some("id") | Some("true") => Some(Record {
        label_with_name: false,
      }),
      Some("name") => Some(Record {
        label_with_name: true,
      }),
      Some("none") | Some("false") => None,
      Some(other) => {
        return Err(OutputError::InvalidParam {
          key: "record".to_string(),
          value: other.to_string(),
        });
      }
    };

    let labels = query_value(uri, "labels")
      .map(|s| s.parse::<Labels>().unwrap_or_default())
      .unwrap_or_default();

    Self::new(PathBuf::from(uri.path()), draw, record, labels)
  }
}

impl DirectoryRecordOutput {
  pub fn new(
    directory: PathBuf,
    draw: Option<Draw>,
    record: Option<Record>,
    labels: Labels,
  ) -> Result<Self, OutputError> {
    std::fs::create_dir_all(&directory)?;
    info!("输出目录: {}", directory.display());
    Ok(Self {
      directory,
      draw,
      record,
      labels,
    })
  }

  pub fn with_labels(mut self, labels: Labels) -> Self {
    self.labels = labels;
    self
  }

  /// 写出批处理汇总，返回文件路径
  pub fn write_summary(&self, summary: &serde_json::Value) -> Result<PathBuf, OutputError> {
    let path = self.directory.join(SUMMARY_FILE);
    std::fs::write(&path, serde_json::to_string_pretty(summary)?)?;
    info!("汇总已写入 {}", path.display());
    Ok(path)
  }
}

impl Render<NamedImage, DetectResult> for DirectoryRecordOutput {
  type Error = OutputError;

  fn render_result(&self, frame: &NamedImage, result: &DetectResult) -> Result<(), Self::Error> {
    let path = self.directory.join(format!("{}.jpg", frame.name));

    if let Some(draw) = &self.draw {
      let mut image = frame.image.clone();
      draw.draw_detections(&mut image, result);
      image.save(&path)?;
      debug!("保存标注图像 {}", path.display());
    }
    if let Some(record) = &self.record {
      record.record(result, &self.labels, &path)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{geometry::Rect, model::DetectItem};
  use image::RgbImage;

  fn frame() -> NamedImage {
    NamedImage {
      name: "sample".to_string(),
      path: PathBuf::from("sample.jpg"),
      image: RgbImage::new(32, 32),
    }
  }

  fn output_url(dir: &std::path::Path, query: &str) -> url::Url {
    url::Url::parse(&format!("folder://{}{}", dir.display(), query)).unwrap()
  }

  #[test]
  fn writes_image_and_record() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("out");
    let output = DirectoryRecordOutput::from_url(&output_url(&out_dir, "")).unwrap();

    let result = DetectResult::from(vec![DetectItem {
      label: 0,
      score: 0.75,
      bbox: Rect::new(4.0, 4.0, 10.0, 10.0),
    }]);
    output.render_result(&frame(), &result).unwrap();

    assert!(out_dir.join("sample.jpg").is_file());
    let text = std::fs::read_to_string(out_dir.join("sample.txt")).unwrap();
    assert_eq!(text, "0, 75.0, 4, 4, 14, 14");
  }

  #[test]
  fn drawing_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let url = output_url(dir.path(), "?draw=false&record=name");
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    output.render_result(&frame(), &DetectResult::default()).unwrap();
    assert!(!dir.path().join("sample.jpg").exists());
    assert!(dir.path().join("sample.txt").is_file());
  }

  #[test]
  fn rejects_unknown_options() {
    let dir = tempfile::tempdir().unwrap();
    assert!(DirectoryRecordOutput::from_url(&output_url(dir.path(), "?draw=maybe")).is_err());
    assert!(DirectoryRecordOutput::from_url(&output_url(dir.path(), "?thickness=0")).is_err());
    let image_url = url::Url::parse("image:///tmp/a.jpg").unwrap();
    assert!(DirectoryRecordOutput::from_url(&image_url).is_err());
  }

  #[test]
  fn summary_is_pretty_json() {
    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput::from_url(&output_url(dir.path(), "")).unwrap();
    let path = output
      .write_summary(&serde_json::json!({ "processed": 3 }))
      .unwrap();
    let text = std::fs::read_to_string(path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["processed"], 3);
  }
}
