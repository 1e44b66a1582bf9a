// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/read_image_folder.rs - 目录批量图像输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{collections::VecDeque, path::PathBuf};

use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{InputError, NamedImage, load_image},
  query_value,
};

const DEFAULT_SUFFIX: &str = "jpg";

/// `folder:///path/to/images?suffix=jpg`，按文件名排序逐张读取。
///
/// 读取失败的文件作为 `Err` 项返回，迭代继续。
pub struct ImageFolderInput {
  files: VecDeque<PathBuf>,
}

impl FromUrlWithScheme for ImageFolderInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageFolderInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }

    let suffix = query_value(url, "suffix").unwrap_or_else(|| DEFAULT_SUFFIX.to_string());
    let directory = PathBuf::from(url.path());
    let io_error = |source| InputError::Io {
      path: directory.clone(),
      source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(&directory).map_err(io_error)? {
      let path = entry.map_err(io_error)?.path();
      if !path.is_file() {
        continue;
      }
      let matched = path
        .extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(&suffix))
        .unwrap_or(false);
      if matched {
        files.push(path);
      }
    }
    files.sort();
    info!("目录 {} 中共有 {} 张 .{} 图像", directory.display(), files.len(), suffix);

    Ok(ImageFolderInput {
      files: files.into(),
    })
  }
}

impl ImageFolderInput {
  pub fn len_hint(&self) -> usize {
    self.files.len()
  }
}

impl Iterator for ImageFolderInput {
  type Item = Result<NamedImage, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.files.pop_front().map(|path| load_image(&path))
  }
}
