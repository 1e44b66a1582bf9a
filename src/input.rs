// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 图像输入
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

use image::{ImageReader, RgbImage};
use thiserror::Error;

use crate::{FromUrl, FromUrlWithScheme};

mod read_image_file;
mod read_image_folder;

pub use self::read_image_file::ImageFileInput;
pub use self::read_image_folder::ImageFolderInput;

#[derive(Error, Debug)]
pub enum InputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("读取 {path} 失败: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("解码图像 {path} 失败: {source}")]
  Decode {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
}

/// 一张待处理的图像，`name` 为去掉扩展名的文件名
#[derive(Debug, Clone)]
pub struct NamedImage {
  pub name: String,
  pub path: PathBuf,
  pub image: RgbImage,
}

pub(crate) fn load_image(path: &Path) -> Result<NamedImage, InputError> {
  let image = ImageReader::open(path)
    .map_err(|source| InputError::Io {
      path: path.to_path_buf(),
      source,
    })?
    .decode()
    .map_err(|source| InputError::Decode {
      path: path.to_path_buf(),
      source,
    })?
    .to_rgb8();

  let name = path
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_default();

  Ok(NamedImage {
    name,
    path: path.to_path_buf(),
    image,
  })
}

/// 按 URI 方案选择输入源：`image:` 单张图片，`folder:` 目录批处理
pub enum InputWrapper {
  ImageFile(ImageFileInput),
  ImageFolder(ImageFolderInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if url.scheme() == ImageFileInput::SCHEME {
      return Ok(InputWrapper::ImageFile(ImageFileInput::from_url(url)?));
    }
    if url.scheme() == ImageFolderInput::SCHEME {
      return Ok(InputWrapper::ImageFolder(ImageFolderInput::from_url(url)?));
    }
    Err(InputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl InputWrapper {
  /// 预计的图像数量（目录中可能有无法解码的文件）
  pub fn len_hint(&self) -> usize {
    match self {
      InputWrapper::ImageFile(input) => input.len_hint(),
      InputWrapper::ImageFolder(input) => input.len_hint(),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = Result<NamedImage, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ImageFile(input) => input.next(),
      InputWrapper::ImageFolder(input) => input.next(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = url::Url::parse("v4l2:///dev/video0").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch(s)) if s == "v4l2"
    ));
  }

  #[test]
  fn missing_file_reports_path() {
    let err = load_image(Path::new("/nonexistent/qr.jpg")).unwrap_err();
    assert!(matches!(err, InputError::Io { .. }));
    assert!(err.to_string().contains("/nonexistent/qr.jpg"));
  }
}
