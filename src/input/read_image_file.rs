// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/read_image_file.rs - 单张图像文件输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use tracing::error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{InputError, NamedImage, load_image},
};

/// `image:///path/to/picture.jpg`，只产生一张图像
pub struct ImageFileInput {
  path: Option<PathBuf>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
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

    Ok(ImageFileInput {
      path: Some(PathBuf::from(url.path())),
    })
  }
}

impl ImageFileInput {
  pub fn len_hint(&self) -> usize {
    usize::from(self.path.is_some())
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<NamedImage, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.path.take().map(|path| load_image(&path))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  #[test]
  fn yields_single_image_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("label_01.png");
    RgbImage::new(8, 6).save(&path).unwrap();

    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();
    assert_eq!(input.len_hint(), 1);

    let item = input.next().unwrap().unwrap();
    assert_eq!(item.name, "label_01");
    assert_eq!(item.image.dimensions(), (8, 6));
    assert!(input.next().is_none());
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("folder:///tmp").unwrap();
    assert!(ImageFileInput::from_url(&url).is_err());
  }
}
