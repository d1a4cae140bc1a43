// 该文件是 Beihu （北湖） 项目的一部分。
// src/input/read_image_file.rs - 静态图像输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("目录中没有图像: {0}")]
  EmptyDirectory(PathBuf),
}

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tiff"];

fn load_rgb(path: &Path) -> Result<RgbImage, ImageFileInputError> {
  Ok(ImageReader::open(path)?.decode()?.into_rgb8())
}

/// 单张静态图像，每次取帧都返回同一张图
pub struct ImageFileInput {
  image: RgbImage,
  produced: u64,
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let image = load_rgb(path.as_ref())?;
    Ok(ImageFileInput { image, produced: 0 })
  }
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}'，实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch);
    }
    Self::open(url.path())
  }
}

impl Iterator for ImageFileInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    let frame = Frame::new(self.image.clone(), self.produced);
    self.produced += 1;
    Some(frame)
  }
}

/// 静态图像序列，按文件名排序，读到末尾后回到第一张
///
/// 读取失败的文件会被跳过；一整轮都读不出图像时序列结束。
pub struct ImageSequenceInput {
  paths: Vec<PathBuf>,
  cursor: usize,
  produced: u64,
}

impl ImageSequenceInput {
  pub fn new(paths: Vec<PathBuf>) -> Self {
    ImageSequenceInput {
      paths,
      cursor: 0,
      produced: 0,
    }
  }

  pub fn from_directory(directory: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let directory = directory.as_ref();
    let mut paths = std::fs::read_dir(directory)?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|path| {
        path
          .extension()
          .and_then(|ext| ext.to_str())
          .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
          .unwrap_or(false)
      })
      .collect::<Vec<_>>();
    if paths.is_empty() {
      return Err(ImageFileInputError::EmptyDirectory(directory.to_path_buf()));
    }
    paths.sort();
    info!("图像序列 {}: {} 张", directory.display(), paths.len());
    Ok(Self::new(paths))
  }

  pub fn len(&self) -> usize {
    self.paths.len()
  }

  pub fn is_empty(&self) -> bool {
    self.paths.is_empty()
  }
}

impl FromUrlWithScheme for ImageSequenceInput {
  const SCHEME: &'static str = "images";
}

impl FromUrl for ImageSequenceInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageFileInputError::SchemeMismatch);
    }
    Self::from_directory(url.path())
  }
}

impl Iterator for ImageSequenceInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    for _ in 0..self.paths.len() {
      let path = &self.paths[self.cursor];
      self.cursor = (self.cursor + 1) % self.paths.len();
      match load_rgb(path) {
        Ok(image) => {
          let frame = Frame::new(image, self.produced);
          self.produced += 1;
          return Some(frame);
        }
        Err(e) => warn!("跳过无法读取的图像 {}: {}", path.display(), e),
      }
    }
    error!("图像序列中没有可读取的图像");
    None
  }
}
