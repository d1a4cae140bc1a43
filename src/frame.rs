// 该文件是 Beihu （北湖） 项目的一部分。
// src/frame.rs - 帧、检测框与 ROI 定义
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

use image::{GrayImage, RgbImage};

const RGB_CHANNELS: usize = 3;

/// 浮点载荷中每个元素的字节数
pub const ELEMENT_SIZE: usize = std::mem::size_of::<f32>();

/// 一帧 RGB 图像（HWC，每通道 8 位）
///
/// 帧在产生之后不可变，只能整体移交给下一阶段。
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
  image: RgbImage,
  index: u64,
}

impl Frame {
  pub fn new(image: RgbImage, index: u64) -> Self {
    Self { image, index }
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn into_image(self) -> RgbImage {
    self.image
  }

  /// 帧序号，由输入源分配
  pub fn index(&self) -> u64 {
    self.index
  }

  pub fn height(&self) -> usize {
    self.image.height() as usize
  }

  pub fn width(&self) -> usize {
    self.image.width() as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    Frame::new(image, 0)
  }
}

/// 像素坐标的正方形检测框，`[x1, x2) x [y1, y2)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
  pub x1: u32,
  pub y1: u32,
  pub x2: u32,
  pub y2: u32,
}

impl BoundingBox {
  pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  pub fn width(&self) -> u32 {
    self.x2.saturating_sub(self.x1)
  }

  pub fn height(&self) -> u32 {
    self.y2.saturating_sub(self.y1)
  }

  pub fn area(&self) -> u64 {
    self.width() as u64 * self.height() as u64
  }

  pub fn is_square(&self) -> bool {
    self.width() == self.height()
  }

  /// 是否贴到 `width x height` 画面的任意一条边
  pub fn touches_border(&self, width: u32, height: u32) -> bool {
    self.x1 == 0 || self.y1 == 0 || self.x2 >= width || self.y2 >= height
  }
}

/// 从帧上裁剪下来的原始 ROI
#[derive(Debug, Clone, PartialEq)]
pub struct Roi {
  pub bbox: BoundingBox,
  pub image: RgbImage,
}

impl Roi {
  pub fn new(bbox: BoundingBox, image: RgbImage) -> Self {
    Self { bbox, image }
  }
}

/// 归一化后的 ROI
///
/// `image` 保留单通道结果用于显示，`data` 是按行优先排列、小端序的
/// `f32` 载荷（像素值 / 255），每个像素按 `channels` 重复。
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRoi {
  image: GrayImage,
  channels: u8,
  data: Box<[u8]>,
}

impl NormalizedRoi {
  pub fn new(image: GrayImage, channels: u8) -> Self {
    assert!(channels > 0, "通道数必须大于 0");
    let (width, height) = image.dimensions();
    let size = width as usize * height as usize * channels as usize * ELEMENT_SIZE;
    let mut data = Vec::with_capacity(size);
    for pixel in image.pixels() {
      let value = pixel[0] as f32 / 255.0;
      for _ in 0..channels {
        data.extend_from_slice(&value.to_le_bytes());
      }
    }

    Self {
      image,
      channels,
      data: data.into_boxed_slice(),
    }
  }

  pub fn image(&self) -> &GrayImage {
    &self.image
  }

  pub fn width(&self) -> usize {
    self.image.width() as usize
  }

  pub fn height(&self) -> usize {
    self.image.height() as usize
  }

  pub fn channels(&self) -> usize {
    self.channels as usize
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}

impl AsRef<[u8]> for NormalizedRoi {
  fn as_ref(&self) -> &[u8] {
    &self.data
  }
}
