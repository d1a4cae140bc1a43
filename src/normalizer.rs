// 该文件是 Beihu （北湖） 项目的一部分。
// src/normalizer.rs - ROI 归一化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::{GrayImage, Luma, imageops};
use imageproc::{
  contrast::{ThresholdType, threshold},
  distance_transform::Norm,
  morphology::close,
};

use crate::frame::{NormalizedRoi, Roi};

const DEFAULT_CONTRAST_GAIN: f32 = 2.0;
const DEFAULT_THRESHOLD: u8 = 175;
const DEFAULT_PADDING: u32 = 4;
const DEFAULT_PAD_VALUE: u8 = 255;
pub const NORMALIZED_WIDTH: u32 = 32;
pub const NORMALIZED_HEIGHT: u32 = 32;

/// 归一化参数
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
  /// 对比度增益，结果裁到 [0, 255]
  pub contrast_gain: f32,
  /// 二值化阈值，大于该值为 255
  pub threshold: u8,
  /// 形态学闭运算核半径，0 表示跳过
  pub morph_kernel: u8,
  /// 四周填充宽度
  pub padding: u32,
  /// 填充值
  pub pad_value: u8,
  pub width: u32,
  pub height: u32,
  /// 载荷中每个像素重复的次数
  pub channels: u8,
}

impl Default for NormalizerConfig {
  fn default() -> Self {
    Self {
      contrast_gain: DEFAULT_CONTRAST_GAIN,
      threshold: DEFAULT_THRESHOLD,
      morph_kernel: 0,
      padding: DEFAULT_PADDING,
      pad_value: DEFAULT_PAD_VALUE,
      width: NORMALIZED_WIDTH,
      height: NORMALIZED_HEIGHT,
      channels: 1,
    }
  }
}

impl NormalizerConfig {
  pub fn with_contrast_gain(mut self, gain: f32) -> Self {
    self.contrast_gain = gain;
    self
  }

  pub fn with_threshold(mut self, threshold: u8) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn with_morph_kernel(mut self, k: u8) -> Self {
    self.morph_kernel = k;
    self
  }

  pub fn with_padding(mut self, padding: u32, value: u8) -> Self {
    self.padding = padding;
    self.pad_value = value;
    self
  }

  pub fn with_channels(mut self, channels: u8) -> Self {
    self.channels = channels;
    self
  }
}

#[derive(Debug, Clone, Default)]
pub struct RoiNormalizer {
  config: NormalizerConfig,
}

impl RoiNormalizer {
  pub fn new(config: NormalizerConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &NormalizerConfig {
    &self.config
  }

  /// 对单个 ROI 执行完整的归一化流程，结果只取决于像素与参数
  pub fn normalize(&self, roi: &Roi) -> NormalizedRoi {
    let (w, h) = roi.image.dimensions();
    assert!(w > 0 && h > 0, "ROI 尺寸不能为 0: {}x{}", w, h);

    let gray = imageops::grayscale(&roi.image);
    let scaled = scale_contrast(&gray, self.config.contrast_gain);
    let mut binary = threshold(&scaled, self.config.threshold, ThresholdType::Binary);
    if self.config.morph_kernel > 0 {
      binary = close(&binary, Norm::LInf, self.config.morph_kernel);
    }
    let padded = pad(&binary, self.config.padding, self.config.pad_value);
    let resized = resize_area(&padded, self.config.width, self.config.height);

    NormalizedRoi::new(resized, self.config.channels)
  }

  pub fn normalize_all(&self, rois: &[Roi]) -> Vec<NormalizedRoi> {
    rois.iter().map(|roi| self.normalize(roi)).collect()
  }
}

fn scale_contrast(image: &GrayImage, gain: f32) -> GrayImage {
  let mut out = image.clone();
  for pixel in out.pixels_mut() {
    let value = (pixel[0] as f32 * gain).round().clamp(0.0, 255.0);
    *pixel = Luma([value as u8]);
  }
  out
}

fn pad(image: &GrayImage, padding: u32, value: u8) -> GrayImage {
  if padding == 0 {
    return image.clone();
  }
  let (w, h) = image.dimensions();
  let mut out = GrayImage::from_pixel(w + 2 * padding, h + 2 * padding, Luma([value]));
  imageops::replace(&mut out, image, padding as i64, padding as i64);
  out
}

/// 源图像在一个轴上对每个目标像素的覆盖：(源下标, 覆盖长度)
fn area_weights(src: u32, dst: u32) -> Vec<Vec<(u32, f32)>> {
  let scale = src as f32 / dst as f32;
  (0..dst)
    .map(|d| {
      let start = d as f32 * scale;
      let end = start + scale;
      let first = start.floor() as u32;
      let last = (end.ceil() as u32).min(src);
      (first..last)
        .filter_map(|s| {
          let overlap = (end.min(s as f32 + 1.0) - start.max(s as f32)).max(0.0);
          (overlap > 0.0).then_some((s, overlap))
        })
        .collect()
    })
    .collect()
}

/// 按面积加权平均缩放，缩小时自带抗混叠
fn resize_area(image: &GrayImage, width: u32, height: u32) -> GrayImage {
  let (src_w, src_h) = image.dimensions();
  if (src_w, src_h) == (width, height) {
    return image.clone();
  }

  let xs = area_weights(src_w, width);
  let ys = area_weights(src_h, height);

  GrayImage::from_fn(width, height, |x, y| {
    let mut sum = 0.0f32;
    let mut total = 0.0f32;
    for &(sy, wy) in &ys[y as usize] {
      for &(sx, wx) in &xs[x as usize] {
        let weight = wx * wy;
        sum += image.get_pixel(sx, sy)[0] as f32 * weight;
        total += weight;
      }
    }
    let value = if total > 0.0 { sum / total } else { 0.0 };
    Luma([value.round().clamp(0.0, 255.0) as u8])
  })
}
