// 该文件是 Beihu （北湖） 项目的一部分。
// src/detector.rs - 候选区域检测
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! # 候选区域检测
//!
//! 在整帧上寻找可能包含手写数字的正方形区域：
//!
//! 1. 转为灰度，Otsu 自动阈值二值化（前景为高值）
//! 2. 去掉所有接触画面边缘的连通域
//! 3. 提取最外层轮廓，计算外接矩形
//! 4. 以中心为基准扩成正方形，再按面积与边缘规则过滤
//!
//! 检测不会失败，没有结果就是空列表。

use std::collections::HashSet;

use image::{GrayImage, Luma, imageops};
use imageproc::{
  contours::{BorderType, find_contours},
  contrast::{ThresholdType, otsu_level, threshold},
  region_labelling::{Connectivity, connected_components},
};
use tracing::debug;

use crate::{
  frame::{BoundingBox, Frame, Roi},
  output::draw::Draw,
};

const DEFAULT_MIN_AREA: u64 = 5000;
const DEFAULT_MAX_AREA_FRACTION: f64 = 0.5;
const DEFAULT_MAX_BOXES: usize = 10;

/// 检测参数
///
/// 阈值均为经验值，按场景调整。
#[derive(Debug, Clone)]
pub struct DetectorConfig {
  /// 外接矩形的最小面积（像素²），小于该值视为噪声
  pub min_area: u64,
  /// 正方形框面积占整帧面积的上限
  pub max_area_fraction: f64,
  /// 单帧允许的最多检测框数量，超过则整帧放弃
  pub max_boxes: usize,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      min_area: DEFAULT_MIN_AREA,
      max_area_fraction: DEFAULT_MAX_AREA_FRACTION,
      max_boxes: DEFAULT_MAX_BOXES,
    }
  }
}

impl DetectorConfig {
  pub fn with_min_area(mut self, min_area: u64) -> Self {
    self.min_area = min_area;
    self
  }

  pub fn with_max_area_fraction(mut self, fraction: f64) -> Self {
    self.max_area_fraction = fraction;
    self
  }

  pub fn with_max_boxes(mut self, max_boxes: usize) -> Self {
    self.max_boxes = max_boxes;
    self
  }
}

/// 单帧检测结果
#[derive(Debug, Clone)]
pub struct Detection {
  /// 画好检测框的帧；整帧被放弃时与输入相同
  pub annotated: Frame,
  /// 按 (y1, x1) 排序的 ROI
  pub rois: Vec<Roi>,
}

impl Detection {
  pub fn boxes(&self) -> Vec<BoundingBox> {
    self.rois.iter().map(|roi| roi.bbox).collect()
  }
}

#[derive(Default)]
pub struct RegionDetector {
  config: DetectorConfig,
  draw: Draw,
}

impl RegionDetector {
  pub fn new(config: DetectorConfig) -> Self {
    Self {
      config,
      draw: Draw::default(),
    }
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  pub fn detect(&self, frame: &Frame) -> Detection {
    let image = frame.image();
    let (width, height) = image.dimensions();

    let mut boxes = self.find_boxes(&foreground_mask(image));
    debug!("帧 {}: 有效检测框 {} 个", frame.index(), boxes.len());

    if boxes.len() > self.config.max_boxes {
      debug!(
        "帧 {}: 检测框数量 {} 超过上限 {}，放弃整帧",
        frame.index(),
        boxes.len(),
        self.config.max_boxes
      );
      boxes.clear();
    }

    if boxes.is_empty() {
      return Detection {
        annotated: frame.clone(),
        rois: Vec::new(),
      };
    }

    boxes.sort_by_key(|bbox| (bbox.y1, bbox.x1));

    let rois = boxes
      .iter()
      .map(|bbox| {
        let crop = imageops::crop_imm(image, bbox.x1, bbox.y1, bbox.width(), bbox.height());
        Roi::new(*bbox, crop.to_image())
      })
      .collect();

    let mut annotated = image.clone();
    self.draw.draw_boxes(&mut annotated, &boxes);
    debug_assert!(boxes.iter().all(|b| !b.touches_border(width, height)));

    Detection {
      annotated: Frame::new(annotated, frame.index()),
      rois,
    }
  }

  fn find_boxes(&self, mask: &GrayImage) -> Vec<BoundingBox> {
    let (width, height) = mask.dimensions();
    let frame_area = width as f64 * height as f64;

    find_contours::<i32>(mask)
      .into_iter()
      .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
      .filter_map(|contour| {
        let (mut min_x, mut min_y) = (i32::MAX, i32::MAX);
        let (mut max_x, mut max_y) = (i32::MIN, i32::MIN);
        for point in &contour.points {
          min_x = min_x.min(point.x);
          min_y = min_y.min(point.y);
          max_x = max_x.max(point.x);
          max_y = max_y.max(point.y);
        }
        if contour.points.is_empty() {
          return None;
        }

        let (x, y) = (min_x as u32, min_y as u32);
        let (w, h) = ((max_x - min_x + 1) as u32, (max_y - min_y + 1) as u32);
        if (w as u64) * (h as u64) < self.config.min_area {
          return None;
        }

        let bbox = square_box(x, y, w, h, width, height);
        if bbox.area() as f64 > self.config.max_area_fraction * frame_area {
          return None;
        }
        if bbox.touches_border(width, height) || !bbox.is_square() {
          return None;
        }
        Some(bbox)
      })
      .collect()
  }
}

/// 灰度化 + Otsu 反向二值化，并清除接触边缘的连通域
fn foreground_mask(image: &image::RgbImage) -> GrayImage {
  let gray = imageops::grayscale(image);
  let level = otsu_level(&gray);
  let mut binary = threshold(&gray, level, ThresholdType::BinaryInverted);
  clear_border_components(&mut binary);
  binary
}

fn clear_border_components(binary: &mut GrayImage) {
  let (width, height) = binary.dimensions();
  if width == 0 || height == 0 {
    return;
  }

  let labels = connected_components(binary, Connectivity::Eight, Luma([0u8]));
  let mut touching = HashSet::new();
  for x in 0..width {
    touching.insert(labels.get_pixel(x, 0)[0]);
    touching.insert(labels.get_pixel(x, height - 1)[0]);
  }
  for y in 0..height {
    touching.insert(labels.get_pixel(0, y)[0]);
    touching.insert(labels.get_pixel(width - 1, y)[0]);
  }
  touching.remove(&0);

  if touching.is_empty() {
    return;
  }

  for (x, y, label) in labels.enumerate_pixels() {
    if touching.contains(&label[0]) {
      binary.put_pixel(x, y, Luma([0]));
    }
  }
}

/// 以外接矩形中心为基准扩成正方形，并裁到画面范围内
fn square_box(x: u32, y: u32, w: u32, h: u32, width: u32, height: u32) -> BoundingBox {
  let size = w.max(h);
  let cx = x + w / 2;
  let cy = y + h / 2;

  let x1 = cx.saturating_sub(size / 2);
  let y1 = cy.saturating_sub(size / 2);
  let x2 = (x1 + size).min(width);
  let y2 = (y1 + size).min(height);

  BoundingBox::new(x1, y1, x2, y2)
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
  const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

  fn canvas(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, WHITE)
  }

  fn fill(image: &mut RgbImage, x: u32, y: u32, w: u32, h: u32) {
    for yy in y..y + h {
      for xx in x..x + w {
        image.put_pixel(xx, yy, BLACK);
      }
    }
  }

  fn assert_box_invariants(bbox: &BoundingBox, width: u32, height: u32) {
    assert!(0 < bbox.x1 && bbox.x1 < bbox.x2 && bbox.x2 < width, "{bbox:?}");
    assert!(0 < bbox.y1 && bbox.y1 < bbox.y2 && bbox.y2 < height, "{bbox:?}");
    assert!(bbox.is_square(), "{bbox:?}");
  }

  #[test]
  fn blank_frame_has_no_detection() {
    let frame = Frame::new(canvas(320, 240), 1);
    let detection = RegionDetector::default().detect(&frame);
    assert!(detection.rois.is_empty());
    assert_eq!(detection.annotated, frame);
  }

  #[test]
  fn small_blob_is_noise() {
    let mut image = canvas(640, 480);
    fill(&mut image, 300, 200, 50, 50);
    let frame = Frame::new(image, 0);

    let detector = RegionDetector::new(DetectorConfig::default().with_min_area(5000));
    let detection = detector.detect(&frame);
    assert!(detection.rois.is_empty());
    assert_eq!(detection.annotated, frame);
  }

  #[test]
  fn rectangle_is_squared_around_center() {
    let mut image = canvas(640, 480);
    fill(&mut image, 200, 150, 100, 60);
    let frame = Frame::new(image, 0);

    let detection = RegionDetector::default().detect(&frame);
    assert_eq!(detection.rois.len(), 1);
    let roi = &detection.rois[0];
    assert_eq!(roi.bbox, BoundingBox::new(200, 130, 300, 230));
    assert_eq!(roi.image.dimensions(), (100, 100));
    assert_box_invariants(&roi.bbox, 640, 480);
    assert_ne!(detection.annotated, frame);
    // 输入帧不被修改
    assert_eq!(frame.image().get_pixel(200, 130), &WHITE);
  }

  #[test]
  fn border_touching_blob_is_ignored() {
    let mut image = canvas(640, 480);
    fill(&mut image, 0, 100, 120, 120);
    fill(&mut image, 500, 379, 120, 101);
    let detection = RegionDetector::default().detect(&Frame::new(image, 0));
    assert!(detection.rois.is_empty());
  }

  #[test]
  fn square_overflowing_the_edge_is_dropped() {
    // 高 40 宽 120，扩成正方形后超出上边缘
    let mut image = canvas(640, 480);
    fill(&mut image, 200, 10, 120, 45);
    let detection = RegionDetector::default().detect(&Frame::new(image, 0));
    assert!(detection.rois.is_empty());
  }

  #[test]
  fn oversized_box_is_dropped() {
    let mut image = canvas(640, 480);
    fill(&mut image, 100, 60, 300, 300);
    let detector = RegionDetector::new(DetectorConfig::default().with_max_area_fraction(0.25));
    assert!(detector.detect(&Frame::new(image.clone(), 0)).rois.is_empty());

    let detector = RegionDetector::new(DetectorConfig::default().with_max_area_fraction(0.5));
    assert_eq!(detector.detect(&Frame::new(image, 0)).rois.len(), 1);
  }

  #[test]
  fn too_many_boxes_rejects_frame() {
    let mut image = canvas(640, 480);
    fill(&mut image, 40, 40, 80, 80);
    fill(&mut image, 240, 40, 80, 80);
    fill(&mut image, 440, 40, 80, 80);
    let frame = Frame::new(image, 3);

    let detector = RegionDetector::new(DetectorConfig::default().with_max_boxes(2));
    let detection = detector.detect(&frame);
    assert!(detection.rois.is_empty());
    assert_eq!(detection.annotated, frame);

    let detector = RegionDetector::new(DetectorConfig::default().with_max_boxes(3));
    assert_eq!(detector.detect(&frame).rois.len(), 3);
  }

  #[test]
  fn rois_are_sorted_by_top_left() {
    let mut image = canvas(640, 480);
    fill(&mut image, 400, 300, 80, 80);
    fill(&mut image, 100, 300, 80, 80);
    fill(&mut image, 300, 50, 80, 80);
    let detection = RegionDetector::default().detect(&Frame::new(image, 0));

    let boxes = detection.boxes();
    assert_eq!(boxes.len(), 3);
    assert_eq!((boxes[0].x1, boxes[0].y1), (300, 50));
    assert_eq!((boxes[1].x1, boxes[1].y1), (100, 300));
    assert_eq!((boxes[2].x1, boxes[2].y1), (400, 300));
  }

  #[test]
  fn ring_yields_single_outer_box() {
    let mut image = canvas(640, 480);
    fill(&mut image, 200, 150, 120, 120);
    for y in 170..250 {
      for x in 220..300 {
        image.put_pixel(x, y, WHITE);
      }
    }
    fill(&mut image, 240, 190, 40, 40);
    let detection =
      RegionDetector::new(DetectorConfig::default().with_min_area(1000)).detect(&Frame::new(image, 0));
    assert_eq!(detection.boxes(), vec![BoundingBox::new(200, 150, 320, 270)]);
  }

  #[test]
  fn boxes_keep_invariants_across_layouts() {
    let layouts: [&[(u32, u32, u32, u32)]; 4] = [
      &[(10, 10, 90, 70)],
      &[(30, 200, 75, 90), (500, 20, 100, 100)],
      &[(560, 390, 75, 75), (1, 1, 200, 200)],
      &[(250, 180, 130, 70), (60, 60, 72, 80), (420, 300, 90, 120)],
    ];

    for layout in layouts {
      let mut image = canvas(640, 480);
      for &(x, y, w, h) in layout {
        fill(&mut image, x, y, w, h);
      }
      let detection = RegionDetector::default().detect(&Frame::new(image, 0));
      for bbox in detection.boxes() {
        assert_box_invariants(&bbox, 640, 480);
      }
    }
  }
}
