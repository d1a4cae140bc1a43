// 该文件是 Beihu （北湖） 项目的一部分。
// src/output/draw.rs - 检测框可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::{
  frame::{BoundingBox, Roi},
  sequencer::ClassificationResult,
};

const BOX_THICKNESS: u32 = 2;
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色

#[derive(Debug, Clone)]
pub struct Draw {
  thickness: u32,
  color: [u8; 3],
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      thickness: BOX_THICKNESS,
      color: BOX_COLOR,
    }
  }
}

impl Draw {
  pub fn with_thickness(mut self, thickness: u32) -> Self {
    self.thickness = thickness.max(1);
    self
  }

  pub fn with_color(mut self, color: [u8; 3]) -> Self {
    self.color = color;
    self
  }

  pub fn draw_boxes(&self, image: &mut RgbImage, boxes: &[BoundingBox]) {
    for bbox in boxes {
      self.draw_bbox(image, bbox);
    }
  }

  // 边框向框内加粗，不会画到框外
  fn draw_bbox(&self, image: &mut RgbImage, bbox: &BoundingBox) {
    for t in 0..self.thickness {
      let (w, h) = (bbox.width(), bbox.height());
      if w <= 2 * t || h <= 2 * t {
        break;
      }
      let rect = Rect::at((bbox.x1 + t) as i32, (bbox.y1 + t) as i32).of_size(w - 2 * t, h - 2 * t);
      draw_hollow_rect_mut(image, rect, Rgb(self.color));
    }
  }
}

/// 把分类结果记录成一行文本：`sequence_id, label, x1, y1, x2, y2`
pub struct Record;

impl Record {
  pub fn line(roi: &Roi, result: &ClassificationResult) -> String {
    let bbox = roi.bbox;
    format!(
      "{}, {}, {}, {}, {}, {}",
      result.sequence_id, result.label, bbox.x1, bbox.y1, bbox.x2, bbox.y2
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn box_stays_inside_bounds() {
    let mut image = RgbImage::from_pixel(20, 20, Rgb([255, 255, 255]));
    Draw::default().draw_boxes(&mut image, &[BoundingBox::new(5, 5, 15, 15)]);

    assert_eq!(image.get_pixel(5, 5), &Rgb(BOX_COLOR));
    assert_eq!(image.get_pixel(6, 6), &Rgb(BOX_COLOR));
    assert_eq!(image.get_pixel(14, 14), &Rgb(BOX_COLOR));
    assert_eq!(image.get_pixel(7, 7), &Rgb([255, 255, 255]));
    assert_eq!(image.get_pixel(4, 4), &Rgb([255, 255, 255]));
    assert_eq!(image.get_pixel(15, 15), &Rgb([255, 255, 255]));
  }
}
