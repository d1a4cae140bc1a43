// 该文件是 Beihu （北湖） 项目的一部分。
// src/output/directory_record.rs - 按日期目录记录检测帧与识别结果
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  fs::OpenOptions,
  io::Write,
  path::{Path, PathBuf},
  sync::Mutex,
};

use chrono::{DateTime, Datelike, Local};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{BoundingBox, Frame, Roi},
  output::{OutputError, Render, draw::Record},
  sequencer::ClassificationResult,
};

const RECORD_FILE: &str = "results.txt";

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 目录记录输出
///
/// 目录结构为 `dir/YYYY/MM/DD/`：
/// - `HH-MM-SS-XXXX.png`：画好检测框的帧，默认只保存有检测结果的帧，`?always` 保存全部
/// - `HH-MM-SS-XXXX-roi-N.png`：序号为 N 的区域截图
/// - `results.txt`：每条识别结果一行 `sequence_id, label, x1, y1, x2, y2`
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counter: Mutex<u16>,
  record: Mutex<()>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");
    Ok(Self::new(uri.path(), always))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl AsRef<Path>, always: bool) -> Self {
    DirectoryRecordOutput {
      directory: directory.as_ref().to_path_buf(),
      frame_counter: Mutex::new(0),
      record: Mutex::new(()),
      always,
    }
  }

  fn frame_id(&self) -> u16 {
    let mut counter = self
      .frame_counter
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    *counter = counter.wrapping_add(1);
    *counter
  }

  fn day_directory(&self, now: &DateTime<Local>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;
    Ok(directory)
  }

  fn save_frame(
    &self,
    frame: &Frame,
    boxes: &[BoundingBox],
  ) -> Result<(), DirectoryRecordOutputError> {
    if !self.always && boxes.is_empty() {
      return Ok(());
    }
    let now = Local::now();
    let path = self.day_directory(&now)?.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    ));
    frame.image().save(&path)?;
    debug!("保存帧 #{} 到 {}", frame.index(), path.display());
    Ok(())
  }

  fn save_classification(
    &self,
    roi: &Roi,
    result: &ClassificationResult,
  ) -> Result<(), DirectoryRecordOutputError> {
    let now = Local::now();
    let directory = self.day_directory(&now)?;

    let thumbnail = directory.join(format!(
      "{}-{:04X}-roi-{}.png",
      now.format("%H-%M-%S"),
      self.frame_id(),
      result.sequence_id
    ));
    roi.image.save(&thumbnail)?;

    let _guard = self
      .record
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    let mut file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(directory.join(RECORD_FILE))?;
    writeln!(file, "{}", Record::line(roi, result))?;
    Ok(())
  }
}

impl Render for DirectoryRecordOutput {
  fn render_frame(&self, frame: &Frame, boxes: &[BoundingBox]) -> Result<(), OutputError> {
    Ok(self.save_frame(frame, boxes)?)
  }

  fn render_classification(
    &self,
    roi: &Roi,
    result: &ClassificationResult,
  ) -> Result<(), OutputError> {
    Ok(self.save_classification(roi, result)?)
  }
}
