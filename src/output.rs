// 该文件是 Beihu （北湖） 项目的一部分。
// src/output.rs - 结果输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl,
  frame::{BoundingBox, Frame, Roi},
  sequencer::{ClassificationResult, SequencerSink},
};

pub mod draw;

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

/// 展示端接口，三个事件分别来自帧处理线程与分类线程
pub trait Render: Send + Sync {
  /// 每一帧都会调用，`boxes` 为空表示本帧没有检测到区域
  fn render_frame(&self, _frame: &Frame, _boxes: &[BoundingBox]) -> Result<(), OutputError> {
    Ok(())
  }

  fn render_classification(
    &self,
    _roi: &Roi,
    _result: &ClassificationResult,
  ) -> Result<(), OutputError> {
    Ok(())
  }

  /// 一批请求因传输错误中止，`undelivered` 为未拿到结果的数量
  fn render_failure(&self, _undelivered: usize) -> Result<(), OutputError> {
    Ok(())
  }
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "directory_record")]
      <DirectoryRecordOutput as crate::FromUrlWithScheme>::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render for OutputWrapper {
  fn render_frame(&self, frame: &Frame, boxes: &[BoundingBox]) -> Result<(), OutputError> {
    match self {
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output.render_frame(frame, boxes),
      #[cfg(not(feature = "directory_record"))]
      _ => {
        let _ = (frame, boxes);
        Ok(())
      }
    }
  }

  fn render_classification(
    &self,
    roi: &Roi,
    result: &ClassificationResult,
  ) -> Result<(), OutputError> {
    match self {
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output.render_classification(roi, result),
      #[cfg(not(feature = "directory_record"))]
      _ => {
        let _ = (roi, result);
        Ok(())
      }
    }
  }

  fn render_failure(&self, undelivered: usize) -> Result<(), OutputError> {
    match self {
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output.render_failure(undelivered),
      #[cfg(not(feature = "directory_record"))]
      _ => {
        let _ = undelivered;
        Ok(())
      }
    }
  }
}

/// 把事件写进日志
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOutput;

impl Render for LogOutput {
  fn render_classification(
    &self,
    roi: &Roi,
    result: &ClassificationResult,
  ) -> Result<(), OutputError> {
    let bbox = roi.bbox;
    info!(
      "#{} 识别结果: {} @ ({}, {})-({}, {})",
      result.sequence_id, result.label, bbox.x1, bbox.y1, bbox.x2, bbox.y2
    );
    Ok(())
  }

  fn render_failure(&self, undelivered: usize) -> Result<(), OutputError> {
    warn!("本批分类失败，{} 个区域没有结果", undelivered);
    Ok(())
  }
}

/// 依次转发给多个输出，单个输出出错不影响其它输出
#[derive(Default, Clone)]
pub struct Fanout {
  outputs: Vec<Arc<dyn Render>>,
}

impl Fanout {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, output: Arc<dyn Render>) -> Self {
    self.outputs.push(output);
    self
  }

  pub fn len(&self) -> usize {
    self.outputs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.outputs.is_empty()
  }
}

impl Render for Fanout {
  fn render_frame(&self, frame: &Frame, boxes: &[BoundingBox]) -> Result<(), OutputError> {
    for output in &self.outputs {
      if let Err(e) = output.render_frame(frame, boxes) {
        error!("输出帧失败: {}", e);
      }
    }
    Ok(())
  }

  fn render_classification(
    &self,
    roi: &Roi,
    result: &ClassificationResult,
  ) -> Result<(), OutputError> {
    for output in &self.outputs {
      if let Err(e) = output.render_classification(roi, result) {
        error!("输出识别结果失败: {}", e);
      }
    }
    Ok(())
  }

  fn render_failure(&self, undelivered: usize) -> Result<(), OutputError> {
    for output in &self.outputs {
      if let Err(e) = output.render_failure(undelivered) {
        error!("输出失败通知失败: {}", e);
      }
    }
    Ok(())
  }
}

impl SequencerSink for Arc<dyn Render> {
  fn on_classification_result(&mut self, roi: &Roi, result: ClassificationResult) {
    if let Err(e) = self.render_classification(roi, &result) {
      error!("输出识别结果失败: {}", e);
    }
  }

  fn on_batch_failure(&mut self, undelivered: usize) {
    if let Err(e) = self.render_failure(undelivered) {
      error!("输出失败通知失败: {}", e);
    }
  }
}
