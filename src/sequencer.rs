// 该文件是 Beihu （北湖） 项目的一部分。
// src/sequencer.rs - 分类请求排序与结果配对
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

//! # 分类请求排序
//!
//! 协议没有请求编号，结果只能靠顺序对应回 ROI。`InferenceSequencer`
//! 独占待发送队列，同一时刻最多只有一个请求在途，按 FIFO 顺序逐个
//! 交给传输层，因此结果顺序与提交顺序一致。
//!
//! ```text
//!            submit_batch            ChunkSent(0..2)
//!   Idle ----------------> AwaitingAck(i) ----------> AwaitingAck(i + 1)
//!    ^                         |  ChunkSent(3)
//!    | 队列为空                v
//!    +------------------ AwaitingResult ----> 下一个请求
//!
//!   任何传输错误 -> Faulted（丢弃队列，重新连接后回到 Idle）
//! ```

use std::collections::VecDeque;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  frame::{NormalizedRoi, Roi},
  transport::{CHUNK_COUNT, Classify, TransferProgress},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
  Idle,
  AwaitingAck(usize),
  AwaitingResult,
  Faulted,
}

#[derive(Debug, Clone)]
pub struct ClassificationRequest {
  pub sequence_id: u64,
  pub roi: Roi,
  pub normalized: NormalizedRoi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassificationResult {
  pub sequence_id: u64,
  pub label: u32,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SequencerError {
  #[error("分类服务未连接，丢弃 {rejected} 个请求")]
  Disconnected { rejected: usize },
  #[error("没有等待结果的请求")]
  NothingOutstanding,
}

/// 排序器的事件出口
pub trait SequencerSink {
  fn on_classification_result(&mut self, roi: &Roi, result: ClassificationResult);
  fn on_batch_failure(&mut self, undelivered: usize);
}

pub struct InferenceSequencer<T: Classify, S: SequencerSink> {
  transport: T,
  sink: S,
  state: SequencerState,
  pending: VecDeque<ClassificationRequest>,
  next_sequence_id: u64,
}

impl<T: Classify, S: SequencerSink> InferenceSequencer<T, S> {
  pub fn new(transport: T, sink: S) -> Self {
    Self {
      transport,
      sink,
      state: SequencerState::Idle,
      pending: VecDeque::new(),
      next_sequence_id: 0,
    }
  }

  pub fn state(&self) -> SequencerState {
    self.state
  }

  pub fn pending_len(&self) -> usize {
    self.pending.len()
  }

  pub fn transport(&self) -> &T {
    &self.transport
  }

  pub fn sink(&self) -> &S {
    &self.sink
  }

  pub fn sink_mut(&mut self) -> &mut S {
    &mut self.sink
  }

  /// 追加一批 ROI 并在空闲时开始发送，返回本批分配到的第一个序号
  ///
  /// 在调用者线程上同步跑完整个队列。
  pub fn submit_batch(
    &mut self,
    batch: Vec<(Roi, NormalizedRoi)>,
  ) -> Result<u64, SequencerError> {
    if !self.transport.is_connected() {
      return Err(SequencerError::Disconnected {
        rejected: batch.len(),
      });
    }
    if self.state == SequencerState::Faulted {
      info!("连接已恢复，排序器回到空闲状态");
      self.state = SequencerState::Idle;
    }

    let first = self.next_sequence_id;
    for (roi, normalized) in batch {
      let sequence_id = self.next_sequence_id;
      self.next_sequence_id += 1;
      self.pending.push_back(ClassificationRequest {
        sequence_id,
        roi,
        normalized,
      });
    }
    debug!(
      "提交序号 {}..{}，队列长度 {}",
      first,
      self.next_sequence_id,
      self.pending.len()
    );

    if self.state == SequencerState::Idle {
      self.drain();
    }
    Ok(first)
  }

  /// 传输层完成一次分类后调用，与最早的在途请求配对
  pub fn on_transport_result(&mut self, label: u32) -> Result<(), SequencerError> {
    if !matches!(
      self.state,
      SequencerState::AwaitingAck(_) | SequencerState::AwaitingResult
    ) {
      return Err(SequencerError::NothingOutstanding);
    }
    let request = self
      .pending
      .pop_front()
      .ok_or(SequencerError::NothingOutstanding)?;

    let result = ClassificationResult {
      sequence_id: request.sequence_id,
      label,
    };
    debug!("序号 {} 分类结果 {}", result.sequence_id, label);
    self.sink.on_classification_result(&request.roi, result);

    self.state = if self.pending.is_empty() {
      SequencerState::Idle
    } else {
      SequencerState::AwaitingAck(0)
    };
    Ok(())
  }

  /// 重新连接后调用，清空队列回到空闲状态
  pub fn reset(&mut self) {
    self.pending.clear();
    self.state = SequencerState::Idle;
  }

  /// 丢弃尚未发送的请求，返回丢弃数量
  pub fn discard_pending(&mut self) -> usize {
    let discarded = self.pending.len();
    self.pending.clear();
    if self.state != SequencerState::Faulted {
      self.state = SequencerState::Idle;
    }
    discarded
  }

  fn drain(&mut self) {
    while let Some(request) = self.pending.front() {
      self.state = SequencerState::AwaitingAck(0);

      let state = &mut self.state;
      let outcome = self.transport.classify(&request.normalized, &mut |progress| {
        *state = match progress {
          TransferProgress::ChunkSent(index) if index + 1 >= CHUNK_COUNT => {
            SequencerState::AwaitingResult
          }
          TransferProgress::ChunkSent(index) => SequencerState::AwaitingAck(index),
          TransferProgress::AckReceived(index) => SequencerState::AwaitingAck(index + 1),
        };
      });

      match outcome {
        Ok(label) => {
          if let Err(e) = self.on_transport_result(label) {
            warn!("无法配对分类结果: {}", e);
          }
        }
        Err(e) if e.is_cancelled() => {
          let discarded = self.pending.len();
          self.pending.clear();
          self.transport.close();
          self.state = SequencerState::Faulted;
          info!("分类被取消，丢弃 {} 个请求", discarded);
        }
        Err(e) => {
          let undelivered = self.pending.len();
          self.pending.clear();
          self.transport.close();
          self.state = SequencerState::Faulted;
          warn!("分类失败: {}，本批 {} 个请求未完成", e, undelivered);
          self.sink.on_batch_failure(undelivered);
        }
      }
    }
  }
}
