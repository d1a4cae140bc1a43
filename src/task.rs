// 该文件是 Beihu （北湖） 项目的一部分。
// src/task.rs - 命令行任务
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

use std::{
  sync::mpsc::{self, RecvTimeoutError},
  thread,
  time::Duration,
};

use tracing::{info, warn};

use crate::pipeline::Pipeline;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub trait Task: Sized {
  type Error;
  fn run_task(self, pipeline: &Pipeline) -> Result<(), Self::Error>;
}

/// 持续运行流水线，直到收到 Ctrl-C 或处理完指定帧数
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<u64>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<u64>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

impl Task for ContinuousTask {
  type Error = anyhow::Error;

  fn run_task(self, pipeline: &Pipeline) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;

    pipeline.start()?;
    loop {
      match rx.recv_timeout(POLL_INTERVAL) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
          warn!("中断信号接收，退出任务循环");
          break;
        }
        Err(RecvTimeoutError::Timeout) => {}
      }

      let frames = pipeline.stats().frames();
      if self.frame_number.map(|n| frames >= n).unwrap_or(false) {
        info!("达到指定帧数 {}，退出任务循环", frames);
        break;
      }
      if !pipeline.stats().is_running() {
        warn!("流水线已停止，退出任务循环");
        break;
      }
    }

    pipeline.stop()?;
    let stats = pipeline.stats();
    info!(
      "任务完成: 处理 {} 帧，提交 {} 批，丢弃 {} 批，拒绝 {} 个区域",
      stats.frames(),
      stats.batches(),
      stats.dropped_batches(),
      stats.rejected_rois()
    );
    Ok(())
  }
}
