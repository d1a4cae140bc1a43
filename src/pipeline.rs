// 该文件是 Beihu （北湖） 项目的一部分。
// src/pipeline.rs - 帧处理与分类的线程编排
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

//! # 流水线
//!
//! 两个工作线程：
//!
//! - 帧线程：按设定帧率从帧源取帧，检测、归一化，把标注帧交给输出，
//!   把 ROI 批次交给分类线程；
//! - 分类线程：独占 `InferenceSequencer` 与连接，串行完成网络往返。
//!
//! 控制接口（`start`、`stop`、`set_rate`、`change_source`、`connect`、
//! `disconnect`）只向线程发送命令，不直接触碰它们的状态。

use std::{
  net::TcpStream,
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc::{self, Receiver, RecvTimeoutError, Sender},
  },
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  detector::{DetectorConfig, RegionDetector},
  frame::{Frame, NormalizedRoi, Roi},
  input::{FrameSource, InputError, open_source},
  normalizer::{NormalizerConfig, RoiNormalizer},
  output::{Render, draw::Draw},
  sequencer::{InferenceSequencer, SequencerError},
  transport::{CancelToken, Endpoint, InferenceTransport, TransportConfig, TransportError},
};

const DEFAULT_FPS: u32 = 30;

/// 分类线程忙碌时新批次的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backpressure {
  /// 丢弃新批次，帧本身仍然输出
  #[default]
  Drop,
  /// 排队等待
  Queue,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
  pub fps: u32,
  pub backpressure: Backpressure,
  pub detector: DetectorConfig,
  pub normalizer: NormalizerConfig,
  pub transport: TransportConfig,
  pub draw: Draw,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      fps: DEFAULT_FPS,
      backpressure: Backpressure::default(),
      detector: DetectorConfig::default(),
      normalizer: NormalizerConfig::default(),
      transport: TransportConfig::default(),
      draw: Draw::default(),
    }
  }
}

impl PipelineConfig {
  pub fn with_fps(mut self, fps: u32) -> Self {
    if fps > 0 {
      self.fps = fps;
    }
    self
  }

  pub fn with_backpressure(mut self, backpressure: Backpressure) -> Self {
    self.backpressure = backpressure;
    self
  }

  pub fn with_detector(mut self, detector: DetectorConfig) -> Self {
    self.detector = detector;
    self
  }

  pub fn with_normalizer(mut self, normalizer: NormalizerConfig) -> Self {
    self.normalizer = normalizer;
    self
  }

  pub fn with_transport(mut self, transport: TransportConfig) -> Self {
    self.transport = transport;
    self
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }
}

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("输入错误: {0}")]
  Input(#[from] InputError),
  #[error("传输错误: {0}")]
  Transport(#[from] TransportError),
  #[error("无法启动工作线程: {0}")]
  Spawn(#[source] std::io::Error),
  #[error("工作线程已退出")]
  WorkerGone,
}

/// 运行计数，可在任意线程读取
#[derive(Debug, Default)]
pub struct PipelineStats {
  frames: AtomicU64,
  batches: AtomicU64,
  dropped_batches: AtomicU64,
  rejected_rois: AtomicU64,
  running: AtomicBool,
  connected: AtomicBool,
}

impl PipelineStats {
  /// 已处理的帧数
  pub fn frames(&self) -> u64 {
    self.frames.load(Ordering::Relaxed)
  }

  /// 已交给分类线程的批次数
  pub fn batches(&self) -> u64 {
    self.batches.load(Ordering::Relaxed)
  }

  /// 因分类忙碌而丢弃的批次数
  pub fn dropped_batches(&self) -> u64 {
    self.dropped_batches.load(Ordering::Relaxed)
  }

  /// 连接不可用时被拒绝的区域数
  pub fn rejected_rois(&self) -> u64 {
    self.rejected_rois.load(Ordering::Relaxed)
  }

  pub fn is_running(&self) -> bool {
    self.running.load(Ordering::Acquire)
  }

  pub fn is_connected(&self) -> bool {
    self.connected.load(Ordering::Acquire)
  }
}

type SourceOpener = Box<dyn FnOnce() -> Result<FrameSource, InputError> + Send>;
type Batch = Vec<(Roi, NormalizedRoi)>;

enum FrameCommand {
  Start,
  Stop,
  SetRate(u32),
  ChangeSource(SourceOpener, Sender<Result<(), InputError>>),
  Shutdown,
}

enum InferenceCommand {
  Batch(Batch),
  Start,
  Stop,
  Connect(Endpoint, Sender<Result<(), TransportError>>),
  Disconnect,
  Shutdown,
}

pub struct Pipeline {
  frame_tx: Sender<FrameCommand>,
  inference_tx: Sender<InferenceCommand>,
  cancel: CancelToken,
  stats: Arc<PipelineStats>,
  workers: Vec<JoinHandle<()>>,
}

impl Pipeline {
  /// 创建流水线，线程立即启动但不取帧，直到调用 `start`
  pub fn new(
    config: PipelineConfig,
    source: Option<FrameSource>,
    output: Arc<dyn Render>,
  ) -> Result<Self, PipelineError> {
    let stats = Arc::new(PipelineStats::default());
    let busy = Arc::new(AtomicBool::new(false));
    let (frame_tx, frame_rx) = mpsc::channel();
    let (inference_tx, inference_rx) = mpsc::channel();

    let transport = InferenceTransport::new(None, config.transport.clone());
    let cancel = transport.cancel_token();

    let inference = InferenceWorker {
      sequencer: InferenceSequencer::new(transport, output.clone()),
      endpoint: None,
      cancel: cancel.clone(),
      busy: busy.clone(),
      stats: stats.clone(),
    };
    let frames = FrameWorker {
      source,
      detector: RegionDetector::new(config.detector.clone()).with_draw(config.draw.clone()),
      normalizer: RoiNormalizer::new(config.normalizer.clone()),
      interval: frame_interval(config.fps),
      backpressure: config.backpressure,
      output,
      inference_tx: inference_tx.clone(),
      busy,
      stats: stats.clone(),
    };

    let workers = vec![
      thread::Builder::new()
        .name("beihu-inference".into())
        .spawn(move || inference.run(inference_rx))
        .map_err(PipelineError::Spawn)?,
      thread::Builder::new()
        .name("beihu-frames".into())
        .spawn(move || frames.run(frame_rx))
        .map_err(PipelineError::Spawn)?,
    ];

    Ok(Pipeline {
      frame_tx,
      inference_tx,
      cancel,
      stats,
      workers,
    })
  }

  pub fn stats(&self) -> &PipelineStats {
    &self.stats
  }

  /// 开始取帧；若之前连接过且连接已释放，会重新连接
  pub fn start(&self) -> Result<(), PipelineError> {
    self.stats.running.store(true, Ordering::Release);
    self.send_inference(InferenceCommand::Start)?;
    self.send_frame(FrameCommand::Start)
  }

  /// 停止取帧，中止在途的分类请求，丢弃排队请求并释放连接
  pub fn stop(&self) -> Result<(), PipelineError> {
    self.stats.running.store(false, Ordering::Release);
    self.send_frame(FrameCommand::Stop)?;
    self.cancel.cancel();
    self.send_inference(InferenceCommand::Stop)
  }

  /// 调整取帧速率，0 会被忽略
  pub fn set_rate(&self, fps: u32) -> Result<(), PipelineError> {
    if fps == 0 {
      warn!("忽略无效帧率 {}", fps);
      return Ok(());
    }
    self.send_frame(FrameCommand::SetRate(fps))
  }

  /// 切换到 URL 描述的帧源，旧帧源先释放再打开新帧源
  pub fn change_source(&self, url: &Url) -> Result<(), PipelineError> {
    let url = url.clone();
    self.replace_source(Box::new(move || open_source(&url)))
  }

  /// 切换到已经构造好的帧源
  pub fn set_source(&self, source: FrameSource) -> Result<(), PipelineError> {
    self.replace_source(Box::new(move || Ok(source)))
  }

  fn replace_source(&self, opener: SourceOpener) -> Result<(), PipelineError> {
    let (reply_tx, reply_rx) = mpsc::channel();
    self.send_frame(FrameCommand::ChangeSource(opener, reply_tx))?;
    reply_rx.recv().map_err(|_| PipelineError::WorkerGone)??;
    Ok(())
  }

  pub fn connect(&self, endpoint: &Endpoint) -> Result<(), PipelineError> {
    let (reply_tx, reply_rx) = mpsc::channel();
    self.send_inference(InferenceCommand::Connect(endpoint.clone(), reply_tx))?;
    reply_rx.recv().map_err(|_| PipelineError::WorkerGone)??;
    Ok(())
  }

  pub fn disconnect(&self) -> Result<(), PipelineError> {
    self.cancel.cancel();
    self.send_inference(InferenceCommand::Disconnect)
  }

  fn send_frame(&self, command: FrameCommand) -> Result<(), PipelineError> {
    self
      .frame_tx
      .send(command)
      .map_err(|_| PipelineError::WorkerGone)
  }

  fn send_inference(&self, command: InferenceCommand) -> Result<(), PipelineError> {
    self
      .inference_tx
      .send(command)
      .map_err(|_| PipelineError::WorkerGone)
  }
}

impl Drop for Pipeline {
  fn drop(&mut self) {
    self.cancel.cancel();
    let _ = self.frame_tx.send(FrameCommand::Shutdown);
    let _ = self.inference_tx.send(InferenceCommand::Shutdown);
    for worker in self.workers.drain(..) {
      if worker.join().is_err() {
        error!("工作线程异常退出");
      }
    }
  }
}

fn frame_interval(fps: u32) -> Duration {
  Duration::from_secs_f64(1.0 / fps.max(1) as f64)
}

struct FrameWorker {
  source: Option<FrameSource>,
  detector: RegionDetector,
  normalizer: RoiNormalizer,
  interval: Duration,
  backpressure: Backpressure,
  output: Arc<dyn Render>,
  inference_tx: Sender<InferenceCommand>,
  busy: Arc<AtomicBool>,
  stats: Arc<PipelineStats>,
}

impl FrameWorker {
  fn run(mut self, commands: Receiver<FrameCommand>) {
    let mut next_tick = Instant::now();
    loop {
      let running = self.stats.is_running() && self.source.is_some();
      let command = if running {
        match commands.recv_timeout(next_tick.saturating_duration_since(Instant::now())) {
          Ok(command) => Some(command),
          Err(RecvTimeoutError::Timeout) => None,
          Err(RecvTimeoutError::Disconnected) => break,
        }
      } else {
        match commands.recv() {
          Ok(command) => Some(command),
          Err(_) => break,
        }
      };

      match command {
        Some(FrameCommand::Start) => {
          info!("开始取帧");
          self.stats.running.store(true, Ordering::Release);
          next_tick = Instant::now();
        }
        Some(FrameCommand::Stop) => {
          info!("停止取帧");
          self.stats.running.store(false, Ordering::Release);
        }
        Some(FrameCommand::SetRate(fps)) => {
          info!("帧率调整为 {}", fps);
          self.interval = frame_interval(fps);
        }
        Some(FrameCommand::ChangeSource(opener, reply)) => {
          self.source = None;
          let result = opener().map(|source| {
            self.source = Some(source);
            info!("帧源已切换");
          });
          if let Err(e) = &result {
            error!("打开帧源失败: {}", e);
          }
          let _ = reply.send(result);
          next_tick = Instant::now();
        }
        Some(FrameCommand::Shutdown) => break,
        None => {
          next_tick = (next_tick + self.interval).max(Instant::now());
          if !self.tick() {
            break;
          }
        }
      }
    }
    debug!("帧线程退出");
  }

  /// 处理一帧，分类线程已退出时返回 false
  fn tick(&mut self) -> bool {
    let Some(frame) = self.source.as_mut().and_then(|source| source.next()) else {
      warn!("帧源已结束，停止取帧");
      self.source = None;
      self.stats.running.store(false, Ordering::Release);
      return true;
    };
    self.process(frame)
  }

  fn process(&mut self, frame: Frame) -> bool {
    let detection = self.detector.detect(&frame);
    self.stats.frames.fetch_add(1, Ordering::Relaxed);

    let boxes = detection.boxes();
    if let Err(e) = self.output.render_frame(&detection.annotated, &boxes) {
      error!("输出帧 #{} 失败: {}", frame.index(), e);
    }
    if detection.rois.is_empty() {
      return true;
    }

    if self.backpressure == Backpressure::Drop
      && self
        .busy
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
      self.stats.dropped_batches.fetch_add(1, Ordering::Relaxed);
      debug!("分类忙碌，丢弃帧 #{} 的 {} 个区域", frame.index(), detection.rois.len());
      return true;
    }

    let normalized = self.normalizer.normalize_all(&detection.rois);
    let batch = detection.rois.into_iter().zip(normalized).collect();
    self.stats.batches.fetch_add(1, Ordering::Relaxed);
    self.inference_tx.send(InferenceCommand::Batch(batch)).is_ok()
  }
}

struct InferenceWorker {
  sequencer: InferenceSequencer<InferenceTransport<TcpStream>, Arc<dyn Render>>,
  endpoint: Option<Endpoint>,
  cancel: CancelToken,
  busy: Arc<AtomicBool>,
  stats: Arc<PipelineStats>,
}

impl InferenceWorker {
  fn run(mut self, commands: Receiver<InferenceCommand>) {
    while let Ok(command) = commands.recv() {
      match command {
        InferenceCommand::Batch(batch) => {
          match self.sequencer.submit_batch(batch) {
            Ok(_) => {}
            Err(SequencerError::Disconnected { rejected }) => {
              self.stats.rejected_rois.fetch_add(rejected as u64, Ordering::Relaxed);
              warn!("分类服务未连接，丢弃 {} 个区域", rejected);
            }
            Err(e) => warn!("{}", e),
          }
          self.busy.store(false, Ordering::Release);
        }
        InferenceCommand::Start => {
          if let Some(endpoint) = self.endpoint.clone() {
            if !self.sequencer.transport().is_connected() {
              if let Err(e) = self.open(&endpoint) {
                error!("重新连接 {} 失败: {}", endpoint, e);
              }
            }
          }
        }
        InferenceCommand::Stop => self.release(),
        InferenceCommand::Connect(endpoint, reply) => {
          let result = self.open(&endpoint);
          if result.is_ok() {
            self.endpoint = Some(endpoint);
          }
          self.publish();
          let _ = reply.send(result);
        }
        InferenceCommand::Disconnect => {
          self.endpoint = None;
          self.release();
        }
        InferenceCommand::Shutdown => break,
      }
      self.publish();
    }
    self.sequencer.transport().close();
    debug!("分类线程退出");
  }

  fn publish(&self) {
    self
      .stats
      .connected
      .store(self.sequencer.transport().is_connected(), Ordering::Release);
  }

  fn open(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
    self.sequencer.transport().open(endpoint)?;
    self.sequencer.reset();
    Ok(())
  }

  fn release(&mut self) {
    let discarded = self.sequencer.discard_pending();
    if discarded > 0 {
      info!("丢弃 {} 个未发送的请求", discarded);
    }
    self.sequencer.transport().close();
    self.cancel.reset();
    self.busy.store(false, Ordering::Release);
  }
}
