// 该文件是 Beihu （北湖） 项目的一部分。
// src/transport.rs - 分类请求传输
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

//! # 分类请求传输
//!
//! 每次分类在一条已建立的 TCP 连接上完成：
//!
//! ```text
//! client                         server
//!   | -- chunk 0 (1024 B) -------> |
//!   | <------------------ ack ---- |
//!   | -- chunk 1 (1024 B) -------> |
//!   | <------------------ ack ---- |
//!   | -- chunk 2 (1024 B) -------> |
//!   | <------------------ ack ---- |
//!   | -- chunk 3 (1024 B) -------> |
//!   | <------ label (u32 LE) ----- |
//! ```
//!
//! 协议没有长度前缀也没有消息编号，边界完全靠位置确定。
//! 任何一步出错都会关闭连接，之后必须重新连接。

use std::{
  fmt,
  io::{self, Read, Write},
  net::{Shutdown, SocketAddr, TcpStream},
  sync::{
    Arc, Mutex, TryLockError,
    atomic::{AtomicBool, Ordering},
  },
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::NormalizedRoi};

pub const CHUNK_SIZE: usize = 1024;
pub const CHUNK_COUNT: usize = 4;
pub const PAYLOAD_SIZE: usize = CHUNK_SIZE * CHUNK_COUNT;
pub const LABEL_SIZE: usize = 4;

const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_ACK_SIZE: usize = 1;

/// 协议所处的阶段，用于定位错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolStage {
  ChunkSend(usize),
  AckWait(usize),
  ResultWait,
}

impl fmt::Display for ProtocolStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ProtocolStage::ChunkSend(index) => write!(f, "发送第 {} 块", index),
      ProtocolStage::AckWait(index) => write!(f, "等待第 {} 块确认", index),
      ProtocolStage::ResultWait => write!(f, "等待分类结果"),
    }
  }
}

/// 单次分类的进度，供调用方跟踪状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferProgress {
  ChunkSent(usize),
  AckReceived(usize),
}

#[derive(Error, Debug)]
pub enum TransportError {
  #[error("连接 {addr} 失败: {source}")]
  Connect {
    addr: String,
    #[source]
    source: io::Error,
  },
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("地址无效: {0}")]
  InvalidAddress(String),
  #[error("尚未建立连接")]
  NotConnected,
  #[error("已有分类请求正在进行")]
  Busy,
  #[error("载荷长度错误: 期望 {expected} 字节, 实际 {actual} 字节")]
  PayloadSize { expected: usize, actual: usize },
  #[error("{stage}时 I/O 错误: {source}")]
  Io {
    stage: ProtocolStage,
    #[source]
    source: io::Error,
  },
  #[error("分类结果不完整: 只收到 {received} 字节")]
  ShortResult { received: usize },
  #[error("{stage}时被取消")]
  Cancelled { stage: ProtocolStage },
}

impl TransportError {
  pub fn is_cancelled(&self) -> bool {
    matches!(self, TransportError::Cancelled { .. })
  }
}

/// 协作式取消信号
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn reset(&self) {
    self.0.store(false, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
  /// 单次读写等待的最长时间
  pub io_timeout: Duration,
  /// 阻塞读写的轮询间隔，决定取消信号的响应速度
  pub poll_interval: Duration,
  /// 确认包的固定长度
  pub ack_size: usize,
}

impl Default for TransportConfig {
  fn default() -> Self {
    Self {
      io_timeout: DEFAULT_IO_TIMEOUT,
      poll_interval: DEFAULT_POLL_INTERVAL,
      ack_size: DEFAULT_ACK_SIZE,
    }
  }
}

impl TransportConfig {
  pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
    self.io_timeout = timeout;
    self
  }

  pub fn with_poll_interval(mut self, interval: Duration) -> Self {
    self.poll_interval = interval;
    self
  }
}

/// 分类服务地址，`tcp://host:port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
  host: String,
  port: u16,
}

impl Endpoint {
  pub fn new(host: impl Into<String>, port: u16) -> Self {
    Self {
      host: host.into(),
      port,
    }
  }

  pub fn socket_addrs(&self) -> Result<Vec<SocketAddr>, TransportError> {
    use std::net::ToSocketAddrs;
    (self.host.as_str(), self.port)
      .to_socket_addrs()
      .map(|addrs| addrs.collect())
      .map_err(|e| TransportError::InvalidAddress(format!("{}: {}", self, e)))
  }
}

impl fmt::Display for Endpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.host, self.port)
  }
}

impl From<SocketAddr> for Endpoint {
  fn from(addr: SocketAddr) -> Self {
    Endpoint::new(addr.ip().to_string(), addr.port())
  }
}

impl FromUrlWithScheme for Endpoint {
  const SCHEME: &'static str = "tcp";
}

impl FromUrl for Endpoint {
  type Error = TransportError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(TransportError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }
    let host = url
      .host_str()
      .ok_or_else(|| TransportError::InvalidAddress(url.to_string()))?;
    let port = url
      .port()
      .ok_or_else(|| TransportError::InvalidAddress(format!("{} 缺少端口", url)))?;
    Ok(Endpoint::new(host.trim_matches(['[', ']']), port))
  }
}

/// 传输层独占的连接
pub trait Connection: Read + Write + Send {
  /// 关闭连接的两个方向
  fn shutdown(&mut self) -> io::Result<()>;
}

impl Connection for TcpStream {
  fn shutdown(&mut self) -> io::Result<()> {
    TcpStream::shutdown(self, Shutdown::Both)
  }
}

/// 一次只处理一个 ROI 的分类接口
pub trait Classify {
  fn classify(
    &self,
    roi: &NormalizedRoi,
    progress: &mut dyn FnMut(TransferProgress),
  ) -> Result<u32, TransportError>;

  fn is_connected(&self) -> bool;

  fn close(&self);
}

pub struct InferenceTransport<C: Connection = TcpStream> {
  connection: Mutex<Option<C>>,
  config: TransportConfig,
  cancel: CancelToken,
}

impl<C: Connection> InferenceTransport<C> {
  pub fn new(connection: Option<C>, config: TransportConfig) -> Self {
    Self {
      connection: Mutex::new(connection),
      config,
      cancel: CancelToken::default(),
    }
  }

  pub fn config(&self) -> &TransportConfig {
    &self.config
  }

  pub fn cancel_token(&self) -> CancelToken {
    self.cancel.clone()
  }

  /// 换上新的连接，旧连接直接关闭
  pub fn attach(&self, connection: C) {
    let mut guard = self.lock();
    if let Some(mut old) = guard.replace(connection) {
      let _ = old.shutdown();
    }
    self.cancel.reset();
  }

  pub fn close(&self) {
    if let Some(mut connection) = self.lock().take() {
      if let Err(e) = connection.shutdown() {
        debug!("关闭连接时出错: {}", e);
      }
      info!("连接已关闭");
    }
  }

  pub fn is_connected(&self) -> bool {
    self.lock().is_some()
  }

  /// 发送一份完整的 4096 字节载荷，返回分类标签
  pub fn send_payload(
    &self,
    payload: &[u8],
    progress: &mut dyn FnMut(TransferProgress),
  ) -> Result<u32, TransportError> {
    if payload.len() != PAYLOAD_SIZE {
      return Err(TransportError::PayloadSize {
        expected: PAYLOAD_SIZE,
        actual: payload.len(),
      });
    }

    let mut guard = match self.connection.try_lock() {
      Ok(guard) => guard,
      Err(TryLockError::WouldBlock) => return Err(TransportError::Busy),
      Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
    };
    let connection = guard.as_mut().ok_or(TransportError::NotConnected)?;

    let result = Exchange {
      connection,
      config: &self.config,
      cancel: &self.cancel,
    }
    .run(payload, progress);

    if let Err(e) = &result {
      warn!("分类请求失败，关闭连接: {}", e);
      if let Some(mut connection) = guard.take() {
        let _ = connection.shutdown();
      }
    }
    result
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Option<C>> {
    self
      .connection
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

impl InferenceTransport<TcpStream> {
  /// 建立到分类服务的连接
  pub fn open(&self, endpoint: &Endpoint) -> Result<(), TransportError> {
    let stream = connect(endpoint, &self.config)?;
    self.attach(stream);
    info!("已连接到分类服务 {}", endpoint);
    Ok(())
  }
}

impl<C: Connection> Classify for InferenceTransport<C> {
  fn classify(
    &self,
    roi: &NormalizedRoi,
    progress: &mut dyn FnMut(TransferProgress),
  ) -> Result<u32, TransportError> {
    self.send_payload(roi.as_ref(), progress)
  }

  fn is_connected(&self) -> bool {
    InferenceTransport::is_connected(self)
  }

  fn close(&self) {
    InferenceTransport::close(self)
  }
}

impl<C: Connection> Drop for InferenceTransport<C> {
  fn drop(&mut self) {
    self.close();
  }
}

fn connect(endpoint: &Endpoint, config: &TransportConfig) -> Result<TcpStream, TransportError> {
  let mut last_error = None;
  for addr in endpoint.socket_addrs()? {
    match TcpStream::connect_timeout(&addr, config.io_timeout) {
      Ok(stream) => {
        let setup = stream
          .set_read_timeout(Some(config.poll_interval))
          .and_then(|_| stream.set_write_timeout(Some(config.poll_interval)))
          .and_then(|_| stream.set_nodelay(true));
        return match setup {
          Ok(()) => Ok(stream),
          Err(source) => Err(TransportError::Connect {
            addr: endpoint.to_string(),
            source,
          }),
        };
      }
      Err(e) => {
        debug!("连接 {} 失败: {}", addr, e);
        last_error = Some(e);
      }
    }
  }

  Err(TransportError::Connect {
    addr: endpoint.to_string(),
    source: last_error
      .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "没有可用的地址")),
  })
}

/// 一次完整的分块发送与应答读取
struct Exchange<'a, C: Connection> {
  connection: &'a mut C,
  config: &'a TransportConfig,
  cancel: &'a CancelToken,
}

impl<C: Connection> Exchange<'_, C> {
  fn run(
    mut self,
    payload: &[u8],
    progress: &mut dyn FnMut(TransferProgress),
  ) -> Result<u32, TransportError> {
    let mut ack = vec![0u8; self.config.ack_size];

    for (index, chunk) in payload.chunks_exact(CHUNK_SIZE).enumerate() {
      self.write_all(chunk, ProtocolStage::ChunkSend(index))?;
      debug!("已发送第 {}/{} 块", index + 1, CHUNK_COUNT);
      progress(TransferProgress::ChunkSent(index));

      if index + 1 < CHUNK_COUNT {
        let stage = ProtocolStage::AckWait(index);
        let received = self.read_full(&mut ack, stage)?;
        if received < ack.len() {
          return Err(TransportError::Io {
            stage,
            source: io::ErrorKind::UnexpectedEof.into(),
          });
        }
        debug!("收到第 {} 块确认: {:?}", index + 1, ack);
        progress(TransferProgress::AckReceived(index));
      }
    }

    let mut label = [0u8; LABEL_SIZE];
    let received = self.read_full(&mut label, ProtocolStage::ResultWait)?;
    match received {
      0 => Err(TransportError::Io {
        stage: ProtocolStage::ResultWait,
        source: io::ErrorKind::UnexpectedEof.into(),
      }),
      LABEL_SIZE => {
        let label = u32::from_le_bytes(label);
        debug!("分类结果: {}", label);
        Ok(label)
      }
      received => Err(TransportError::ShortResult { received }),
    }
  }

  /// 超时只代表本次轮询没有进展，真正的期限由 `io_timeout` 决定
  fn check_wait(&self, stage: ProtocolStage, since: Instant) -> Result<(), TransportError> {
    if self.cancel.is_cancelled() {
      return Err(TransportError::Cancelled { stage });
    }
    if since.elapsed() >= self.config.io_timeout {
      return Err(TransportError::Io {
        stage,
        source: io::ErrorKind::TimedOut.into(),
      });
    }
    Ok(())
  }

  fn write_all(&mut self, mut buf: &[u8], stage: ProtocolStage) -> Result<(), TransportError> {
    let mut since = Instant::now();
    self.check_wait(stage, since)?;
    while !buf.is_empty() {
      match self.connection.write(buf) {
        Ok(0) => {
          return Err(TransportError::Io {
            stage,
            source: io::ErrorKind::WriteZero.into(),
          });
        }
        Ok(n) => {
          buf = &buf[n..];
          since = Instant::now();
        }
        Err(e) if is_retryable(&e) => self.check_wait(stage, since)?,
        Err(source) => return Err(TransportError::Io { stage, source }),
      }
    }
    self
      .connection
      .flush()
      .map_err(|source| TransportError::Io { stage, source })
  }

  /// 读满 `buf` 或遇到 EOF，返回实际读到的字节数
  fn read_full(&mut self, buf: &mut [u8], stage: ProtocolStage) -> Result<usize, TransportError> {
    let mut filled = 0;
    let mut since = Instant::now();
    while filled < buf.len() {
      match self.connection.read(&mut buf[filled..]) {
        Ok(0) => break,
        Ok(n) => {
          filled += n;
          since = Instant::now();
        }
        Err(e) if is_retryable(&e) => self.check_wait(stage, since)?,
        Err(source) => return Err(TransportError::Io { stage, source }),
      }
    }
    Ok(filled)
  }
}

fn is_retryable(e: &io::Error) -> bool {
  matches!(
    e.kind(),
    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{GrayImage, Luma};
  use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};

  /// 内存中的对端：读取脚本化的回复，记录写入的数据
  struct ScriptedPeer {
    replies: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    written: Arc<Mutex<Vec<u8>>>,
    fail_write_after: Option<usize>,
    shut: Arc<AtomicBool>,
  }

  struct PeerHandle {
    pub replies: Sender<Vec<u8>>,
    pub written: Arc<Mutex<Vec<u8>>>,
    pub shut: Arc<AtomicBool>,
  }

  impl PeerHandle {
    pub fn written_len(&self) -> usize {
      self.written.lock().unwrap().len()
    }
  }

  fn scripted_peer() -> (ScriptedPeer, PeerHandle) {
    let (tx, rx) = mpsc::channel();
    let written = Arc::new(Mutex::new(Vec::new()));
    let shut = Arc::new(AtomicBool::new(false));
    (
      ScriptedPeer {
        replies: rx,
        pending: Vec::new(),
        written: written.clone(),
        fail_write_after: None,
        shut: shut.clone(),
      },
      PeerHandle {
        replies: tx,
        written,
        shut,
      },
    )
  }

  impl Read for ScriptedPeer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
      if self.pending.is_empty() {
        match self.replies.recv_timeout(Duration::from_millis(5)) {
          Ok(data) => self.pending = data,
          Err(RecvTimeoutError::Timeout) => return Err(io::ErrorKind::WouldBlock.into()),
          Err(RecvTimeoutError::Disconnected) => return Ok(0),
        }
      }
      let n = buf.len().min(self.pending.len());
      buf[..n].copy_from_slice(&self.pending[..n]);
      self.pending.drain(..n);
      Ok(n)
    }
  }

  impl Write for ScriptedPeer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
      let mut written = self.written.lock().unwrap();
      if let Some(limit) = self.fail_write_after
        && written.len() + buf.len() > limit
      {
        return Err(io::ErrorKind::BrokenPipe.into());
      }
      written.extend_from_slice(buf);
      Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
      Ok(())
    }
  }

  impl Connection for ScriptedPeer {
    fn shutdown(&mut self) -> io::Result<()> {
      self.shut.store(true, Ordering::SeqCst);
      Ok(())
    }
  }

  fn payload_roi() -> NormalizedRoi {
    let image = GrayImage::from_fn(32, 32, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]));
    NormalizedRoi::new(image, 1)
  }

  fn transport(peer: ScriptedPeer) -> InferenceTransport<ScriptedPeer> {
    let config = TransportConfig::default()
      .with_io_timeout(Duration::from_millis(300))
      .with_poll_interval(Duration::from_millis(5));
    InferenceTransport::new(Some(peer), config)
  }

  fn full_reply(handle: &PeerHandle, label: [u8; 4]) {
    for _ in 0..3 {
      handle.replies.send(vec![0x01]).unwrap();
    }
    handle.replies.send(label.to_vec()).unwrap();
  }

  #[test]
  fn classify_returns_little_endian_label() {
    let (peer, handle) = scripted_peer();
    let transport = transport(peer);
    full_reply(&handle, [0x07, 0x00, 0x00, 0x00]);

    let roi = payload_roi();
    let mut events = Vec::new();
    let label = transport.classify(&roi, &mut |p| events.push(p)).unwrap();

    assert_eq!(label, 7);
    assert_eq!(*handle.written.lock().unwrap(), roi.as_ref().to_vec());
    assert_eq!(
      events,
      vec![
        TransferProgress::ChunkSent(0),
        TransferProgress::AckReceived(0),
        TransferProgress::ChunkSent(1),
        TransferProgress::AckReceived(1),
        TransferProgress::ChunkSent(2),
        TransferProgress::AckReceived(2),
        TransferProgress::ChunkSent(3),
      ]
    );
    assert!(transport.is_connected());
  }

  #[test]
  fn chunks_wait_for_ack() {
    let (peer, handle) = scripted_peer();
    let transport = transport(peer);

    std::thread::scope(|s| {
      let worker = s.spawn(|| transport.send_payload(payload_roi().as_ref(), &mut |_| {}));
      std::thread::sleep(Duration::from_millis(50));
      assert_eq!(handle.written_len(), CHUNK_SIZE);
      full_reply(&handle, [1, 0, 0, 0]);
      assert_eq!(worker.join().unwrap().unwrap(), 1);
    });
    assert_eq!(handle.written_len(), PAYLOAD_SIZE);
  }

  #[test]
  fn wrong_payload_is_rejected_before_sending() {
    let (peer, handle) = scripted_peer();
    let transport = transport(peer);

    let err = transport.send_payload(&[0u8; PAYLOAD_SIZE - 1], &mut |_| {}).unwrap_err();
    assert!(matches!(err, TransportError::PayloadSize { expected: 4096, actual: 4095 }));

    let wide = NormalizedRoi::new(GrayImage::new(32, 32), 3);
    let err = transport.classify(&wide, &mut |_| {}).unwrap_err();
    assert!(matches!(err, TransportError::PayloadSize { actual: 12288, .. }));

    assert_eq!(handle.written_len(), 0);
    assert!(transport.is_connected());
  }

  #[test]
  fn peer_closing_during_ack_reports_stage() {
    let (peer, handle) = scripted_peer();
    let transport = transport(peer);
    handle.replies.send(vec![0x01]).unwrap();
    let PeerHandle { replies, shut, .. } = handle;
    drop(replies);

    let err = transport.classify(&payload_roi(), &mut |_| {}).unwrap_err();
    assert!(
      matches!(err, TransportError::Io { stage: ProtocolStage::AckWait(1), .. }),
      "{err:?}"
    );
    assert!(!transport.is_connected());
    assert!(shut.load(Ordering::SeqCst));
  }

  #[test]
  fn short_result_is_protocol_error() {
    let (peer, handle) = scripted_peer();
    let transport = transport(peer);
    for _ in 0..3 {
      handle.replies.send(vec![0x01]).unwrap();
    }
    handle.replies.send(vec![0x07, 0x00]).unwrap();
    drop(handle.replies);

    let err = transport.classify(&payload_roi(), &mut |_| {}).unwrap_err();
    assert!(matches!(err, TransportError::ShortResult { received: 2 }), "{err:?}");
    assert!(!transport.is_connected());
  }

  #[test]
  fn write_failure_reports_chunk() {
    let (mut peer, handle) = scripted_peer();
    peer.fail_write_after = Some(2 * CHUNK_SIZE);
    let transport = transport(peer);
    full_reply(&handle, [0, 0, 0, 0]);

    let err = transport.classify(&payload_roi(), &mut |_| {}).unwrap_err();
    assert!(
      matches!(err, TransportError::Io { stage: ProtocolStage::ChunkSend(2), .. }),
      "{err:?}"
    );
    assert!(!transport.is_connected());
  }

  #[test]
  fn silent_peer_times_out() {
    let (peer, handle) = scripted_peer();
    let transport = transport(peer);

    let err = transport.classify(&payload_roi(), &mut |_| {}).unwrap_err();
    assert!(
      matches!(err, TransportError::Io { stage: ProtocolStage::AckWait(0), ref source } if source.kind() == io::ErrorKind::TimedOut),
      "{err:?}"
    );
    drop(handle);
  }

  #[test]
  fn second_call_while_busy_is_rejected() {
    let (peer, handle) = scripted_peer();
    let transport = transport(peer);
    let roi = payload_roi();

    std::thread::scope(|s| {
      let worker = s.spawn(|| transport.classify(&roi, &mut |_| {}));
      while handle.written_len() < CHUNK_SIZE {
        std::thread::sleep(Duration::from_millis(1));
      }
      let err = transport.classify(&roi, &mut |_| {}).unwrap_err();
      assert!(matches!(err, TransportError::Busy));

      full_reply(&handle, [3, 0, 0, 0]);
      assert_eq!(worker.join().unwrap().unwrap(), 3);
    });
  }

  #[test]
  fn cancel_aborts_blocked_read() {
    let (peer, handle) = scripted_peer();
    let transport = transport(peer);
    let token = transport.cancel_token();

    std::thread::scope(|s| {
      let worker = s.spawn(|| transport.classify(&payload_roi(), &mut |_| {}));
      while handle.written_len() < CHUNK_SIZE {
        std::thread::sleep(Duration::from_millis(1));
      }
      token.cancel();
      let err = worker.join().unwrap().unwrap_err();
      assert!(err.is_cancelled(), "{err:?}");
    });
    assert!(!transport.is_connected());
    assert!(handle.shut.load(Ordering::SeqCst));
  }

  #[test]
  fn not_connected_is_reported() {
    let transport = InferenceTransport::<ScriptedPeer>::new(None, TransportConfig::default());
    let err = transport.classify(&payload_roi(), &mut |_| {}).unwrap_err();
    assert!(matches!(err, TransportError::NotConnected));
  }

  #[test]
  fn endpoint_from_url() {
    let endpoint = Endpoint::from_url(&Url::parse("tcp://127.0.0.1:7").unwrap()).unwrap();
    assert_eq!(endpoint, Endpoint::new("127.0.0.1", 7));
    assert!(Endpoint::from_url(&Url::parse("udp://127.0.0.1:7").unwrap()).is_err());
    assert!(Endpoint::from_url(&Url::parse("tcp://127.0.0.1").unwrap()).is_err());
  }
}
