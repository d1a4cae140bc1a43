// 该文件是 Beihu （北湖） 项目的一部分。
// src/server.rs - 模拟分类服务
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

//! 协议对端的最小实现，用于联调与测试。
//!
//! 每次分类接收 4 × 1024 字节，前三块各回一个字节 `0x01`，
//! 第四块之后回 4 字节小端标签。客户端断开后回到监听状态。

use std::{
  io::{self, ErrorKind, Read, Write},
  net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
  str::FromStr,
};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::transport::{CHUNK_COUNT, CHUNK_SIZE, PAYLOAD_SIZE};

const ACK: u8 = 0x01;

#[derive(Error, Debug)]
pub enum ServerError {
  #[error("无法监听 {addr}: {source}")]
  Bind {
    addr: String,
    #[source]
    source: io::Error,
  },
  #[error("I/O 错误: {0}")]
  Io(#[from] io::Error),
  #[error("无效的标签模式 '{0}'，可选 constant:N 或 counter")]
  InvalidLabelMode(String),
}

/// 根据收到的载荷给出标签
pub type Labeller = Box<dyn FnMut(&[u8]) -> u32 + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelMode {
  /// 总是返回同一个标签
  Constant(u32),
  /// 依次返回 0, 1, 2, ...，每个连接重新计数
  Counter,
}

impl Default for LabelMode {
  fn default() -> Self {
    LabelMode::Constant(0)
  }
}

impl FromStr for LabelMode {
  type Err = ServerError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.split_once(':') {
      Some(("constant", n)) => n
        .trim()
        .parse()
        .map(LabelMode::Constant)
        .map_err(|_| ServerError::InvalidLabelMode(s.to_string())),
      None if s == "counter" => Ok(LabelMode::Counter),
      None if s == "constant" => Ok(LabelMode::Constant(0)),
      _ => Err(ServerError::InvalidLabelMode(s.to_string())),
    }
  }
}

impl LabelMode {
  pub fn labeller(self) -> Labeller {
    match self {
      LabelMode::Constant(label) => Box::new(move |_: &[u8]| label),
      LabelMode::Counter => {
        let mut next = 0u32;
        Box::new(move |_: &[u8]| {
          let label = next;
          next = next.wrapping_add(1);
          label
        })
      }
    }
  }
}

pub struct MockServer {
  listener: TcpListener,
  mode: LabelMode,
  drop_after: Option<usize>,
}

impl MockServer {
  pub fn bind(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Self, ServerError> {
    let listener = TcpListener::bind(&addr).map_err(|source| ServerError::Bind {
      addr: format!("{:?}", addr),
      source,
    })?;
    info!("模拟分类服务监听 {}", listener.local_addr()?);
    Ok(MockServer {
      listener,
      mode: LabelMode::default(),
      drop_after: None,
    })
  }

  pub fn with_mode(mut self, mode: LabelMode) -> Self {
    self.mode = mode;
    self
  }

  /// 每个连接完成 `n` 次分类后主动断开，用于模拟对端故障
  pub fn with_drop_after(mut self, n: usize) -> Self {
    self.drop_after = Some(n);
    self
  }

  pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
    Ok(self.listener.local_addr()?)
  }

  /// 接受一个客户端并服务到它断开，返回完成的分类次数
  pub fn serve_one(&self) -> Result<usize, ServerError> {
    let (stream, peer) = self.listener.accept()?;
    info!("客户端 {} 已连接", peer);
    let served = self.serve_connection(stream, self.mode.labeller())?;
    info!("客户端 {} 断开，共完成 {} 次分类", peer, served);
    Ok(served)
  }

  /// 一直服务下去，单个连接的错误只记录日志
  pub fn run(&self) -> Result<(), ServerError> {
    loop {
      if let Err(e) = self.serve_one() {
        error!("服务错误: {}，等待下一个连接", e);
      }
    }
  }

  fn serve_connection(
    &self,
    mut stream: TcpStream,
    mut labeller: Labeller,
  ) -> Result<usize, ServerError> {
    stream.set_nodelay(true)?;
    let mut payload = [0u8; PAYLOAD_SIZE];
    let mut served = 0;

    loop {
      if self.drop_after == Some(served) {
        warn!("已完成 {} 次分类，主动断开", served);
        return Ok(served);
      }

      for (index, chunk) in payload.chunks_exact_mut(CHUNK_SIZE).enumerate() {
        match stream.read_exact(chunk) {
          Ok(()) => {}
          Err(e) if client_gone(&e) => {
            if index > 0 {
              warn!("客户端在第 {} 块时断开", index);
            }
            return Ok(served);
          }
          Err(e) => return Err(e.into()),
        }
        debug!("收到第 {}/{} 块", index + 1, CHUNK_COUNT);

        if index + 1 < CHUNK_COUNT {
          if let Err(e) = stream.write_all(&[ACK]) {
            return if client_gone(&e) { Ok(served) } else { Err(e.into()) };
          }
        }
      }

      let label = labeller(&payload);
      if let Err(e) = stream.write_all(&label.to_le_bytes()) {
        return if client_gone(&e) { Ok(served) } else { Err(e.into()) };
      }
      debug!("返回标签 {}", label);
      served += 1;
    }
  }
}

fn client_gone(e: &io::Error) -> bool {
  matches!(
    e.kind(),
    ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn label_mode_parses() {
    assert_eq!("counter".parse::<LabelMode>().unwrap(), LabelMode::Counter);
    assert_eq!("constant:7".parse::<LabelMode>().unwrap(), LabelMode::Constant(7));
    assert_eq!("constant".parse::<LabelMode>().unwrap(), LabelMode::Constant(0));
    assert!("constant:x".parse::<LabelMode>().is_err());
    assert!("random".parse::<LabelMode>().is_err());
  }

  #[test]
  fn counter_labeller_increments() {
    let mut labeller = LabelMode::Counter.labeller();
    let labels: Vec<u32> = (0..3).map(|_| labeller(&[])).collect();
    assert_eq!(labels, vec![0, 1, 2]);
  }
}
