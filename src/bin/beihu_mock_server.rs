// 该文件是 Beihu （北湖） 项目的一部分。
// src/bin/beihu_mock_server.rs - 模拟分类服务
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

use anyhow::Result;
use clap::Parser;

use beihu::server::{LabelMode, MockServer};

/// 模拟分类服务参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 监听地址
  #[arg(long, default_value = "0.0.0.0:7", value_name = "ADDR")]
  pub bind: String,

  /// 标签模式：constant:N 或 counter
  #[arg(long, default_value = "constant:0", value_name = "MODE")]
  pub label: LabelMode,

  /// 每个连接完成指定次数的分类后断开
  #[arg(long, value_name = "COUNT")]
  pub drop_after: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  let mut server = MockServer::bind(args.bind.as_str())?.with_mode(args.label);
  if let Some(n) = args.drop_after {
    server = server.with_drop_after(n);
  }
  server.run()?;

  Ok(())
}
