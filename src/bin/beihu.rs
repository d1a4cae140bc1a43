// 该文件是 Beihu （北湖） 项目的一部分。
// src/bin/beihu.rs - 手写数字区域识别客户端
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use beihu::{
  FromUrl,
  detector::DetectorConfig,
  input::open_source,
  normalizer::NormalizerConfig,
  output::{Fanout, LogOutput, OutputWrapper},
  pipeline::{Backpressure, Pipeline, PipelineConfig},
  task::{ContinuousTask, Task},
  transport::{Endpoint, TransportConfig},
};

/// Beihu 客户端参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源
  /// - image:///path/to/digit.png
  /// - images:///path/to/dir
  /// - gst://camera/dev/video0?fps=30
  /// - gst://file/path/to/video.mp4
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 分类服务地址，例如 tcp://192.168.1.10:7
  #[arg(long, value_name = "SERVER")]
  pub server: Url,

  /// 记录目录，例如 folder:///tmp/beihu?always
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,

  #[arg(long, default_value_t = 30, value_name = "FPS")]
  pub fps: u32,

  /// 处理帧数上限，0 表示不限
  #[arg(long, value_name = "FRAME_NUMBER", default_value_t = 0)]
  pub frame_number: u64,

  /// 分类忙碌时排队而不是丢弃新批次
  #[arg(long)]
  pub queue: bool,

  /// 最小检测面积（像素²）
  #[arg(long, default_value_t = 5000)]
  pub min_area: u64,

  /// 检测框面积占整帧的最大比例
  #[arg(long, default_value_t = 0.5)]
  pub max_area_fraction: f64,

  /// 单帧最多检测框数，超过则整帧放弃
  #[arg(long, default_value_t = 10)]
  pub max_boxes: usize,

  /// 对比度增益
  #[arg(long, default_value_t = 2.0)]
  pub contrast_gain: f32,

  /// 二值化阈值
  #[arg(long, default_value_t = 175)]
  pub threshold: u8,

  /// 形态学闭运算核半径，0 表示不处理
  #[arg(long, default_value_t = 0)]
  pub morph_kernel: u8,

  /// 网络读写超时（毫秒）
  #[arg(long, default_value_t = 5000)]
  pub timeout_ms: u64,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("分类服务: {}", args.server);

  let config = PipelineConfig::default()
    .with_fps(args.fps)
    .with_backpressure(if args.queue {
      Backpressure::Queue
    } else {
      Backpressure::Drop
    })
    .with_detector(
      DetectorConfig::default()
        .with_min_area(args.min_area)
        .with_max_area_fraction(args.max_area_fraction)
        .with_max_boxes(args.max_boxes),
    )
    .with_normalizer(
      NormalizerConfig::default()
        .with_contrast_gain(args.contrast_gain)
        .with_threshold(args.threshold)
        .with_morph_kernel(args.morph_kernel),
    )
    .with_transport(
      TransportConfig::default().with_io_timeout(Duration::from_millis(args.timeout_ms)),
    );

  let mut output = Fanout::new().with(Arc::new(LogOutput));
  if let Some(url) = &args.output {
    info!("记录目录: {}", url);
    output = output.with(Arc::new(OutputWrapper::from_url(url)?));
  }

  let source = open_source(&args.input)?;
  let pipeline = Pipeline::new(config, Some(source), Arc::new(output))?;

  let endpoint = Endpoint::from_url(&args.server)?;
  if let Err(e) = pipeline.connect(&endpoint) {
    warn!("连接分类服务失败，仅运行检测: {}", e);
  }

  let frame_number = (args.frame_number > 0).then_some(args.frame_number);
  ContinuousTask::default()
    .with_frame_number(frame_number)
    .run_task(&pipeline)?;

  Ok(())
}
