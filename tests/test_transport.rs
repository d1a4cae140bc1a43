use std::thread;

use beihu::{
  FromUrl,
  frame::NormalizedRoi,
  server::{LabelMode, MockServer},
  transport::{Classify, Endpoint, InferenceTransport, TransferProgress, TransportConfig},
};
use image::{GrayImage, Luma};

fn white_roi() -> NormalizedRoi {
  NormalizedRoi::new(GrayImage::from_pixel(32, 32, Luma([255])), 1)
}

#[test]
fn test_classify_against_mock_server() -> anyhow::Result<()> {
  let server = MockServer::bind("127.0.0.1:0")?.with_mode(LabelMode::Constant(7));
  let addr = server.local_addr()?;
  let handle = thread::spawn(move || server.serve_one());

  let transport = InferenceTransport::new(None, TransportConfig::default());
  transport.open(&Endpoint::from(addr))?;

  let mut progress = Vec::new();
  let label = transport.classify(&white_roi(), &mut |p| progress.push(p))?;
  assert_eq!(label, 7);
  assert_eq!(
    progress,
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

  transport.close();
  assert!(!transport.is_connected());
  assert_eq!(handle.join().unwrap()?, 1);
  Ok(())
}

#[test]
fn test_connection_is_reused_across_requests() -> anyhow::Result<()> {
  let server = MockServer::bind("127.0.0.1:0")?.with_mode(LabelMode::Counter);
  let addr = server.local_addr()?;
  let handle = thread::spawn(move || server.serve_one());

  let url = url::Url::parse(&format!("tcp://{}", addr))?;
  let transport = InferenceTransport::new(None, TransportConfig::default());
  transport.open(&Endpoint::from_url(&url)?)?;

  let roi = white_roi();
  let labels = (0..5)
    .map(|_| transport.classify(&roi, &mut |_| {}))
    .collect::<Result<Vec<_>, _>>()?;
  assert_eq!(labels, vec![0, 1, 2, 3, 4]);

  transport.close();
  assert_eq!(handle.join().unwrap()?, 5);
  Ok(())
}

#[test]
fn test_peer_drop_closes_transport() -> anyhow::Result<()> {
  let server = MockServer::bind("127.0.0.1:0")?.with_drop_after(1);
  let addr = server.local_addr()?;
  let handle = thread::spawn(move || server.serve_one());

  let transport = InferenceTransport::new(None, TransportConfig::default());
  transport.open(&Endpoint::from(addr))?;

  assert_eq!(transport.classify(&white_roi(), &mut |_| {})?, 0);
  assert_eq!(handle.join().unwrap()?, 1);

  let err = transport.classify(&white_roi(), &mut |_| {}).unwrap_err();
  assert!(!err.is_cancelled(), "{err}");
  assert!(!transport.is_connected());
  Ok(())
}

#[test]
fn test_connect_refused() -> anyhow::Result<()> {
  let addr = {
    let server = MockServer::bind("127.0.0.1:0")?;
    server.local_addr()?
  };

  let transport = InferenceTransport::new(None, TransportConfig::default());
  assert!(transport.open(&Endpoint::from(addr)).is_err());
  assert!(!transport.is_connected());
  Ok(())
}
