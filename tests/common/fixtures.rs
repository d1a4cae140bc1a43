use std::{
  io::{self, Read},
  net::{SocketAddr, TcpListener},
  path::{Path, PathBuf},
  sync::{Mutex, mpsc::Sender},
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use beihu::{
  frame::{BoundingBox, Frame, Roi},
  output::{OutputError, Render},
  sequencer::ClassificationResult,
};
use image::{Rgb, RgbImage};

pub const FRAME_WIDTH: u32 = 320;
pub const FRAME_HEIGHT: u32 = 240;
pub const BLOB_SIZE: u32 = 80;

/// White frame with a dark square blob at each given top-left corner.
pub fn frame_with_blobs(corners: &[(u32, u32)]) -> RgbImage {
  let mut image = RgbImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, Rgb([240, 240, 240]));
  for &(x0, y0) in corners {
    for y in y0..y0 + BLOB_SIZE {
      for x in x0..x0 + BLOB_SIZE {
        image.put_pixel(x, y, Rgb([15, 15, 15]));
      }
    }
  }
  image
}

/// Writes the frames as `frame-NN.png` into `dir`.
pub fn write_frames(dir: &Path, frames: &[RgbImage]) -> Vec<PathBuf> {
  std::fs::create_dir_all(dir).expect("Failed to create frame directory");
  frames
    .iter()
    .enumerate()
    .map(|(i, frame)| {
      let path = dir.join(format!("frame-{:02}.png", i));
      frame.save(&path).expect("Failed to save test frame");
      path
    })
    .collect()
}

/// Finds the first file named `name` below `dir`.
pub fn find_file(dir: &Path, name: &str) -> Option<PathBuf> {
  for entry in std::fs::read_dir(dir).ok()?.flatten() {
    let path = entry.path();
    if path.is_dir() {
      if let Some(found) = find_file(&path, name) {
        return Some(found);
      }
    } else if path.file_name().is_some_and(|n| n == name) {
      return Some(path);
    }
  }
  None
}

/// A peer that accepts one client, never answers, and reads until EOF.
/// Yields the number of bytes received and when the client closed.
pub fn silent_peer() -> (SocketAddr, JoinHandle<io::Result<(usize, Instant)>>) {
  let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind silent peer");
  let addr = listener.local_addr().expect("Failed to read silent peer address");
  let handle = thread::spawn(move || {
    let (mut stream, _) = listener.accept()?;
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    let mut received = Vec::new();
    stream.read_to_end(&mut received)?;
    Ok((received.len(), Instant::now()))
  });
  (addr, handle)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
  Frame(Vec<BoundingBox>),
  Result(BoundingBox, ClassificationResult),
  Failure(usize),
}

/// Forwards every output event into a channel.
pub struct ChannelOutput(pub Mutex<Sender<Event>>);

impl ChannelOutput {
  pub fn new(tx: Sender<Event>) -> Self {
    ChannelOutput(Mutex::new(tx))
  }

  fn send(&self, event: Event) {
    let _ = self.0.lock().unwrap().send(event);
  }
}

impl Render for ChannelOutput {
  fn render_frame(&self, _frame: &Frame, boxes: &[BoundingBox]) -> Result<(), OutputError> {
    self.send(Event::Frame(boxes.to_vec()));
    Ok(())
  }

  fn render_classification(
    &self,
    roi: &Roi,
    result: &ClassificationResult,
  ) -> Result<(), OutputError> {
    self.send(Event::Result(roi.bbox, *result));
    Ok(())
  }

  fn render_failure(&self, undelivered: usize) -> Result<(), OutputError> {
    self.send(Event::Failure(undelivered));
    Ok(())
  }
}
