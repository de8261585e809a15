//! Replay capture: feeds binary PGM frames from a directory in filename
//! order, one per sampling tick. Stands in for a hardware camera in the CLI
//! harness and in tests.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::errors::CaptureError;
use super::{Capture, Facing, Frame, FrameSource};

pub struct ReplayCapture {
    dir: PathBuf,
}

impl ReplayCapture {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Capture for ReplayCapture {
    fn start(&self, facing: Facing) -> Result<Box<dyn FrameSource>, CaptureError> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "pgm"))
            .collect();
        paths.sort();
        if paths.is_empty() {
            return Err(CaptureError::Unavailable(format!(
                "no .pgm frames in {}",
                self.dir.display()
            )));
        }
        tracing::info!(
            frames = paths.len(),
            facing = facing.as_str(),
            dir = %self.dir.display(),
            "replay capture started"
        );
        Ok(Box::new(ReplaySource { paths, next: 0 }))
    }
}

struct ReplaySource {
    paths: Vec<PathBuf>,
    next: usize,
}

impl FrameSource for ReplaySource {
    fn latest_frame(&mut self) -> Option<Frame> {
        let path = self.paths.get(self.next)?;
        self.next += 1;
        match read_pgm(path) {
            Ok((width, height, luma)) => Some(Frame::new(width, height, luma, self.next as u64)),
            Err(e) => {
                tracing::warn!(frame = %path.display(), error = %e, "skipping unreadable frame");
                None
            }
        }
    }
}

/// Minimal reader for binary PGM (`P5`, maxval ≤ 255).
fn read_pgm(path: &Path) -> io::Result<(usize, usize, Bytes)> {
    let data = fs::read(path)?;
    let mut pos = 0;

    let magic = next_token(&data, &mut pos).ok_or_else(|| bad("missing magic number"))?;
    if magic != "P5" {
        return Err(bad("not a binary PGM (expected P5)"));
    }
    let width = parse_dim(&data, &mut pos, "width")?;
    let height = parse_dim(&data, &mut pos, "height")?;
    let maxval = parse_dim(&data, &mut pos, "maxval")?;
    if maxval == 0 || maxval > 255 {
        return Err(bad("unsupported maxval (must be 1..=255)"));
    }

    // A single whitespace byte separates the header from the raster.
    pos += 1;
    let need = width * height;
    if data.len() < pos + need {
        return Err(bad("truncated raster"));
    }
    Ok((width, height, Bytes::copy_from_slice(&data[pos..pos + need])))
}

fn parse_dim(data: &[u8], pos: &mut usize, what: &str) -> io::Result<usize> {
    next_token(data, pos)
        .and_then(|token| token.parse().ok())
        .ok_or_else(|| bad(&format!("missing or invalid {what}")))
}

/// Next whitespace-delimited token, skipping `#` comment lines. Leaves `pos`
/// on the whitespace byte that terminated the token.
fn next_token(data: &[u8], pos: &mut usize) -> Option<String> {
    loop {
        while *pos < data.len() && data[*pos].is_ascii_whitespace() {
            *pos += 1;
        }
        if *pos < data.len() && data[*pos] == b'#' {
            while *pos < data.len() && data[*pos] != b'\n' {
                *pos += 1;
            }
        } else {
            break;
        }
    }
    let start = *pos;
    while *pos < data.len() && !data[*pos].is_ascii_whitespace() {
        *pos += 1;
    }
    (start < *pos).then(|| String::from_utf8_lossy(&data[start..*pos]).into_owned())
}

fn bad(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}
