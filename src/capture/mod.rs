//! Camera / frame acquisition boundary.
//!
//! Hardware capture is platform-specific and plugs in behind the [`Capture`]
//! trait; the crate ships [`replay::ReplayCapture`], which feeds
//! pre-captured greyscale frames from disk for the CLI harness and tests.

pub mod replay;

use bytes::Bytes;

use crate::errors::CaptureError;

/// Which camera to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Facing {
    /// Rear camera, pointed at the presented code.
    #[default]
    Environment,
    /// Front camera.
    User,
}

impl Facing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Facing::Environment => "environment",
            Facing::User => "user",
        }
    }

    /// Parse a config/CLI value; anything unrecognized falls back to the
    /// rear camera.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" | "front" => Facing::User,
            "environment" | "rear" | "back" => Facing::Environment,
            other => {
                tracing::warn!(facing = other, "unknown camera facing, using environment");
                Facing::Environment
            }
        }
    }
}

/// One greyscale camera frame. `luma` is row-major, one byte per pixel.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub luma: Bytes,
    pub seq: u64,
}

impl Frame {
    pub fn new(width: usize, height: usize, luma: Bytes, seq: u64) -> Self {
        Self {
            width,
            height,
            luma,
            seq,
        }
    }
}

/// A started capture session handing out frames. Dropping the source stops
/// capture and releases the device.
pub trait FrameSource: Send {
    /// The most recent frame, or `None` when capture has not produced a new
    /// one yet (the sampling loop skips that tick silently).
    fn latest_frame(&mut self) -> Option<Frame>;
}

/// Capture device boundary.
pub trait Capture: Send + Sync {
    fn start(&self, facing: Facing) -> Result<Box<dyn FrameSource>, CaptureError>;
}
