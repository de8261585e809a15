//! Pure-Rust luminance QR search (rqrr). Strictly slower than the native
//! backend but works on every target with no extra toolchain.

use super::Decoder;
use crate::capture::Frame;

#[derive(Debug, Default)]
pub struct SoftwareDecoder;

impl SoftwareDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for SoftwareDecoder {
    fn name(&self) -> &'static str {
        "rqrr"
    }

    fn decode(&self, frame: &Frame) -> Option<String> {
        if frame.width == 0 || frame.luma.len() < frame.width * frame.height {
            return None;
        }
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            frame.width,
            frame.height,
            |x, y| frame.luma[y * frame.width + x],
        );
        for grid in prepared.detect_grids() {
            match grid.decode() {
                Ok((_meta, content)) => return Some(content),
                Err(e) => {
                    tracing::debug!(seq = frame.seq, error = %e, "grid detected but not decodable");
                }
            }
        }
        None
    }
}
