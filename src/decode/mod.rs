//! Machine-readable code decoding behind one `decode(frame) -> payload`
//! contract.
//!
//! Two backends: the pure-Rust luminance search (always compiled in, the
//! baseline guaranteed to work everywhere) and the accelerated zxing-cpp
//! bindings behind the `decoder-zxing` feature. The startup probe prefers
//! the native backend and keeps the software decoder as the per-tick
//! fallback; both converge on the same opaque string payload, so the
//! redemption engine is decoder-agnostic.

#[cfg(feature = "decoder-zxing")]
pub mod native;
pub mod software;

use crate::capture::Frame;

/// A symbol decoder over greyscale frames.
pub trait Decoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decode one frame; `None` when no symbol is found.
    fn decode(&self, frame: &Frame) -> Option<String>;
}

/// The primary decoder (when one is available) plus the guaranteed software
/// fallback.
pub struct DecoderStack {
    primary: Option<Box<dyn Decoder>>,
    fallback: Box<dyn Decoder>,
}

impl DecoderStack {
    /// Capability probe at startup: select the accelerated backend when it
    /// is compiled in, software-only otherwise.
    pub fn probe() -> Self {
        #[cfg(feature = "decoder-zxing")]
        let primary: Option<Box<dyn Decoder>> = Some(Box::new(native::NativeDecoder::new()));
        #[cfg(not(feature = "decoder-zxing"))]
        let primary: Option<Box<dyn Decoder>> = None;

        let fallback: Box<dyn Decoder> = Box::new(software::SoftwareDecoder::new());
        match &primary {
            Some(p) => tracing::info!(primary = p.name(), fallback = fallback.name(), "decoders probed"),
            None => tracing::info!(fallback = fallback.name(), "no accelerated decoder, software only"),
        }
        Self { primary, fallback }
    }

    /// Explicit backend wiring; the seam tests use to inject fakes.
    pub fn with_decoders(primary: Option<Box<dyn Decoder>>, fallback: Box<dyn Decoder>) -> Self {
        Self { primary, fallback }
    }

    /// Try the primary decoder first, then the software fallback.
    pub fn decode(&self, frame: &Frame) -> Option<String> {
        if let Some(primary) = &self.primary {
            if let Some(payload) = primary.decode(frame) {
                return Some(payload);
            }
        }
        self.fallback.decode(frame)
    }
}
