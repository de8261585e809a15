//! Accelerated decoding through the zxing-cpp bindings. Selected by the
//! probe when the `decoder-zxing` feature is compiled in; the software
//! decoder stays registered as the fallback.

use super::Decoder;
use crate::capture::Frame;

pub struct NativeDecoder {
    reader: zxingcpp::BarcodeReader,
}

impl NativeDecoder {
    pub fn new() -> Self {
        Self {
            reader: zxingcpp::read().formats(zxingcpp::BarcodeFormat::QRCode),
        }
    }
}

impl Default for NativeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for NativeDecoder {
    fn name(&self) -> &'static str {
        "zxing-cpp"
    }

    fn decode(&self, frame: &Frame) -> Option<String> {
        if frame.luma.len() < frame.width * frame.height {
            return None;
        }
        let view = zxingcpp::ImageView::from_slice(
            &frame.luma,
            frame.width as u32,
            frame.height as u32,
            zxingcpp::ImageFormat::Lum,
        )
        .ok()?;
        match self.reader.from(&view) {
            Ok(barcodes) => barcodes.first().map(|barcode| barcode.text()),
            Err(e) => {
                tracing::debug!(seq = frame.seq, error = %e, "native decode failed");
                None
            }
        }
    }
}
