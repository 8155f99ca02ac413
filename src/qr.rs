//! QR-code rendering to PNG for the `dump_qr` filter.

use image::{GrayImage, Luma};
use qrcode::QrCode;

/// Size of one QR module in pixels.
const MODULE_PX: u32 = 8;
/// Quiet-zone border in modules.
const QUIET_ZONE: u32 = 4;

/// Turns text into PNG bytes of a scannable QR code.
pub trait QrEncoder: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u8>, String>;
}

/// Grayscale PNG encoder built on `qrcode` + `image`.
#[derive(Debug, Clone)]
pub struct PngQrEncoder {
    module_px: u32,
}

impl PngQrEncoder {
    pub fn new() -> Self {
        Self {
            module_px: MODULE_PX,
        }
    }

    pub fn with_module_px(module_px: u32) -> Self {
        Self {
            module_px: module_px.max(1),
        }
    }
}

impl Default for PngQrEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl QrEncoder for PngQrEncoder {
    fn encode(&self, text: &str) -> Result<Vec<u8>, String> {
        let code = QrCode::new(text.as_bytes()).map_err(|e| format!("QR encode error: {e}"))?;

        let px = self.module_px;
        let matrix = code.to_colors();
        let width = code.width() as u32;
        let img_size = (width + QUIET_ZONE * 2) * px;

        let mut img = GrayImage::from_pixel(img_size, img_size, Luma([255u8]));
        for y in 0..width {
            for x in 0..width {
                if matrix[(y * width + x) as usize] != qrcode::Color::Dark {
                    continue;
                }
                let px_x = (x + QUIET_ZONE) * px;
                let px_y = (y + QUIET_ZONE) * px;
                for dy in 0..px {
                    for dx in 0..px {
                        img.put_pixel(px_x + dx, px_y + dy, Luma([0u8]));
                    }
                }
            }
        }

        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img_size,
            img_size,
            image::ExtendedColorType::L8,
        )
        .map_err(|e| format!("PNG encode error: {e}"))?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

    #[test]
    fn produces_png() {
        let png = PngQrEncoder::new().encode("vmess://abc").unwrap();
        assert!(png.starts_with(PNG_MAGIC));
    }

    #[test]
    fn deterministic_for_same_input() {
        let encoder = PngQrEncoder::with_module_px(2);
        assert_eq!(encoder.encode("hello").unwrap(), encoder.encode("hello").unwrap());
    }
}
