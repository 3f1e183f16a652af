//! Display of pairing codes.

use std::io::Write;
use std::path::PathBuf;

use image::Luma;
use qrcode::QrCode;
use qrcode::render::unicode;
use tracing::{error, info};

use crate::error::{BridgeError, BridgeResult};

/// Minimum edge length of the written PNG, in pixels.
const IMAGE_SIZE: u32 = 1024;

/// Shows a pairing code to whoever has to scan it.
pub trait PairingDisplay: Send + Sync {
    fn show(&self, code: &str);
}

/// Prints the code as a Unicode QR on stdout and writes it as a PNG.
#[derive(Debug, Clone)]
pub struct QrDisplay {
    image_path: PathBuf,
}

impl QrDisplay {
    pub fn new(image_path: impl Into<PathBuf>) -> Self {
        Self {
            image_path: image_path.into(),
        }
    }

    /// Render `code` for a terminal.
    pub fn render_terminal(code: &str) -> BridgeResult<String> {
        let qr = QrCode::new(code.as_bytes())
            .map_err(|e| BridgeError::Qr(e.to_string()))?;
        Ok(qr
            .render::<unicode::Dense1x2>()
            .dark_color(unicode::Dense1x2::Light)
            .light_color(unicode::Dense1x2::Dark)
            .build())
    }

    /// Write `code` as a PNG to the configured path.
    pub fn write_image(&self, code: &str) -> BridgeResult<()> {
        let qr = QrCode::new(code.as_bytes())
            .map_err(|e| BridgeError::Qr(e.to_string()))?;
        let image = qr
            .render::<Luma<u8>>()
            .min_dimensions(IMAGE_SIZE, IMAGE_SIZE)
            .build();
        image
            .save(&self.image_path)
            .map_err(|e| BridgeError::Io(std::io::Error::other(e)))
    }
}

impl PairingDisplay for QrDisplay {
    fn show(&self, code: &str) {
        info!("Scan the QR code!");

        match Self::render_terminal(code) {
            Ok(rendered) => {
                let mut stdout = std::io::stdout().lock();
                let _ = writeln!(stdout, "{}", rendered);
            }
            Err(e) => error!("Failed to render QR code: {}", e),
        }

        match self.write_image(code) {
            Ok(()) => info!("QR code written to {}", self.image_path.display()),
            Err(e) => error!(
                "Failed to write QR code to {}: {}",
                self.image_path.display(),
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_terminal() {
        let rendered = QrDisplay::render_terminal("2@abcdef,ghijk,lmnop").unwrap();
        assert!(rendered.lines().count() > 10);
    }

    #[test]
    fn test_oversized_code_is_a_qr_error() {
        let err = QrDisplay::render_terminal(&"x".repeat(8000)).unwrap_err();
        assert!(matches!(err, BridgeError::Qr(_)));

        let dir = TempDir::new().unwrap();
        let display = QrDisplay::new(dir.path().join("qr.png"));
        assert!(matches!(
            display.write_image(&"x".repeat(8000)),
            Err(BridgeError::Qr(_))
        ));
    }

    #[test]
    fn test_write_image() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("qr.png");

        let display = QrDisplay::new(&path);
        display.write_image("2@abcdef,ghijk,lmnop").unwrap();

        let img = image::open(&path).unwrap();
        assert!(img.width() >= IMAGE_SIZE);
    }
}
