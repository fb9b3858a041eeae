//! QR code rendering.

use image::{ImageFormat, Luma};
use qrcode::QrCode;
use std::io::Cursor;

use crate::types::QrToken;

/// Rendering failures
#[derive(Debug, thiserror::Error)]
pub enum QrError {
    /// Token too long for any QR version
    #[error("cannot encode QR code: {0}")]
    Encode(#[from] qrcode::types::QrError),

    /// PNG encoding failed
    #[error("cannot write PNG: {0}")]
    Image(#[from] image::ImageError),
}

/// Pixels per QR module
const MODULE_PIXELS: u32 = 10;

/// Render `token` as a PNG image.
///
/// # Errors
///
/// Returns `QrError` if the token cannot be encoded.
pub fn render_png(token: &QrToken) -> Result<Vec<u8>, QrError> {
    let code = QrCode::new(token.as_str().as_bytes())?;
    let image = code
        .render::<Luma<u8>>()
        .module_dimensions(MODULE_PIXELS, MODULE_PIXELS)
        .build();

    let mut png = Cursor::new(Vec::new());
    image.write_to(&mut png, ImageFormat::Png)?;
    Ok(png.into_inner())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn renders_png_signature() {
        let token = QrToken::generate(&mut StdRng::seed_from_u64(3));
        let png = render_png(&token).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn same_token_same_image() {
        let token = QrToken::from_string("c2FtZQ==".to_string());
        assert_eq!(render_png(&token).unwrap(), render_png(&token).unwrap());
    }
}
