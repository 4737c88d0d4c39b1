//! Pairing artifact rendering
//!
//! A pairing token becomes a PNG QR code wrapped in a `data:` URL so the
//! admin UI can drop it straight into an `<img>` tag.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;
use std::io::Cursor;
use thiserror::Error;

const QR_MIN_DIMENSION: u32 = 256;

#[derive(Debug, Error)]
pub enum PairingError {
    #[error("Empty pairing token")]
    EmptyToken,

    #[error("QR encoding failed: {0}")]
    Encode(String),

    #[error("PNG encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Render a pairing token as a `data:image/png;base64,...` URL
pub fn render_qr_data_url(token: &str) -> Result<String, PairingError> {
    if token.is_empty() {
        return Err(PairingError::EmptyToken);
    }

    let code = QrCode::new(token.as_bytes()).map_err(|e| PairingError::Encode(e.to_string()))?;
    let pixels = code
        .render::<Luma<u8>>()
        .min_dimensions(QR_MIN_DIMENSION, QR_MIN_DIMENSION)
        .build();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(pixels).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    Ok(format!("data:image/png;base64,{}", STANDARD.encode(&png)))
}
