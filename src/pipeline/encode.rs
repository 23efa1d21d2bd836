//! Image encoding: rendered pages to PNG bytes, page images to base64
//! attachments for the vision call.
//!
//! Rendered PDF pages are encoded as PNG: lossless compression keeps
//! gridlines and small digits crisp. Uploaded images are forwarded in their
//! original encoding.

use crate::error::DatasheetError;
use crate::model::ImageAttachment;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageReader};
use std::io::Cursor;
use tracing::debug;

/// Encode a rendered page as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Base64-wrap image bytes for a model request.
pub fn to_attachment(bytes: &[u8], mime_type: &str) -> ImageAttachment {
    let data = STANDARD.encode(bytes);
    debug!("Encoded {} image → {} bytes base64", mime_type, data.len());
    ImageAttachment {
        data,
        mime_type: mime_type.to_string(),
    }
}

/// Read width and height from an encoded image without decoding pixels.
pub fn image_dimensions(bytes: &[u8]) -> Result<(u32, u32), DatasheetError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| DatasheetError::InvalidInput(format!("unreadable image: {e}")))?
        .into_dimensions()
        .map_err(|e| DatasheetError::InvalidInput(format!("unreadable image: {e}")))
}
