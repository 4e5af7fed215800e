//! Inline base64 encoding of image files.

use base64::Engine as _;
use tracing::debug;

use super::{IncomingFile, PendingImage};
use crate::error::{Result, TexSauceError};

/// Build a `data:` URI from a mime type and base64 payload.
pub fn data_uri(mime_type: &str, base64_data: &str) -> String {
    format!("data:{mime_type};base64,{base64_data}")
}

/// Encode raw bytes as standard base64.
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Read an image file and wrap it as a [`PendingImage`], keeping its mime type.
///
/// # Errors
///
/// I/O errors reading the file, or [`TexSauceError::Image`] for an empty file.
pub async fn encode_image(file: &IncomingFile) -> Result<PendingImage> {
    let bytes = tokio::fs::read(&file.path).await?;
    if bytes.is_empty() {
        return Err(TexSauceError::Image(format!("{} is empty", file.name)));
    }
    let base64_data = encode_base64(&bytes);
    debug!(file = %file.name, mime = %file.mime_type, bytes = bytes.len(), "encoded image");
    Ok(PendingImage::new(
        file.clone(),
        base64_data,
        file.mime_type.clone(),
    ))
}
