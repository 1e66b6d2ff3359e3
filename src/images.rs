//! Image preparation for the encoders
//!
//! Uploaded images are decoded, flattened to RGB and re-encoded as PNG so
//! both encoder variants receive the same pixels whatever the upload format.

use anyhow::{Context, Result};
use image::{GenericImageView, ImageFormat};

/// Decoded upload, ready to hand to an encoder
#[derive(Debug)]
pub struct PreparedImage {
    /// RGB PNG bytes
    pub data: Vec<u8>,
    /// Image dimensions (width, height)
    pub dimensions: (u32, u32),
    /// Mime type sniffed from the original bytes
    pub detected_mime: Option<&'static str>,
}

/// Whether a declared content type belongs to the `image/` family
pub fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .trim()
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
}

/// Sniff the mime type from magic bytes
pub fn detect_mime(data: &[u8]) -> Option<&'static str> {
    infer::get(data).map(|kind| kind.mime_type())
}

/// Decode any format supported by the `image` crate and convert it to RGB
pub fn prepare_for_encoding(data: &[u8]) -> Result<PreparedImage> {
    let detected_mime = detect_mime(data);

    let img = image::load_from_memory(data).context("Failed to decode image")?;
    let dimensions = img.dimensions();

    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    rgb.write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png)
        .context("Failed to re-encode image")?;

    Ok(PreparedImage {
        data: buf,
        dimensions,
        detected_mime,
    })
}
