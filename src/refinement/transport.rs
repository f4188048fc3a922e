//! Image transport: every image handed to the collaborator is downscaled to a
//! bounded width (aspect ratio preserved) and encoded as a base64 PNG payload.

use crate::error::Result;
use base64::Engine;
use image::{DynamicImage, ImageFormat, RgbaImage, imageops::FilterType};
use std::io::Cursor;

/// Widest image ever sent to the collaborator unless a caller opts out.
pub const MAX_TRANSPORT_WIDTH: u32 = 1024;

/// A self-contained still-image payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: &'static str,
    /// Base64 (standard alphabet) of the encoded bytes.
    pub data: String,
    pub width: u32,
    pub height: u32,
}

impl ImagePayload {
    /// `data:` URL form, as accepted by chat-completion style endpoints.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    pub fn decode(&self) -> Result<RgbaImage> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(&self.data)?;
        Ok(image::load_from_memory(&bytes)?.to_rgba8())
    }
}

/// Downscales `image` to at most `max_width` wide (`None` keeps full resolution)
/// and encodes it as PNG.
pub fn prepare_image(image: &RgbaImage, max_width: Option<u32>) -> Result<ImagePayload> {
    let resized;
    let source = match max_width {
        Some(limit) if limit > 0 && image.width() > limit => {
            let height = ((image.height() as u64 * limit as u64) as f64 / image.width() as f64)
                .round()
                .max(1.0) as u32;
            resized = image::imageops::resize(image, limit, height, FilterType::Triangle);
            &resized
        }
        _ => image,
    };

    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(source.clone()).write_to(&mut bytes, ImageFormat::Png)?;

    Ok(ImagePayload {
        mime_type: "image/png",
        data: base64::engine::general_purpose::STANDARD.encode(bytes.into_inner()),
        width: source.width(),
        height: source.height(),
    })
}
