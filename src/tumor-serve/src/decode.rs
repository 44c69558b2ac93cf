use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::RgbImage;

use crate::error::{Error, Result};
use crate::timer::Timer;

/// Decode an encoded raster image (PNG, JPEG, ...) into 8-bit RGB.
///
/// Grayscale, palette and alpha images are converted to three channels;
/// alpha is dropped.
pub fn decode_image(data: &[u8]) -> Result<RgbImage> {
    let t = Timer::start("Load image from memory");

    let image = image::load_from_memory(data)?;
    let rgb = image.into_rgb8();

    t.stop();

    Ok(rgb)
}

/// Decode base64 text (standard alphabet) into raw image bytes.
///
/// Surrounding whitespace is ignored; nothing left over is
/// [`Error::EmptyInput`].
pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::EmptyInput);
    }

    Ok(STANDARD.decode(text)?)
}
