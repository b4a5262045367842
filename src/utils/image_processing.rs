use std::io::Cursor;
use image::{DynamicImage, ImageError, ImageFormat, ImageReader, RgbImage};

/// JPEG quality used for annotated copies
pub const JPEG_QUALITY: u8 = 90;

/// Decode an uploaded raster (format sniffed from the bytes)
pub fn decode_image(buffer: &[u8]) -> Result<DynamicImage, ImageError> {
    ImageReader::new(Cursor::new(buffer))
        .with_guessed_format()
        .map_err(ImageError::IoError)?
        .decode()
}

/// Mime type matching an accepted extension, used when the caller sent none
pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    let extension = extension.trim_start_matches('.');
    if extension.eq_ignore_ascii_case("pdf") {
        return Some("application/pdf");
    }
    match ImageFormat::from_extension(extension)? {
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Png => Some("image/png"),
        _ => None,
    }
}

/// Encode an RGB image as baseline JPEG
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut output = Vec::new();
    let mut jpeg_encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
        &mut output,
        quality
    );
    jpeg_encoder.encode(
        img,
        img.width(),
        img.height(),
        image::ExtendedColorType::Rgb8,
    )?;

    Ok(output)
}
