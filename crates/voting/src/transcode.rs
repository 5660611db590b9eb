//! Normalises uploaded payloads to a standard raster encoding.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat};
use shared::error::{ApiError, ErrorCode};

const PNG_MIME: &str = "image/png";
const JPEG_MIME: &str = "image/jpeg";

/// ISO-BMFF brands used by HEIC/HEIF camera output.
const HEIF_BRANDS: &[&[u8; 4]] = &[
    b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis", b"mif1", b"msf1",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub data: Vec<u8>,
    pub mime_type: String,
    /// Set when the stored bytes differ from the uploaded ones.
    pub transcoded: bool,
}

pub trait Transcode: Send + Sync {
    /// Returns the payload in a standard encoding, or a `Format` error when it
    /// cannot be decoded. `declared_mime` is only a hint; the bytes decide.
    fn normalize(
        &self,
        data: &[u8],
        declared_mime: Option<&str>,
    ) -> Result<NormalizedImage, ApiError>;
}

/// Keeps PNG and JPEG as uploaded and re-encodes every other format the
/// `image` build can decode to PNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterTranscoder;

impl Transcode for RasterTranscoder {
    fn normalize(
        &self,
        data: &[u8],
        declared_mime: Option<&str>,
    ) -> Result<NormalizedImage, ApiError> {
        if is_heif(data) {
            return Err(format_error(
                "HEIC/HEIF images are not supported by this build",
            ));
        }

        let format = image::guess_format(data).map_err(|_| {
            format_error(match declared_mime {
                Some(mime) => format!("unrecognised image data (declared as {mime})"),
                None => "unrecognised image data".to_string(),
            })
        })?;
        let decoded = image::load_from_memory_with_format(data, format)
            .map_err(|e| format_error(format!("could not decode {format:?} image: {e}")))?;

        match format {
            ImageFormat::Png => Ok(passthrough(data, PNG_MIME)),
            ImageFormat::Jpeg => Ok(passthrough(data, JPEG_MIME)),
            _ => Ok(NormalizedImage {
                data: encode_png(decoded)?,
                mime_type: PNG_MIME.to_string(),
                transcoded: true,
            }),
        }
    }
}

pub fn is_heif(data: &[u8]) -> bool {
    data.len() >= 12
        && &data[4..8] == b"ftyp"
        && HEIF_BRANDS.iter().any(|brand| &data[8..12] == brand.as_slice())
}

fn passthrough(data: &[u8], mime_type: &str) -> NormalizedImage {
    NormalizedImage {
        data: data.to_vec(),
        mime_type: mime_type.to_string(),
        transcoded: false,
    }
}

fn encode_png(decoded: DynamicImage) -> Result<Vec<u8>, ApiError> {
    // PNG has no floating point sample type.
    let decoded = if matches!(
        decoded,
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_)
    ) {
        DynamicImage::ImageRgba16(decoded.to_rgba16())
    } else {
        decoded
    };
    let mut out = Cursor::new(Vec::new());
    decoded
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| format_error(format!("could not re-encode image as PNG: {e}")))?;
    Ok(out.into_inner())
}

fn format_error(message: impl Into<String>) -> ApiError {
    ApiError::new(ErrorCode::Format, message)
}

#[cfg(test)]
#[path = "tests/transcode_tests.rs"]
mod tests;
