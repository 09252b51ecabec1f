//! Image normalization: decode data URLs and raw bytes into a canonical
//! embedded representation.

use std::io::Cursor;

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageFormat};
use percent_encoding::percent_decode_str;

use crate::types::{HarvestError, HarvestResult};

/// JPEG quality used when re-encoding, matching the browser canvas default.
pub const JPEG_QUALITY: u8 = 92;

/// Formats that are kept byte-for-byte once they decode cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
    WebP,
}

impl ImageKind {
    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpg",
            ImageKind::Gif => "gif",
            ImageKind::WebP => "webp",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Gif => "image/gif",
            ImageKind::WebP => "image/webp",
        }
    }

    fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(ImageKind::Png),
            ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            ImageFormat::Gif => Some(ImageKind::Gif),
            ImageFormat::WebP => Some(ImageKind::WebP),
            _ => None,
        }
    }

    fn format(self) -> ImageFormat {
        match self {
            ImageKind::Png => ImageFormat::Png,
            ImageKind::Jpeg => ImageFormat::Jpeg,
            ImageKind::Gif => ImageFormat::Gif,
            ImageKind::WebP => ImageFormat::WebP,
        }
    }
}

/// Whether a file extension names a JPEG variant.
pub fn is_jpeg_extension(ext: &str) -> bool {
    matches!(
        ext.to_ascii_lowercase().as_str(),
        "jpg" | "jpeg" | "jpe" | "jfif" | "pjpeg" | "pjp"
    )
}

/// A decoded `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

/// The canonical embedded form of an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub data_url: String,
    pub kind: ImageKind,
}

impl NormalizedImage {
    pub fn extension(&self) -> &'static str {
        self.kind.extension()
    }
}

/// Split a `data:` URL into its media type and payload bytes.
pub fn parse_data_url(data_url: &str) -> HarvestResult<DataUrl> {
    let rest = data_url
        .get(..5)
        .filter(|p| p.eq_ignore_ascii_case("data:"))
        .map(|_| &data_url[5..])
        .ok_or_else(|| HarvestError::InvalidInput("Not a data URL".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| HarvestError::InvalidInput("Missing data in data URL".to_string()))?;

    let mut is_base64 = false;
    let mut mime = None;
    for (idx, segment) in header.split(';').enumerate() {
        let seg = segment.trim();
        if seg.eq_ignore_ascii_case("base64") {
            is_base64 = true;
        } else if idx == 0 && seg.contains('/') {
            mime = Some(seg.to_ascii_lowercase());
        }
    }

    let bytes = if is_base64 {
        let compact: String = percent_decode_str(payload)
            .decode_utf8_lossy()
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        base64::engine::general_purpose::STANDARD
            .decode(&compact)
            .or_else(|_| base64::engine::general_purpose::STANDARD_NO_PAD.decode(&compact))
            .map_err(|e| HarvestError::InvalidInput(format!("Invalid base64 data URL: {e}")))?
    } else {
        percent_decode_str(payload).collect()
    };

    Ok(DataUrl { mime, bytes })
}

/// Build a base64 `data:` URL.
pub fn to_data_url(bytes: &[u8], kind: ImageKind) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{};base64,{encoded}", kind.mime())
}

/// Encode a decoded image as PNG or JPEG.
pub fn encode(img: &DynamicImage, kind: ImageKind) -> HarvestResult<Vec<u8>> {
    let mut buf = Vec::new();
    let mut cursor = Cursor::new(&mut buf);
    match kind {
        ImageKind::Jpeg => {
            let rgb = img.to_rgb8();
            let encoder = JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
            rgb.write_with_encoder(encoder)?;
        }
        _ => {
            let encoder = PngEncoder::new(&mut cursor);
            img.write_with_encoder(encoder)?;
        }
    }
    Ok(buf)
}

/// Canonicalize raw image bytes.
///
/// PNG, JPEG, GIF and WebP are validated by decoding and kept as-is; any
/// other decodable raster is re-encoded as PNG. Anything else fails.
pub fn normalize_bytes(bytes: &[u8]) -> HarvestResult<NormalizedImage> {
    if bytes.is_empty() {
        return Err(HarvestError::InvalidInput("Empty image payload".to_string()));
    }
    let format = image::guess_format(bytes)?;

    match ImageKind::from_format(format) {
        Some(kind) => {
            image::load_from_memory_with_format(bytes, kind.format())?;
            Ok(NormalizedImage {
                data_url: to_data_url(bytes, kind),
                kind,
            })
        }
        None => {
            let img = image::load_from_memory_with_format(bytes, format)?;
            let png = encode(&img, ImageKind::Png)?;
            Ok(NormalizedImage {
                data_url: to_data_url(&png, ImageKind::Png),
                kind: ImageKind::Png,
            })
        }
    }
}

/// Canonicalize an embedded `data:` URL.
pub fn normalize_data_url(data_url: &str) -> HarvestResult<NormalizedImage> {
    let parsed = parse_data_url(data_url)?;
    normalize_bytes(&parsed.bytes)
}
