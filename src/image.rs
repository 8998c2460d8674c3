use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Result, TryOnError};

/// Media types accepted for either upload slot.
pub const ALLOWED_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/heic",
    "image/heif",
];

/// Bytes read from the start of a file when its declared type is not trusted.
pub const SNIFF_LEN: u32 = 32;

const MIB: u64 = 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Person,
    Clothing,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Person, Role::Clothing];

    /// Multipart field name expected by the try-on endpoint.
    pub fn field(self) -> &'static str {
        match self {
            Role::Person => "person_image",
            Role::Clothing => "clothing_image",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Role::Person => "Person photo",
            Role::Clothing => "Clothing photo",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Person => f.write_str("person"),
            Role::Clothing => f.write_str("clothing"),
        }
    }
}

/// What the browser tells us about a picked file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageMeta {
    pub name: String,
    pub mime: String,
    pub size: u64,
}

impl ImageMeta {
    pub fn declared_type_allowed(&self) -> bool {
        is_allowed_type(&self.mime)
    }

    /// Human readable caption for the preview card.
    pub fn caption(&self) -> String {
        format!("{} · {}", self.name, format_file_size(self.size))
    }
}

pub fn is_allowed_type(mime: &str) -> bool {
    let mime = mime.trim();
    ALLOWED_TYPES.iter().any(|t| t.eq_ignore_ascii_case(mime))
}

/// Identifies an image format from its leading magic bytes.
pub fn sniff_mime(header: &[u8]) -> Option<&'static str> {
    if header.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if header.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if header.starts_with(b"GIF87a") || header.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if header.len() >= 12 && &header[..4] == b"RIFF" && &header[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    // ISO-BMFF: box size, "ftyp", major brand
    if header.len() >= 12 && &header[4..8] == b"ftyp" {
        return match &header[8..12] {
            b"heic" | b"heix" | b"hevc" | b"hevx" | b"heim" | b"heis" => Some("image/heic"),
            b"mif1" | b"msf1" | b"heif" => Some("image/heif"),
            _ => None,
        };
    }
    None
}

/// Checks a picked file against the allow-list and the size limit.
///
/// The type is accepted when either the declared type or the sniffed type is
/// on the list. Type problems are reported before size problems.
pub fn validate(meta: &ImageMeta, sniffed: Option<&str>, max_bytes: u64) -> Result<()> {
    let type_ok = meta.declared_type_allowed() || sniffed.is_some_and(is_allowed_type);
    if !type_ok {
        return Err(TryOnError::UnsupportedType);
    }
    if meta.size > max_bytes {
        return Err(TryOnError::TooLarge {
            limit_mb: max_bytes / MIB,
        });
    }
    Ok(())
}

/// Media type to use for the preview of an accepted file.
pub fn preview_mime<'a>(meta: &'a ImageMeta, sniffed: Option<&'a str>) -> &'a str {
    if meta.declared_type_allowed() {
        &meta.mime
    } else {
        sniffed.unwrap_or(&meta.mime)
    }
}

pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut i = 0;
    while i + 1 < UNITS.len() && bytes >= 1024u64.pow(i as u32 + 1) {
        i += 1;
    }
    let value = bytes as f64 / 1024f64.powi(i as i32);
    let rounded = (value * 100.0).round() / 100.0;
    let text = format!("{rounded:.2}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", text, UNITS[i])
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ResultFormat {
    /// Reads the media type out of a `data:` URL, defaulting to PNG.
    pub fn from_data_url(url: &str) -> Self {
        let mime = url
            .strip_prefix("data:")
            .and_then(|rest| rest.split([';', ',']).next())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match mime.as_str() {
            "image/jpeg" | "image/jpg" => ResultFormat::Jpeg,
            "image/gif" => ResultFormat::Gif,
            "image/webp" => ResultFormat::Webp,
            _ => ResultFormat::Png,
        }
    }

    pub fn ext(self) -> &'static str {
        match self {
            ResultFormat::Png => "png",
            ResultFormat::Jpeg => "jpg",
            ResultFormat::Gif => "gif",
            ResultFormat::Webp => "webp",
        }
    }
}

pub fn result_filename(result: &str, timestamp: &str) -> String {
    format!(
        "virtual-tryon-result-{}.{}",
        timestamp,
        ResultFormat::from_data_url(result).ext()
    )
}
