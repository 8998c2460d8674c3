//! Error types surfaced through the error banner.
//!
//! The `Display` text of every variant is the exact message shown to the user.

use thiserror::Error;

use crate::image::Role;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TryOnError {
    #[error("Please select a valid image file (JPEG, PNG, GIF, WebP, HEIC, HEIF).")]
    UnsupportedType,

    #[error("Image size should be less than {limit_mb}MB.")]
    TooLarge { limit_mb: u64 },

    #[error("Failed to read {role} image: {reason}")]
    Read { role: Role, reason: String },

    #[error("Please upload both person and clothing images.")]
    MissingImages,

    #[error("A try-on request is already in progress.")]
    Busy,

    #[error("Failed to process virtual try-on: {0}")]
    Network(String),

    #[error("Failed to process virtual try-on: {0}")]
    Server(String),

    #[error("Failed to process virtual try-on: {0}")]
    Malformed(String),

    #[error("Failed to process virtual try-on: Invalid response from server")]
    InvalidResponse,

    #[error("Failed to process virtual try-on: the request was interrupted")]
    Interrupted,

    #[error("No result image to download.")]
    NoResult,

    #[error("Failed to download image. Please try right-clicking and saving the image.")]
    SaveFailed,
}

pub type Result<T> = std::result::Result<T, TryOnError>;

/// Renders a JS exception for logs and error details.
pub fn describe_js(err: &wasm_bindgen::JsValue) -> String {
    if let Some(s) = err.as_string() {
        return s;
    }
    js_sys::Reflect::get(err, &wasm_bindgen::JsValue::from_str("message"))
        .ok()
        .and_then(|m| m.as_string())
        .unwrap_or_else(|| format!("{err:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_share_prefix() {
        assert_eq!(
            TryOnError::Server("bad input".into()).to_string(),
            "Failed to process virtual try-on: bad input"
        );
        assert_eq!(
            TryOnError::InvalidResponse.to_string(),
            "Failed to process virtual try-on: Invalid response from server"
        );
    }

    #[test]
    fn size_limit_message() {
        let err = TryOnError::TooLarge { limit_mb: 20 };
        assert_eq!(err.to_string(), "Image size should be less than 20MB.");
    }

    #[test]
    fn read_error_names_role() {
        let err = TryOnError::Read {
            role: Role::Clothing,
            reason: "NotReadableError".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to read clothing image: NotReadableError"
        );
    }
}
