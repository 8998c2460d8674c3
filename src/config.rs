//! Runtime configuration.
//!
//! Defaults match the bundled server. A hosting page can override them with
//! `<meta>` tags, e.g. `<meta name="tryon-endpoint" content="/api/tryon">`.

use std::time::Duration;

use wasm_bindgen::JsCast;
use web_sys::{Document, HtmlMetaElement};

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryOnConfig {
    /// Multipart POST target
    pub endpoint: String,

    /// Health probe target
    pub health_endpoint: String,

    /// Largest accepted upload (bytes)
    pub max_upload_bytes: u64,

    /// How long an error stays on screen
    pub error_display: Duration,
}

impl Default for TryOnConfig {
    fn default() -> Self {
        Self {
            endpoint: "/virtual-tryon".to_string(),
            health_endpoint: "/health".to_string(),
            max_upload_bytes: 20 * MIB,
            error_display: Duration::from_secs(10),
        }
    }
}

impl TryOnConfig {
    /// Applies `(name, content)` pairs taken from the page's meta tags.
    /// Unknown names and unparsable values are ignored.
    pub fn with_overrides<'a>(mut self, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        for (name, content) in pairs {
            let content = content.trim();
            if content.is_empty() {
                continue;
            }
            match name {
                "tryon-endpoint" => self.endpoint = content.to_string(),
                "tryon-health" => self.health_endpoint = content.to_string(),
                "tryon-max-upload-mb" => match content
                    .parse::<u64>()
                    .ok()
                    .filter(|mb| *mb > 0)
                    .and_then(|mb| mb.checked_mul(MIB))
                {
                    Some(bytes) => self.max_upload_bytes = bytes,
                    None => tracing::warn!(value = content, "ignoring invalid tryon-max-upload-mb"),
                },
                _ => {}
            }
        }
        self
    }

    pub fn from_document(doc: &Document) -> Self {
        let mut pairs = Vec::new();
        if let Ok(metas) = doc.query_selector_all("meta[name^='tryon-']") {
            for i in 0..metas.length() {
                if let Some(meta) = metas
                    .item(i)
                    .and_then(|n| n.dyn_into::<HtmlMetaElement>().ok())
                {
                    pairs.push((meta.name(), meta.content()));
                }
            }
        }
        let config = Self::default()
            .with_overrides(pairs.iter().map(|(n, c)| (n.as_str(), c.as_str())));
        tracing::info!(
            endpoint = %config.endpoint,
            max_upload_bytes = config.max_upload_bytes,
            "configuration loaded"
        );
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = TryOnConfig::default();
        assert_eq!(c.endpoint, "/virtual-tryon");
        assert_eq!(c.health_endpoint, "/health");
        assert_eq!(c.max_upload_bytes, 20 * 1024 * 1024);
        assert_eq!(c.error_display, Duration::from_secs(10));
    }

    #[test]
    fn meta_overrides() {
        let c = TryOnConfig::default().with_overrides([
            ("tryon-endpoint", " /api/tryon "),
            ("tryon-max-upload-mb", "8"),
            ("viewport", "width=device-width"),
        ]);
        assert_eq!(c.endpoint, "/api/tryon");
        assert_eq!(c.health_endpoint, "/health");
        assert_eq!(c.max_upload_bytes, 8 * 1024 * 1024);
    }

    #[test]
    fn bad_values_keep_defaults() {
        let c = TryOnConfig::default().with_overrides([
            ("tryon-max-upload-mb", "lots"),
            ("tryon-max-upload-mb", "0"),
            ("tryon-max-upload-mb", "18446744073709551615"),
            ("tryon-endpoint", ""),
        ]);
        assert_eq!(c, TryOnConfig::default());
    }
}
