//! Client for the try-on endpoint.

use gloo_net::http::Request;
use serde::{Deserialize, Serialize};
use web_sys::{File, FormData};

use crate::error::{Result, TryOnError, describe_js};
use crate::image::Role;

const GENERIC_FAILURE: &str = "Virtual try-on failed";

/// Body returned by `POST /virtual-tryon`, both on success and on failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TryOnResponse {
    pub success: bool,
    pub result_image: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}

/// Turns a raw HTTP response into the result image or the error to show.
pub fn interpret(ok: bool, status: u16, body: &str) -> Result<String> {
    let parsed = serde_json::from_str::<TryOnResponse>(body);

    if !ok {
        let detail = parsed
            .ok()
            .and_then(|r| r.error)
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| GENERIC_FAILURE.to_string());
        tracing::warn!(status, %detail, "try-on endpoint returned an error status");
        return Err(TryOnError::Server(detail));
    }

    let response = parsed.map_err(|e| TryOnError::Malformed(e.to_string()))?;
    match response.result_image {
        Some(image) if response.success && !image.is_empty() => Ok(image),
        _ => Err(TryOnError::InvalidResponse),
    }
}

#[derive(Debug, Clone)]
pub struct TryOnClient {
    endpoint: String,
    health_endpoint: String,
}

impl TryOnClient {
    pub fn new(endpoint: impl Into<String>, health_endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            health_endpoint: health_endpoint.into(),
        }
    }

    fn form(person: &File, clothing: &File) -> std::result::Result<FormData, wasm_bindgen::JsValue> {
        let form = FormData::new()?;
        form.append_with_blob_and_filename(Role::Person.field(), person, &person.name())?;
        form.append_with_blob_and_filename(Role::Clothing.field(), clothing, &clothing.name())?;
        Ok(form)
    }

    /// Sends both images and returns the result image as a data URL.
    pub async fn virtual_tryon(&self, person: &File, clothing: &File) -> Result<String> {
        let form = Self::form(person, clothing).map_err(|e| TryOnError::Network(describe_js(&e)))?;

        tracing::info!(endpoint = %self.endpoint, "sending try-on request");
        let response = Request::post(&self.endpoint)
            .body(form)
            .map_err(|e| TryOnError::Network(e.to_string()))?
            .send()
            .await
            .map_err(|e| TryOnError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TryOnError::Malformed(e.to_string()))?;
        tracing::debug!(status, bytes = body.len(), "try-on response received");

        interpret(response.ok(), status, &body)
    }

    pub async fn health(&self) -> Result<HealthStatus> {
        let response = Request::get(&self.health_endpoint)
            .send()
            .await
            .map_err(|e| TryOnError::Network(e.to_string()))?;
        if !response.ok() {
            return Err(TryOnError::Server(format!("health check returned {}", response.status())));
        }
        response
            .json::<HealthStatus>()
            .await
            .map_err(|e| TryOnError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_returns_exact_payload() {
        let body = r#"{"success":true,"result_image":"data:image/png;base64,AAAA"}"#;
        assert_eq!(
            interpret(true, 200, body).unwrap(),
            "data:image/png;base64,AAAA"
        );
    }

    #[test]
    fn error_status_uses_server_detail() {
        let err = interpret(false, 500, r#"{"error":"bad input"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Failed to process virtual try-on: bad input");
    }

    #[test]
    fn error_status_without_detail_falls_back() {
        for body in ["<html>Bad Gateway</html>", "{}", r#"{"error":"  "}"#] {
            let err = interpret(false, 502, body).unwrap_err();
            assert_eq!(err, TryOnError::Server(GENERIC_FAILURE.to_string()));
        }
    }

    #[test]
    fn error_status_wins_over_success_body() {
        let body = r#"{"success":true,"result_image":"data:image/png;base64,AAAA"}"#;
        assert!(interpret(false, 500, body).is_err());
    }

    #[test]
    fn missing_result_image_is_invalid() {
        assert_eq!(
            interpret(true, 200, r#"{"success":true}"#).unwrap_err(),
            TryOnError::InvalidResponse
        );
        assert_eq!(
            interpret(true, 200, r#"{"success":false,"result_image":"data:x"}"#).unwrap_err(),
            TryOnError::InvalidResponse
        );
        assert_eq!(
            interpret(true, 200, r#"{"success":true,"result_image":""}"#).unwrap_err(),
            TryOnError::InvalidResponse
        );
    }

    #[test]
    fn unparsable_success_body_is_malformed() {
        let err = interpret(true, 200, "not json").unwrap_err();
        assert!(matches!(err, TryOnError::Malformed(_)));
        assert!(err.to_string().starts_with("Failed to process virtual try-on: "));
    }

    #[test]
    fn health_status() {
        let h: HealthStatus =
            serde_json::from_str(r#"{"status":"healthy","service":"Virtual Try-On API"}"#).unwrap();
        assert!(h.is_healthy());
        let h: HealthStatus = serde_json::from_str(r#"{"status":"degraded"}"#).unwrap();
        assert!(!h.is_healthy());
    }
}
