//! OCR collaborators
//!
//! - [`HttpOcrClient`]: remote OCR service, `POST {url}/extract` with
//!   `{"path": ...}`
//! - [`PlainTextOcr`]: reads `.txt` documents directly; used when no OCR
//!   service is configured

use crate::types::{CollaboratorError, Entity, EntityKind, OcrEngine, OcrOutput};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    path: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    entities: Vec<ResponseEntity>,
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseEntity {
    kind: String,
    value: String,
    #[serde(default)]
    confidence: Option<f64>,
}

fn default_success() -> bool {
    true
}

fn entity_kind(label: &str) -> EntityKind {
    match label.to_ascii_lowercase().as_str() {
        "date" => EntityKind::Date,
        "amount" | "montant" => EntityKind::Amount,
        "siret" => EntityKind::Siret,
        "iban" => EntityKind::Iban,
        "organization" | "org" => EntityKind::Organization,
        "emitter" | "emetteur" => EntityKind::Emitter,
        _ => EntityKind::Other,
    }
}

impl ExtractResponse {
    fn into_output(self) -> Result<OcrOutput, CollaboratorError> {
        if !self.success {
            return Err(CollaboratorError::Api(
                self.error.unwrap_or_else(|| "OCR reported failure".to_string()),
            ));
        }
        Ok(OcrOutput {
            text: self.text,
            confidence: self.confidence.clamp(0.0, 1.0),
            entities: self
                .entities
                .into_iter()
                .map(|e| Entity::new(entity_kind(&e.kind), e.value, e.confidence.unwrap_or(0.5)))
                .collect(),
        })
    }
}

/// Remote OCR service client
pub struct HttpOcrClient {
    http_client: Client,
    base_url: String,
}

impl HttpOcrClient {
    /// Create a client for the service at `base_url`
    ///
    /// `timeout` bounds each HTTP request; the pipeline additionally wraps
    /// calls in its own deadline.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CollaboratorError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollaboratorError::NotAvailable(format!("HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl OcrEngine for HttpOcrClient {
    fn name(&self) -> &'static str {
        "ocr_http"
    }

    async fn extract(&self, path: &Path) -> Result<OcrOutput, CollaboratorError> {
        let path_str = path.to_string_lossy();
        debug!(path = %path_str, "Requesting OCR");

        let response = self
            .http_client
            .post(format!("{}/extract", self.base_url))
            .json(&ExtractRequest { path: &path_str })
            .send()
            .await
            .map_err(|e| CollaboratorError::Network(format!("OCR request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Api(format!(
                "OCR service returned error {}: {}",
                status, body
            )));
        }

        let parsed: ExtractResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Parse(format!("Failed to parse OCR response: {}", e)))?;
        let output = parsed.into_output()?;

        debug!(
            path = %path_str,
            chars = output.text.len(),
            confidence = output.confidence,
            entities = output.entities.len(),
            "OCR complete"
        );
        Ok(output)
    }
}

/// Reads plain-text documents as-is
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextOcr;

#[async_trait]
impl OcrEngine for PlainTextOcr {
    fn name(&self) -> &'static str {
        "plain_text"
    }

    async fn extract(&self, path: &Path) -> Result<OcrOutput, CollaboratorError> {
        let is_text = path
            .extension()
            .map(|e| e.to_string_lossy().eq_ignore_ascii_case("txt"))
            .unwrap_or(false);
        if !is_text {
            return Err(CollaboratorError::NotAvailable(format!(
                "no OCR service configured for {}",
                path.display()
            )));
        }

        let text = tokio::fs::read_to_string(path).await?;
        Ok(OcrOutput {
            text,
            confidence: 1.0,
            entities: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_response_parsing() {
        let json = r#"{
            "text": "FACTURE EDF",
            "confidence": 0.93,
            "entities": [
                {"kind": "siret", "value": "55208131766522", "confidence": 0.9},
                {"kind": "weird", "value": "x"}
            ],
            "success": true
        }"#;
        let parsed: ExtractResponse = serde_json::from_str(json).unwrap();
        let output = parsed.into_output().unwrap();
        assert_eq!(output.text, "FACTURE EDF");
        assert_eq!(output.entities[0].kind, EntityKind::Siret);
        assert_eq!(output.entities[1].kind, EntityKind::Other);
        assert_eq!(output.entities[1].confidence, 0.5);
    }

    #[test]
    fn test_reported_failure() {
        let parsed: ExtractResponse =
            serde_json::from_str(r#"{"success": false, "error": "unreadable page"}"#).unwrap();
        match parsed.into_output() {
            Err(CollaboratorError::Api(msg)) => assert_eq!(msg, "unreadable page"),
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_service_is_network_error() {
        // Port 9 (discard) is closed on test hosts
        let client = HttpOcrClient::new("http://127.0.0.1:9/", Duration::from_secs(2)).unwrap();
        let result = client.extract(Path::new("/tmp/x.pdf")).await;
        assert!(matches!(result, Err(CollaboratorError::Network(_))));
    }

    #[tokio::test]
    async fn test_plain_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, "Relevé d'identité bancaire").unwrap();

        let output = PlainTextOcr.extract(&path).await.unwrap();
        assert_eq!(output.text, "Relevé d'identité bancaire");
        assert_eq!(output.confidence, 1.0);

        let pdf = PlainTextOcr.extract(&dir.path().join("scan.pdf")).await;
        assert!(matches!(pdf, Err(CollaboratorError::NotAvailable(_))));
    }
}
