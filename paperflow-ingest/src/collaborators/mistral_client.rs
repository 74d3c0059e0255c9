//! Mistral LLM classifier
//!
//! Talks to an Ollama-compatible server:
//! `POST {url}/api/generate` with `{"model", "prompt", "stream": false, "format": "json"}`.
//! The generated text in `response` should be a JSON object
//! `{"document_type": ..., "confidence": ...}`; models sometimes wrap it in
//! prose, so the first balanced `{...}` block is parsed.
//!
//! Unknown labels and out-of-range confidences are errors, which the
//! pipeline treats as "LLM unavailable".

use crate::types::{Category, CollaboratorError, LlmClassifier, LlmVerdict};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Characters of document text sent to the model
const MAX_PROMPT_CHARS: usize = 4000;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct Verdict {
    document_type: String,
    confidence: f64,
}

/// LLM classification client
pub struct MistralClient {
    http_client: Client,
    base_url: String,
    model: String,
}

impl MistralClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CollaboratorError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollaboratorError::NotAvailable(format!("HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }
}

/// Classification prompt for `text`
pub fn build_prompt(text: &str) -> String {
    let excerpt: String = text.chars().take(MAX_PROMPT_CHARS).collect();
    let labels: Vec<&str> = Category::FIXED.iter().map(|c| c.as_str()).collect();
    format!(
        "Classify this French administrative document.\n\
         Allowed document types: {}.\n\
         Answer with JSON only: {{\"document_type\": \"<type>\", \"confidence\": <0.0-1.0>}}.\n\n\
         Document:\n{}",
        labels.join(", "),
        excerpt
    )
}

/// First balanced `{...}` block of `s`, ignoring braces inside strings
fn first_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in s[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse the model's generated text into a verdict
pub fn parse_verdict(generated: &str) -> Result<LlmVerdict, CollaboratorError> {
    let block = first_json_object(generated).ok_or_else(|| {
        CollaboratorError::Parse(format!("No JSON object in LLM output: {:.80}", generated))
    })?;
    let verdict: Verdict = serde_json::from_str(block)
        .map_err(|e| CollaboratorError::Parse(format!("Malformed LLM verdict: {}", e)))?;

    let category = Category::from_label(&verdict.document_type).ok_or_else(|| {
        CollaboratorError::Parse(format!("Unknown document type '{}'", verdict.document_type))
    })?;
    if !(0.0..=1.0).contains(&verdict.confidence) {
        return Err(CollaboratorError::Parse(format!(
            "Confidence {} outside [0, 1]",
            verdict.confidence
        )));
    }

    Ok(LlmVerdict {
        category,
        confidence: verdict.confidence,
    })
}

#[async_trait]
impl LlmClassifier for MistralClient {
    fn name(&self) -> &'static str {
        "mistral"
    }

    async fn classify(&self, text: &str) -> Result<LlmVerdict, CollaboratorError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: build_prompt(text),
            stream: false,
            format: "json",
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| CollaboratorError::Network(format!("LLM request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Api(format!(
                "LLM server returned error {}: {}",
                status, body
            )));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Parse(format!("Failed to parse LLM response: {}", e)))?;
        let verdict = parse_verdict(&generated.response)?;

        debug!(
            model = %self.model,
            category = %verdict.category,
            confidence = verdict.confidence,
            "LLM classification complete"
        );
        Ok(verdict)
    }
}
