//! External collaborator implementations
//!
//! Each client implements one of the trait seams in [`crate::types`]:
//! - [`HttpOcrClient`], [`PlainTextOcr`]: [`crate::types::OcrEngine`]
//! - [`MistralClient`]: [`crate::types::LlmClassifier`]
//! - [`RegexEntityExtractor`]: [`crate::types::EntityExtractor`]
//!
//! Calls are wrapped by the pipeline in [`call_with_deadline`].

pub mod mistral_client;
pub mod ocr_client;
pub mod regex_extractor;
pub mod retry;

pub use mistral_client::MistralClient;
pub use ocr_client::{HttpOcrClient, PlainTextOcr};
pub use regex_extractor::RegexEntityExtractor;
pub use retry::{call_with_deadline, CallPolicy};
