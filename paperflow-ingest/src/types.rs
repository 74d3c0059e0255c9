//! Core Types and Trait Definitions for Paperflow
//!
//! Defines the data model flowing through the classification-fusion and
//! foldering engine, and the trait seams for the external collaborators:
//! - **OcrEngine:** file → text, confidence, entities
//! - **EntityExtractor:** text → emitters and typed entities
//! - **LlmClassifier:** text → suggested category with confidence

use crate::text::{normalize_emitter_name, normalize_for_match};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Category
// ============================================================================

/// Document category
///
/// A fixed closed set plus `Custom` for dynamically discovered categories.
/// Serialized as its lower-snake-case folder name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Factures,
    Rib,
    RelevesBancaires,
    Contrats,
    Attestations,
    Courriers,
    Rapports,
    Impots,
    Assurances,
    CartesTransport,
    DocumentsPersonnels,
    NonClasses,
    /// Discovered at runtime; holds a lower-snake-case slug
    Custom(String),
}

impl Category {
    /// The fixed categories, in rule-table order
    pub const FIXED: [Category; 12] = [
        Category::Factures,
        Category::Rib,
        Category::RelevesBancaires,
        Category::Contrats,
        Category::Attestations,
        Category::Courriers,
        Category::Rapports,
        Category::Impots,
        Category::Assurances,
        Category::CartesTransport,
        Category::DocumentsPersonnels,
        Category::NonClasses,
    ];

    /// Folder name of this category
    pub fn as_str(&self) -> &str {
        match self {
            Category::Factures => "factures",
            Category::Rib => "rib",
            Category::RelevesBancaires => "releves_bancaires",
            Category::Contrats => "contrats",
            Category::Attestations => "attestations",
            Category::Courriers => "courriers",
            Category::Rapports => "rapports",
            Category::Impots => "impots",
            Category::Assurances => "assurances",
            Category::CartesTransport => "cartes_transport",
            Category::DocumentsPersonnels => "documents_personnels",
            Category::NonClasses => "non_classes",
            Category::Custom(slug) => slug,
        }
    }

    /// Exact folder-name lookup among the fixed categories
    fn fixed_from_str(s: &str) -> Option<Category> {
        Category::FIXED.iter().find(|c| c.as_str() == s).cloned()
    }

    /// Map a free-form label (e.g. LLM output) onto a known category
    ///
    /// Accepts folder names, singular forms and common English synonyms.
    /// Returns `None` for anything unrecognized.
    pub fn from_label(label: &str) -> Option<Category> {
        let key: String = normalize_for_match(label.trim())
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        let key = key.trim_matches('_');

        if let Some(c) = Category::fixed_from_str(key) {
            return Some(c);
        }

        let category = match key {
            "facture" | "invoice" | "invoices" | "bill" => Category::Factures,
            "releve_d_identite_bancaire" | "bank_details" => Category::Rib,
            "releve_bancaire" | "releve" | "bank_statement" | "bank_statements" => {
                Category::RelevesBancaires
            }
            "contrat" | "contract" | "contracts" => Category::Contrats,
            "attestation" | "certificate" | "certificates" => Category::Attestations,
            "courrier" | "letter" | "letters" | "mail" => Category::Courriers,
            "rapport" | "report" | "reports" => Category::Rapports,
            "impot" | "tax" | "taxes" => Category::Impots,
            "assurance" | "insurance" => Category::Assurances,
            "carte_transport" | "transport" | "transport_card" => Category::CartesTransport,
            "document_personnel" | "personal" | "personal_documents" | "identity" => {
                Category::DocumentsPersonnels
            }
            "non_classe" | "unclassified" | "other" | "unknown" => Category::NonClasses,
            _ => return None,
        };
        Some(category)
    }

    pub fn is_unclassified(&self) -> bool {
        matches!(self, Category::NonClasses)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Category::NonClasses;
        }
        Category::fixed_from_str(trimmed).unwrap_or_else(|| Category::Custom(trimmed.to_string()))
    }
}

impl From<&str> for Category {
    fn from(s: &str) -> Self {
        Category::from(s.to_string())
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.as_str().to_string()
    }
}

// ============================================================================
// Entities and emitters
// ============================================================================

/// Kind of extracted entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Date,
    Amount,
    Siret,
    Iban,
    Organization,
    Emitter,
    Other,
}

/// Typed key/value entity with confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub value: String,
    /// Confidence score (0.0-1.0)
    pub confidence: f64,
    /// Checksum/format validation passed (SIRET Luhn, IBAN mod-97, ...)
    #[serde(default = "default_valid")]
    pub valid: bool,
}

fn default_valid() -> bool {
    true
}

impl Entity {
    /// Create new entity with clamped confidence (0.0-1.0)
    pub fn new(kind: EntityKind, value: impl Into<String>, confidence: f64) -> Self {
        Self {
            kind,
            value: value.into(),
            confidence: confidence.clamp(0.0, 1.0),
            valid: true,
        }
    }

    pub fn with_validity(mut self, valid: bool) -> Self {
        self.valid = valid;
        self
    }
}

/// Emitter (issuer) of a document
///
/// `normalized_name` is the join key for counting and folder naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitterInfo {
    pub normalized_name: String,
    pub original_name: String,
    /// Extraction confidence (0.0-1.0)
    pub confidence: f64,
}

impl EmitterInfo {
    /// Build from a raw name; the normalized name is derived
    pub fn new(original_name: impl Into<String>, confidence: f64) -> Self {
        let original_name = original_name.into();
        Self {
            normalized_name: normalize_emitter_name(&original_name),
            original_name,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Which branch of the fusion policy produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    RulesOnly,
    MistralOverride,
    AgreementBoost,
    RulesPriority,
}

impl ClassificationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationSource::RulesOnly => "rules_only",
            ClassificationSource::MistralOverride => "mistral_override",
            ClassificationSource::AgreementBoost => "agreement_boost",
            ClassificationSource::RulesPriority => "rules_priority",
        }
    }
}

impl fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of one document
///
/// Produced once; reclassification produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: Category,
    /// Confidence score (0.0-1.0)
    pub confidence: f64,
    pub source: ClassificationSource,
    /// Rules that fired for the winning category, e.g. `keyword:facture`
    pub matched_rules: Vec<String>,
}

impl ClassificationResult {
    /// Unclassified result with no supporting evidence
    pub fn unclassified() -> Self {
        Self {
            category: Category::NonClasses,
            confidence: 0.0,
            source: ClassificationSource::RulesOnly,
            matched_rules: Vec::new(),
        }
    }
}

// ============================================================================
// Collaborators
// ============================================================================

/// OCR collaborator output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrOutput {
    pub text: String,
    /// Recognition confidence (0.0-1.0)
    pub confidence: f64,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

/// Entity-extraction collaborator output
#[derive(Debug, Clone, Default)]
pub struct EmitterExtraction {
    pub primary_emitter: Option<EmitterInfo>,
    pub all_emitters: Vec<EmitterInfo>,
    pub entities: Vec<Entity>,
}

/// LLM-classification collaborator output
#[derive(Debug, Clone, PartialEq)]
pub struct LlmVerdict {
    pub category: Category,
    /// Model confidence (0.0-1.0)
    pub confidence: f64,
}

/// OCR collaborator
///
/// # Example
/// ```rust,ignore
/// let ocr = HttpOcrClient::new("http://127.0.0.1:8001", Duration::from_secs(30))?;
/// let output = ocr.extract(Path::new("/inbox/scan.pdf")).await?;
/// println!("{} chars at {:.2}", output.text.len(), output.confidence);
/// ```
#[async_trait::async_trait]
pub trait OcrEngine: Send + Sync {
    /// Collaborator name for provenance tracking
    fn name(&self) -> &'static str;

    async fn extract(&self, path: &Path) -> Result<OcrOutput, CollaboratorError>;
}

/// Entity-extraction collaborator
#[async_trait::async_trait]
pub trait EntityExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract_emitter(
        &self,
        text: &str,
        category_hint: Option<&Category>,
    ) -> Result<EmitterExtraction, CollaboratorError>;
}

/// LLM-classification collaborator
#[async_trait::async_trait]
pub trait LlmClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn classify(&self, text: &str) -> Result<LlmVerdict, CollaboratorError>;
}

/// Collaborator call error
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// I/O error (file read)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// Service returned a non-success status
    #[error("API error: {0}")]
    Api(String),

    /// Failed to parse response (malformed JSON, unknown label, ...)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Call exceeded its deadline
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Collaborator not configured or not reachable
    #[error("Collaborator not available: {0}")]
    NotAvailable(String),
}

impl CollaboratorError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CollaboratorError::Network(_) | CollaboratorError::Api(_) | CollaboratorError::Timeout(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
