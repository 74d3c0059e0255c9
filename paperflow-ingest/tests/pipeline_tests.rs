//! Integration tests for the document pipeline
//!
//! Collaborators are replaced by in-process mocks so failures, slow calls
//! and disagreements can be staged deterministically.

mod helpers;

use async_trait::async_trait;
use helpers::{fixed_organizer, write_doc, EDF_INVOICE};
use paperflow_common::events::{EventBus, PaperflowEvent};
use paperflow_ingest::classifier::{RuleError, RuleSet};
use paperflow_ingest::collaborators::{CallPolicy, PlainTextOcr};
use paperflow_ingest::organizer::OrganizationType;
use paperflow_ingest::pipeline::DocumentPipeline;
use paperflow_ingest::types::{
    Category, ClassificationSource, CollaboratorError, EmitterExtraction, EmitterInfo, Entity,
    EntityExtractor, EntityKind, LlmClassifier, LlmVerdict, OcrEngine, OcrOutput,
};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ============================================================================
// Mock collaborators
// ============================================================================

struct FixedLlm {
    category: Category,
    confidence: f64,
}

#[async_trait]
impl LlmClassifier for FixedLlm {
    fn name(&self) -> &'static str {
        "fixed-llm"
    }

    async fn classify(&self, _text: &str) -> Result<LlmVerdict, CollaboratorError> {
        Ok(LlmVerdict {
            category: self.category.clone(),
            confidence: self.confidence,
        })
    }
}

struct DownLlm {
    calls: AtomicU32,
}

#[async_trait]
impl LlmClassifier for DownLlm {
    fn name(&self) -> &'static str {
        "down-llm"
    }

    async fn classify(&self, _text: &str) -> Result<LlmVerdict, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CollaboratorError::Network("connection refused".to_string()))
    }
}

struct SlowLlm;

#[async_trait]
impl LlmClassifier for SlowLlm {
    fn name(&self) -> &'static str {
        "slow-llm"
    }

    async fn classify(&self, _text: &str) -> Result<LlmVerdict, CollaboratorError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(LlmVerdict {
            category: Category::Contrats,
            confidence: 1.0,
        })
    }
}

/// OCR returning canned text and entities
struct CannedOcr {
    text: &'static str,
    entities: Vec<Entity>,
}

#[async_trait]
impl OcrEngine for CannedOcr {
    fn name(&self) -> &'static str {
        "canned-ocr"
    }

    async fn extract(&self, _path: &Path) -> Result<OcrOutput, CollaboratorError> {
        Ok(OcrOutput {
            text: self.text.to_string(),
            confidence: 0.95,
            entities: self.entities.clone(),
        })
    }
}

struct FixedExtractor(&'static str);

#[async_trait]
impl EntityExtractor for FixedExtractor {
    fn name(&self) -> &'static str {
        "fixed-extractor"
    }

    async fn extract_emitter(
        &self,
        _text: &str,
        _category_hint: Option<&Category>,
    ) -> Result<EmitterExtraction, CollaboratorError> {
        let emitter = EmitterInfo::new(self.0, 0.95);
        Ok(EmitterExtraction {
            primary_emitter: Some(emitter.clone()),
            all_emitters: vec![emitter],
            entities: Vec::new(),
        })
    }
}

fn fast_policy() -> CallPolicy {
    CallPolicy {
        deadline: Duration::from_millis(200),
        max_retries: 2,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_rules_only_without_llm() {
    let inbox = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let doc = write_doc(inbox.path(), "facture_edf_janvier.txt", EDF_INVOICE);

    let pipeline = DocumentPipeline::new(Arc::new(PlainTextOcr), fixed_organizer(root.path(), 3))
        .unwrap()
        .with_call_policy(fast_policy());
    let report = pipeline.process_document(&doc).await;

    assert!(report.success(), "{:?}", report.organization.error);
    assert_eq!(report.classification.category, Category::Factures);
    assert_eq!(report.classification.source, ClassificationSource::RulesOnly);
    assert_eq!(report.classification, report.rules);
    assert_eq!(report.emitter.normalized_name, "EDF");
    assert!(report.fallbacks.is_empty());
    assert_eq!(report.organization.organization_type, Some(OrganizationType::MainCategory));
    assert!(root.path().join("factures/facture_edf_janvier.txt").is_file());
    assert!(!doc.exists());
}

#[tokio::test]
async fn test_llm_failure_falls_back_to_rules() {
    let inbox = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let doc = write_doc(inbox.path(), "facture_edf_janvier.txt", EDF_INVOICE);
    let llm = Arc::new(DownLlm {
        calls: AtomicU32::new(0),
    });

    let pipeline = DocumentPipeline::new(Arc::new(PlainTextOcr), fixed_organizer(root.path(), 3))
        .unwrap()
        .with_llm(llm.clone())
        .with_call_policy(fast_policy());
    let report = pipeline.process_document(&doc).await;

    assert!(report.success());
    assert_eq!(report.classification.category, Category::Factures);
    assert_eq!(report.classification.source, ClassificationSource::RulesOnly);
    assert!(report.llm.is_none());
    assert_eq!(report.fallbacks.len(), 1);
    assert_eq!(report.fallbacks[0].collaborator, "down-llm");
    // First attempt plus two retries
    assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_llm_deadline_falls_back_to_rules() {
    let inbox = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let doc = write_doc(inbox.path(), "facture_edf_janvier.txt", EDF_INVOICE);

    let policy = CallPolicy {
        deadline: Duration::from_millis(50),
        max_retries: 0,
        ..fast_policy()
    };
    let pipeline = DocumentPipeline::new(Arc::new(PlainTextOcr), fixed_organizer(root.path(), 3))
        .unwrap()
        .with_llm(Arc::new(SlowLlm))
        .with_call_policy(policy);

    let started = std::time::Instant::now();
    let report = pipeline.process_document(&doc).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.classification.category, Category::Factures);
    assert_eq!(report.fallbacks[0].collaborator, "slow-llm");
    assert!(report.fallbacks[0].reason.contains("Timed out"));
}

#[tokio::test]
async fn test_confident_llm_overrides_rules() {
    let inbox = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let doc = write_doc(inbox.path(), "facture_edf_janvier.txt", EDF_INVOICE);

    let pipeline = DocumentPipeline::new(Arc::new(PlainTextOcr), fixed_organizer(root.path(), 3))
        .unwrap()
        .with_llm(Arc::new(FixedLlm {
            category: Category::Contrats,
            confidence: 0.95,
        }));
    let report = pipeline.process_document(&doc).await;

    assert_eq!(report.rules.category, Category::Factures);
    assert_eq!(report.llm, Some((Category::Contrats, 0.95)));
    assert_eq!(report.classification.category, Category::Contrats);
    assert_eq!(report.classification.source, ClassificationSource::MistralOverride);
    assert!(root.path().join("contrats/facture_edf_janvier.txt").is_file());
}

#[tokio::test]
async fn test_agreement_boosts_confidence() {
    let inbox = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let doc = write_doc(inbox.path(), "facture_edf_janvier.txt", EDF_INVOICE);

    let pipeline = DocumentPipeline::new(Arc::new(PlainTextOcr), fixed_organizer(root.path(), 3))
        .unwrap()
        .with_llm(Arc::new(FixedLlm {
            category: Category::Factures,
            confidence: 0.9,
        }));
    let report = pipeline.process_document(&doc).await;

    assert_eq!(report.classification.category, Category::Factures);
    assert_eq!(report.classification.source, ClassificationSource::AgreementBoost);
    // The invoice saturates the rule score, so the boost hits its cap
    assert_eq!(report.rules.confidence, 1.0);
    assert!((report.classification.confidence - 0.98).abs() < 1e-9);
}

#[tokio::test]
async fn test_unreadable_document_uses_filename_and_unknown_emitter() {
    let inbox = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    // PlainTextOcr cannot read PDFs; the filename still carries the category
    let doc = write_doc(inbox.path(), "facture_edf_2024.pdf", "%PDF-1.7");

    let pipeline = DocumentPipeline::new(Arc::new(PlainTextOcr), fixed_organizer(root.path(), 3))
        .unwrap()
        .with_llm(Arc::new(FixedLlm {
            category: Category::Contrats,
            confidence: 0.99,
        }))
        .with_call_policy(fast_policy());
    let report = pipeline.process_document(&doc).await;

    assert!(report.success());
    assert_eq!(report.classification.category, Category::Factures);
    // LLM is skipped without text
    assert!(report.llm.is_none());
    let collaborators: Vec<&str> = report.fallbacks.iter().map(|f| f.collaborator.as_str()).collect();
    assert_eq!(collaborators, vec!["plain_text", "fixed-llm"]);
    assert_eq!(report.emitter.normalized_name, "inconnu");
    assert!(root.path().join("factures/facture_edf_2024.pdf").is_file());
}

#[tokio::test]
async fn test_emitter_precedence() {
    let inbox = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let ocr = Arc::new(CannedOcr {
        text: EDF_INVOICE,
        entities: vec![Entity::new(EntityKind::Organization, "Engie", 0.8)],
    });

    // OCR entities beat the regex fallback
    let pipeline = DocumentPipeline::new(ocr.clone(), fixed_organizer(root.path(), 3)).unwrap();
    let doc = write_doc(inbox.path(), "a.pdf", "");
    assert_eq!(pipeline.process_document(&doc).await.emitter.normalized_name, "Engie");

    // Extractor collaborator beats OCR entities
    let pipeline = DocumentPipeline::new(ocr, fixed_organizer(root.path(), 3))
        .unwrap()
        .with_extractor(Arc::new(FixedExtractor("Électricité de France")));
    let doc = write_doc(inbox.path(), "b.pdf", "");
    assert_eq!(
        pipeline.process_document(&doc).await.emitter.normalized_name,
        "Electricite_de_France"
    );
}

#[tokio::test]
async fn test_vanished_document_reports_failure() {
    let inbox = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let events = EventBus::new(16);
    let mut rx = events.subscribe();

    let pipeline = DocumentPipeline::new(Arc::new(PlainTextOcr), fixed_organizer(root.path(), 3))
        .unwrap()
        .with_events(events);
    let report = pipeline.process_document(&inbox.path().join("gone.pdf")).await;

    assert!(!report.success());
    assert!(report.organization.error.is_some());
    assert!(matches!(rx.try_recv(), Ok(PaperflowEvent::DocumentFailed { .. })));
}

#[tokio::test]
async fn test_batch_files_in_order_and_emits_events() {
    let inbox = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let events = EventBus::new(64);
    let mut rx = events.subscribe();

    let organizer = Arc::new(
        paperflow_ingest::organizer::DocumentOrganizer::new(
            root.path(),
            Arc::new(paperflow_ingest::organizer::FixedThreshold(2)),
        )
        .with_events(events.clone()),
    );
    let pipeline = DocumentPipeline::new(Arc::new(PlainTextOcr), organizer)
        .unwrap()
        .with_events(events);

    let docs: Vec<_> = (1..=3)
        .map(|i| write_doc(inbox.path(), &format!("facture_EDF_{}.txt", i), EDF_INVOICE))
        .collect();
    let reports = pipeline.process_batch(&docs).await;

    let types: Vec<_> = reports.iter().map(|r| r.organization.organization_type).collect();
    assert_eq!(
        types,
        vec![
            Some(OrganizationType::MainCategory),
            Some(OrganizationType::MainCategory),
            Some(OrganizationType::SubfolderEmitter),
        ]
    );
    assert_eq!(reports[2].organization.swept_files.len(), 2);

    let mut filed = 0;
    let mut created = 0;
    let mut swept = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            PaperflowEvent::DocumentFiled { .. } => filed += 1,
            PaperflowEvent::SubfolderCreated { .. } => created += 1,
            PaperflowEvent::FileSwept { .. } => swept += 1,
            _ => {}
        }
    }
    assert_eq!((filed, created, swept), (3, 1, 2));
}

#[tokio::test]
async fn test_custom_rule_table_replaces_builtin() {
    let inbox = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let rules = RuleSet::from_json(
        r#"{"categories": [{
            "category": "ordonnances",
            "base_weight": 2.0,
            "keywords": ["ordonnance", "posologie"],
            "prefixes": ["ordo"]
        }]}"#,
    )
    .unwrap();
    let doc = write_doc(
        inbox.path(),
        "ordo_mars.txt",
        "Ordonnance\nPosologie : un comprime matin et soir",
    );

    let pipeline = DocumentPipeline::new(Arc::new(PlainTextOcr), fixed_organizer(root.path(), 3))
        .unwrap()
        .with_call_policy(fast_policy())
        .with_rules(rules)
        .unwrap();
    let report = pipeline.process_document(&doc).await;

    assert!(report.success(), "{:?}", report.organization.error);
    assert_eq!(report.classification.category, Category::from("ordonnances"));
    assert!(root.path().join("ordonnances/ordo_mars.txt").is_file());

    // The built-in invoice rules are gone
    let invoice = write_doc(inbox.path(), "facture_edf_janvier.txt", EDF_INVOICE);
    let report = pipeline.process_document(&invoice).await;
    assert_eq!(report.classification.category, Category::NonClasses);
}

#[test]
fn test_invalid_rule_pattern_is_rejected() {
    let root = TempDir::new().unwrap();
    let rules = RuleSet::from_json(
        r#"{"categories": [{"category": "factures", "patterns": ["(unclosed"]}]}"#,
    )
    .unwrap();

    let result = DocumentPipeline::new(Arc::new(PlainTextOcr), fixed_organizer(root.path(), 3))
        .unwrap()
        .with_rules(rules);
    assert!(matches!(result, Err(RuleError::InvalidPattern { .. })));
}
