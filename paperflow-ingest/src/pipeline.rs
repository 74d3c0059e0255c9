//! Document Pipeline
//!
//! Drives one document through the engine:
//! 1. OCR (deadline-bounded, retried)
//! 2. Rule-based classification on filename + text
//! 3. LLM classification (deadline-bounded; any failure = unavailable)
//! 4. Fusion of both results
//! 5. Emitter extraction (collaborator, then OCR entities, then regex)
//! 6. Filing through the organizer on the blocking pool
//!
//! # Error Handling
//! - Collaborator failures degrade to local fallbacks, each recorded in the
//!   report and emitted as `ClassificationFallback`
//! - A document that vanished before processing yields a failed report
//! - Nothing here returns `Err`; the report carries the outcome
//!
//! # Example
//! ```rust,ignore
//! let pipeline = DocumentPipeline::new(Arc::new(PlainTextOcr), organizer)?
//!     .with_llm(Arc::new(MistralClient::new(url, "mistral", timeout)?));
//! let report = pipeline.process_document(Path::new("/inbox/facture.pdf")).await;
//! ```

use crate::classifier::{
    CategoryDiscovery, EmergingCategory, RuleBasedClassifier, RuleError, RuleSet,
};
use crate::collaborators::{call_with_deadline, CallPolicy, RegexEntityExtractor};
use crate::fusion::FusionPolicy;
use crate::organizer::{DocumentOrganizer, OrganizationResult};
use crate::text::UNKNOWN_EMITTER;
use crate::types::{
    Category, ClassificationResult, CollaboratorError, EmitterInfo, Entity, EntityExtractor,
    EntityKind, LlmClassifier, LlmVerdict, OcrEngine, OcrOutput,
};
use chrono::Utc;
use paperflow_common::events::{EventBus, PaperflowEvent};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A collaborator failure that was replaced by a local fallback
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fallback {
    pub collaborator: String,
    pub reason: String,
}

/// Outcome of processing one document
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingReport {
    pub run_id: Uuid,
    pub path: PathBuf,
    /// Rule-only classification, before fusion
    pub rules: ClassificationResult,
    pub llm: Option<(Category, f64)>,
    /// Final classification
    pub classification: ClassificationResult,
    pub emitter: EmitterInfo,
    pub organization: OrganizationResult,
    pub fallbacks: Vec<Fallback>,
}

impl ProcessingReport {
    pub fn success(&self) -> bool {
        self.organization.success
    }
}

struct ClassifierState {
    classifier: RuleBasedClassifier,
    rules: RuleSet,
    discovery: Option<CategoryDiscovery>,
}

/// One-document-at-a-time processing pipeline
pub struct DocumentPipeline {
    ocr: Arc<dyn OcrEngine>,
    llm: Option<Arc<dyn LlmClassifier>>,
    extractor: Option<Arc<dyn EntityExtractor>>,
    regex_extractor: RegexEntityExtractor,
    fusion: FusionPolicy,
    organizer: Arc<DocumentOrganizer>,
    classifier: Mutex<ClassifierState>,
    call_policy: CallPolicy,
    events: Option<EventBus>,
}

impl DocumentPipeline {
    pub fn new(
        ocr: Arc<dyn OcrEngine>,
        organizer: Arc<DocumentOrganizer>,
    ) -> Result<Self, CollaboratorError> {
        Ok(Self {
            ocr,
            llm: None,
            extractor: None,
            regex_extractor: RegexEntityExtractor::new()?,
            fusion: FusionPolicy::new(),
            organizer,
            classifier: Mutex::new(ClassifierState {
                classifier: RuleBasedClassifier::new(),
                rules: RuleSet::default(),
                discovery: None,
            }),
            call_policy: CallPolicy::default(),
            events: None,
        })
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClassifier>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Primary entity extractor; the regex extractor remains the fallback
    pub fn with_extractor(mut self, extractor: Arc<dyn EntityExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_fusion(mut self, fusion: FusionPolicy) -> Self {
        self.fusion = fusion;
        self
    }

    pub fn with_call_policy(mut self, policy: CallPolicy) -> Self {
        self.call_policy = policy;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Replace the rule table
    pub fn with_rules(self, rules: RuleSet) -> Result<Self, RuleError> {
        let classifier = RuleBasedClassifier::from_rules(&rules)?;
        {
            let mut state = self.lock_classifier();
            state.classifier = classifier;
            state.rules = rules;
        }
        Ok(self)
    }

    /// Track unclassified documents for emerging categories
    pub fn with_discovery(self, discovery: CategoryDiscovery) -> Self {
        self.lock_classifier().discovery = Some(discovery);
        self
    }

    fn lock_classifier(&self) -> MutexGuard<'_, ClassifierState> {
        self.classifier.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn fallback(
        &self,
        fallbacks: &mut Vec<Fallback>,
        path: &Path,
        collaborator: &str,
        reason: String,
    ) {
        warn!(
            path = %path.display(),
            collaborator,
            reason = %reason,
            "Collaborator unavailable, using fallback"
        );
        if let Some(bus) = &self.events {
            bus.emit_lossy(PaperflowEvent::ClassificationFallback {
                path: path.to_path_buf(),
                collaborator: collaborator.to_string(),
                reason: reason.clone(),
                timestamp: Utc::now(),
            });
        }
        fallbacks.push(Fallback {
            collaborator: collaborator.to_string(),
            reason,
        });
    }

    /// Process one document end to end
    pub async fn process_document(&self, path: &Path) -> ProcessingReport {
        let run_id = Uuid::new_v4();
        let mut fallbacks = Vec::new();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!(run_id = %run_id, path = %path.display(), "Processing document");

        if !path.is_file() {
            let error = format!("Document vanished before processing: {}", path.display());
            warn!(run_id = %run_id, "{}", error);
            if let Some(bus) = &self.events {
                bus.emit_lossy(PaperflowEvent::DocumentFailed {
                    path: path.to_path_buf(),
                    error: error.clone(),
                    timestamp: Utc::now(),
                });
            }
            return ProcessingReport {
                run_id,
                path: path.to_path_buf(),
                rules: ClassificationResult::unclassified(),
                llm: None,
                classification: ClassificationResult::unclassified(),
                emitter: EmitterInfo::new(UNKNOWN_EMITTER, 0.0),
                organization: OrganizationResult::failed(error),
                fallbacks,
            };
        }

        // 1. OCR
        let ocr = &self.ocr;
        let ocr_result = call_with_deadline(ocr.name(), &self.call_policy, || ocr.extract(path)).await;
        let ocr_output = match ocr_result {
            Ok(output) => output,
            Err(e) => {
                self.fallback(&mut fallbacks, path, ocr.name(), e.to_string());
                OcrOutput::default()
            }
        };

        // 2. Rules
        let rules = self
            .lock_classifier()
            .classifier
            .classify(&filename, &ocr_output.text, &ocr_output.entities);

        // 3. LLM
        let llm_verdict = self.classify_with_llm(path, &ocr_output.text, &mut fallbacks).await;

        // 4. Fusion
        let classification = self.fusion.fuse(&rules, llm_verdict.as_ref());
        info!(
            run_id = %run_id,
            path = %path.display(),
            category = %classification.category,
            confidence = classification.confidence,
            source = %classification.source,
            "Document classified"
        );

        if let Some(discovery) = self.lock_classifier().discovery.as_mut() {
            discovery.observe(&filename, &ocr_output.text, &classification);
        }

        // 5. Emitter
        let emitter = self
            .resolve_emitter(path, &ocr_output, &classification.category, &mut fallbacks)
            .await;

        // 6. Organize on the blocking pool; the organizer holds a std mutex
        let organizer = self.organizer.clone();
        let owned_path = path.to_path_buf();
        let category = classification.category.clone();
        let owned_emitter = emitter.clone();
        let organization = tokio::task::spawn_blocking(move || {
            organizer.organize_document(&owned_path, &category, Some(&owned_emitter))
        })
        .await
        .unwrap_or_else(|e| OrganizationResult::failed(format!("Organizer task failed: {}", e)));

        ProcessingReport {
            run_id,
            path: path.to_path_buf(),
            rules,
            llm: llm_verdict.map(|v| (v.category, v.confidence)),
            classification,
            emitter,
            organization,
            fallbacks,
        }
    }

    /// Process documents one after another, in order
    pub async fn process_batch(&self, paths: &[PathBuf]) -> Vec<ProcessingReport> {
        let mut reports = Vec::with_capacity(paths.len());
        for path in paths {
            reports.push(self.process_document(path).await);
        }
        reports
    }

    async fn classify_with_llm(
        &self,
        path: &Path,
        text: &str,
        fallbacks: &mut Vec<Fallback>,
    ) -> Option<LlmVerdict> {
        let llm = self.llm.as_ref()?;
        if text.trim().is_empty() {
            self.fallback(fallbacks, path, llm.name(), "no text to classify".to_string());
            return None;
        }
        match call_with_deadline(llm.name(), &self.call_policy, || llm.classify(text)).await {
            Ok(verdict) => Some(verdict),
            Err(e) => {
                self.fallback(fallbacks, path, llm.name(), e.to_string());
                None
            }
        }
    }

    async fn resolve_emitter(
        &self,
        path: &Path,
        ocr: &OcrOutput,
        category: &Category,
        fallbacks: &mut Vec<Fallback>,
    ) -> EmitterInfo {
        if let Some(extractor) = &self.extractor {
            let outcome = call_with_deadline(extractor.name(), &self.call_policy, || {
                extractor.extract_emitter(&ocr.text, Some(category))
            })
            .await;
            match outcome {
                Ok(extraction) => match extraction.primary_emitter {
                    Some(emitter) => return emitter,
                    None => self.fallback(
                        fallbacks,
                        path,
                        extractor.name(),
                        "no emitter found".to_string(),
                    ),
                },
                Err(e) => self.fallback(fallbacks, path, extractor.name(), e.to_string()),
            }
        }

        if let Some(emitter) = emitter_from_entities(&ocr.entities) {
            return emitter;
        }

        if let Some(emitter) = self
            .regex_extractor
            .emitters(&ocr.text, Some(category))
            .into_iter()
            .next()
        {
            return emitter;
        }

        debug!(path = %path.display(), "No emitter found, filing as {}", UNKNOWN_EMITTER);
        EmitterInfo::new(UNKNOWN_EMITTER, 0.0)
    }

    /// Register every current proposal as a `Custom` category
    pub fn register_discovered_categories(&self) -> Result<Vec<EmergingCategory>, RuleError> {
        let mut state = self.lock_classifier();
        let proposals = match &state.discovery {
            Some(discovery) => discovery.proposals(&state.rules),
            None => return Ok(Vec::new()),
        };

        for proposal in &proposals {
            let rules = proposal.to_rules();
            state.classifier.register_category(&rules)?;
            state.rules.categories.push(rules);
            if let Some(discovery) = state.discovery.as_mut() {
                discovery.mark_registered(proposal);
            }
        }
        Ok(proposals)
    }

    /// Categories the classifier currently knows
    pub fn categories(&self) -> Vec<Category> {
        self.lock_classifier().classifier.categories()
    }
}

/// Most confident emitter or organization entity supplied by OCR
fn emitter_from_entities(entities: &[Entity]) -> Option<EmitterInfo> {
    entities
        .iter()
        .filter(|e| matches!(e.kind, EntityKind::Emitter | EntityKind::Organization))
        .filter(|e| !e.value.trim().is_empty())
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .map(|e| EmitterInfo::new(e.value.trim(), e.confidence))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitter_from_entities_prefers_confidence() {
        let entities = vec![
            Entity::new(EntityKind::Organization, "Engie", 0.6),
            Entity::new(EntityKind::Date, "01/01/2024", 0.99),
            Entity::new(EntityKind::Emitter, "EDF", 0.9),
        ];
        let emitter = emitter_from_entities(&entities).unwrap();
        assert_eq!(emitter.normalized_name, "EDF");
        assert_eq!(emitter.confidence, 0.9);
    }

    #[test]
    fn test_emitter_from_entities_none() {
        assert!(emitter_from_entities(&[Entity::new(EntityKind::Amount, "12 €", 0.9)]).is_none());
    }
}
