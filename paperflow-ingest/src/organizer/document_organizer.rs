//! Document Organizer
//!
//! Files classified documents into `{base}/{category}/` or, once an emitter
//! crosses its threshold, `{base}/{category}/{emitter}/`. Creating an
//! emitter subfolder triggers a one-time retroactive sweep of the category
//! folder, after which the emitter's count is recomputed from the subfolder.
//! Documents of the unknown emitter (`inconnu`) always stay at category level.
//!
//! **Counts:** emitter counts are saved to a JSON file after every filing
//! and loaded at startup; the folder tree is the cross-check for emitters
//! that already have a subfolder.
//!
//! **Serialization:** one global mutex covers counter reads, the threshold
//! decision, folder creation, sweep, move and counter update. Two documents
//! for the same emitter can therefore never both create the subfolder, and
//! no count increment is lost.

use super::journal::{EntryKind, Journal, OrganizationLogEntry};
use super::mover::{FileMover, FsMover};
use super::naming::{backup_existing, unique_destination};
use super::sweep::sweep_into;
use super::{FolderThreshold, OrganizerError};
use crate::text::UNKNOWN_EMITTER;
use crate::types::{Category, EmitterInfo};
use chrono::Utc;
use paperflow_common::config::write_atomic;
use paperflow_common::events::{EventBus, PaperflowEvent};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// In-memory organization history size
pub const MAX_HISTORY: usize = 1000;

/// Top-level folders under the base that are never categories
const RESERVED_DIRS: &[&str] = &["logs"];

/// File name of the persisted emitter counts inside the config dir
pub const COUNTS_FILE: &str = "emitter_counts.json";

/// On-disk form of the counts: category → emitter → documents
type StoredCounts = BTreeMap<String, BTreeMap<String, u32>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationType {
    MainCategory,
    SubfolderEmitter,
}

impl OrganizationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizationType::MainCategory => "main_category",
            OrganizationType::SubfolderEmitter => "subfolder_emitter",
        }
    }
}

/// Outcome of [`DocumentOrganizer::organize_document`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrganizationResult {
    pub success: bool,
    pub destination_path: Option<PathBuf>,
    pub folder_created: bool,
    pub organization_type: Option<OrganizationType>,
    /// Documents filed for (category, emitter) after this call
    pub emitter_count: u32,
    pub swept_files: Vec<PathBuf>,
    pub error: Option<String>,
}

impl OrganizationResult {
    /// Failed result for a document the organizer never saw
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            destination_path: None,
            folder_created: false,
            organization_type: None,
            emitter_count: 0,
            swept_files: Vec::new(),
            error: Some(error.into()),
        }
    }

    fn failure(error: &OrganizerError, emitter_count: u32) -> Self {
        Self {
            emitter_count,
            ..Self::failed(error.to_string())
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrganizationStats {
    pub documents_organized: usize,
    pub main_category: usize,
    pub subfolder_emitter: usize,
    pub folders_created: usize,
    pub files_swept: usize,
    pub sweep_failures: usize,
    pub failed_organizations: usize,
    pub by_category: BTreeMap<String, usize>,
}

#[derive(Default)]
struct OrganizerState {
    counts: HashMap<(Category, String), u32>,
    stats: OrganizationStats,
    history: VecDeque<OrganizationLogEntry>,
}

impl OrganizerState {
    fn push_history(&mut self, entry: OrganizationLogEntry) {
        self.history.push_back(entry);
        while self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
    }
}

/// Files documents into the category/emitter tree
pub struct DocumentOrganizer {
    base: PathBuf,
    policy: Arc<dyn FolderThreshold>,
    mover: Arc<dyn FileMover>,
    journal: Option<Journal>,
    counts_file: Option<PathBuf>,
    events: Option<EventBus>,
    state: Mutex<OrganizerState>,
}

impl DocumentOrganizer {
    pub fn new(base: impl Into<PathBuf>, policy: Arc<dyn FolderThreshold>) -> Self {
        Self {
            base: base.into(),
            policy,
            mover: Arc::new(FsMover),
            journal: None,
            counts_file: None,
            events: None,
            state: Mutex::new(OrganizerState::default()),
        }
    }

    /// Append every move to a daily journal in `logs_dir`
    pub fn with_journal(mut self, logs_dir: impl Into<PathBuf>) -> Self {
        self.journal = Some(Journal::new(logs_dir));
        self
    }

    /// Persist emitter counts to `path` after every filing
    pub fn with_counts_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.counts_file = Some(path.into());
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Replace the filesystem mover
    pub fn with_mover(mut self, mover: Arc<dyn FileMover>) -> Self {
        self.mover = mover;
        self
    }

    fn lock(&self) -> MutexGuard<'_, OrganizerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: PaperflowEvent) {
        if let Some(bus) = &self.events {
            bus.emit_lossy(event);
        }
    }

    /// Whole-file rewrite of the counts file, if one is configured
    fn save_counts(&self, counts: &HashMap<(Category, String), u32>) -> Result<(), OrganizerError> {
        let Some(path) = &self.counts_file else {
            return Ok(());
        };
        let mut stored = StoredCounts::new();
        for ((category, emitter), count) in counts {
            stored
                .entry(category.to_string())
                .or_default()
                .insert(emitter.clone(), *count);
        }
        let json = serde_json::to_vec_pretty(&stored)
            .map_err(|e| OrganizerError::Counts(path.clone(), e.to_string()))?;
        write_atomic(path, &json).map_err(|e| OrganizerError::Counts(path.clone(), e.to_string()))
    }

    fn record(&self, state: &mut OrganizerState, entry: OrganizationLogEntry) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append(&entry) {
                warn!(
                    destination = %entry.destination_path.display(),
                    error = %e,
                    "Journal append failed"
                );
            }
        }
        state.push_history(entry);
    }

    /// File one document
    ///
    /// Never panics and never returns `Err`: every failure is reported in
    /// the result, and counters are only touched after a successful move.
    pub fn organize_document(
        &self,
        document_path: &Path,
        category: &Category,
        emitter: Option<&EmitterInfo>,
    ) -> OrganizationResult {
        let mut state = self.lock();

        match self.organize_locked(&mut state, document_path, category, emitter) {
            Ok(result) => result,
            Err(e) => {
                state.stats.failed_organizations += 1;
                let count = emitter
                    .and_then(|em| {
                        state
                            .counts
                            .get(&(category.clone(), em.normalized_name.clone()))
                            .copied()
                    })
                    .unwrap_or(0);
                error!(
                    path = %document_path.display(),
                    category = %category,
                    error = %e,
                    "Document organization failed"
                );
                self.emit(PaperflowEvent::DocumentFailed {
                    path: document_path.to_path_buf(),
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                OrganizationResult::failure(&e, count)
            }
        }
    }

    fn organize_locked(
        &self,
        state: &mut OrganizerState,
        document_path: &Path,
        category: &Category,
        emitter: Option<&EmitterInfo>,
    ) -> Result<OrganizationResult, OrganizerError> {
        if !document_path.exists() {
            return Err(OrganizerError::SourceMissing(document_path.to_path_buf()));
        }
        if !document_path.is_file() {
            return Err(OrganizerError::NotAFile(document_path.to_path_buf()));
        }
        let emitter = emitter.ok_or(OrganizerError::MissingEmitter)?;
        let file_name = document_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| OrganizerError::NotAFile(document_path.to_path_buf()))?;

        let emitter_name = emitter.normalized_name.clone();
        let key = (category.clone(), emitter_name.clone());
        let current = state.counts.get(&key).copied().unwrap_or(0);

        let category_dir = self.base.join(category.as_str());
        let subfolder = category_dir.join(&emitter_name);

        // The policy is only asked while the subfolder does not exist yet
        let unknown = emitter_name == UNKNOWN_EMITTER;
        let subfolder_exists = !unknown && subfolder.is_dir();
        let use_subfolder = !unknown
            && (subfolder_exists || self.policy.should_create_subfolder(category, emitter, current));
        debug!(
            category = %category,
            emitter = %emitter_name,
            current,
            policy = %self.policy.describe(),
            subfolder_exists,
            use_subfolder,
            "Destination decided"
        );

        let mut folder_created = false;
        let mut swept_files = Vec::new();

        let dest_dir = if use_subfolder {
            if !subfolder.is_dir() {
                std::fs::create_dir_all(&subfolder)
                    .map_err(|e| OrganizerError::CreateFolder(subfolder.clone(), e))?;
                folder_created = true;
                state.stats.folders_created += 1;
                info!(
                    category = %category,
                    emitter = %emitter_name,
                    path = %subfolder.display(),
                    "Emitter subfolder created"
                );
                self.emit(PaperflowEvent::SubfolderCreated {
                    path: subfolder.clone(),
                    category: category.to_string(),
                    emitter: emitter_name.clone(),
                    timestamp: Utc::now(),
                });

                swept_files = self.sweep(
                    state,
                    category,
                    &category_dir,
                    &subfolder,
                    &emitter_name,
                    document_path,
                );
            }
            subfolder
        } else {
            std::fs::create_dir_all(&category_dir)
                .map_err(|e| OrganizerError::CreateFolder(category_dir.clone(), e))?;
            category_dir
        };

        // Only a writer outside this process can fill the name between
        // resolution and the move
        let destination = unique_destination(&dest_dir, &file_name);
        let backup = backup_existing(&destination, Utc::now()).map_err(|e| OrganizerError::Move {
            from: destination.clone(),
            to: destination.clone(),
            source: e,
        })?;
        if let Some(backup) = backup {
            warn!(
                destination = %destination.display(),
                backup = %backup.display(),
                "Destination appeared before the move, backup written"
            );
        }

        self.mover
            .move_file(document_path, &destination)
            .map_err(|e| OrganizerError::Move {
                from: document_path.to_path_buf(),
                to: destination.clone(),
                source: e,
            })?;

        let emitter_count = if folder_created {
            // The sweep reorganized the emitter's files; the subfolder is the count
            let on_disk = count_files(&dest_dir) as u32;
            debug!(emitter = %emitter_name, before = current, on_disk, "Emitter count recomputed");
            on_disk
        } else {
            current + 1
        };
        state.counts.insert(key, emitter_count);
        if let Err(e) = self.save_counts(&state.counts) {
            warn!(error = %e, "Emitter counts not saved");
        }

        let organization_type = if use_subfolder {
            OrganizationType::SubfolderEmitter
        } else {
            OrganizationType::MainCategory
        };

        state.stats.documents_organized += 1;
        match organization_type {
            OrganizationType::MainCategory => state.stats.main_category += 1,
            OrganizationType::SubfolderEmitter => state.stats.subfolder_emitter += 1,
        }
        *state.stats.by_category.entry(category.to_string()).or_insert(0) += 1;

        let now = Utc::now();
        self.record(
            state,
            OrganizationLogEntry {
                source_path: document_path.to_path_buf(),
                destination_path: destination.clone(),
                category: category.clone(),
                emitter: emitter_name.clone(),
                timestamp: now,
                kind: EntryKind::Document,
            },
        );

        info!(
            category = %category,
            emitter = %emitter_name,
            destination = %destination.display(),
            organization_type = organization_type.as_str(),
            emitter_count,
            "Document organized"
        );
        self.emit(PaperflowEvent::DocumentFiled {
            source: document_path.to_path_buf(),
            destination: destination.clone(),
            category: category.to_string(),
            emitter: emitter_name,
            organization_type: organization_type.as_str().to_string(),
            timestamp: now,
        });

        Ok(OrganizationResult {
            success: true,
            destination_path: Some(destination),
            folder_created,
            organization_type: Some(organization_type),
            emitter_count,
            swept_files,
            error: None,
        })
    }

    fn sweep(
        &self,
        state: &mut OrganizerState,
        category: &Category,
        category_dir: &Path,
        subfolder: &Path,
        emitter: &str,
        exclude: &Path,
    ) -> Vec<PathBuf> {
        let outcome = sweep_into(category_dir, subfolder, emitter, exclude, self.mover.as_ref());
        state.stats.sweep_failures += outcome.failures;

        let mut swept = Vec::with_capacity(outcome.moved.len());
        for (from, to) in outcome.moved {
            info!(
                from = %from.display(),
                to = %to.display(),
                emitter,
                "File swept into emitter subfolder"
            );
            state.stats.files_swept += 1;
            let now = Utc::now();
            self.record(
                state,
                OrganizationLogEntry {
                    source_path: from.clone(),
                    destination_path: to.clone(),
                    category: category.clone(),
                    emitter: emitter.to_string(),
                    timestamp: now,
                    kind: EntryKind::Sweep,
                },
            );
            self.emit(PaperflowEvent::FileSwept {
                from,
                to: to.clone(),
                emitter: emitter.to_string(),
                timestamp: now,
            });
            swept.push(to);
        }
        swept
    }

    /// Documents filed so far for (category, emitter)
    pub fn emitter_count(&self, category: &Category, emitter: &str) -> u32 {
        self.lock()
            .counts
            .get(&(category.clone(), emitter.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn statistics(&self) -> OrganizationStats {
        self.lock().stats.clone()
    }

    /// Last `n` moves, oldest first
    pub fn recent_history(&self, n: usize) -> Vec<OrganizationLogEntry> {
        let state = self.lock();
        let skip = state.history.len().saturating_sub(n);
        state.history.iter().skip(skip).cloned().collect()
    }

    /// Category → emitter subfolder → file count, read from disk
    pub fn folder_structure(&self) -> BTreeMap<String, BTreeMap<String, usize>> {
        let mut structure: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
        for category_dir in self.category_dirs() {
            let name = dir_name(&category_dir);
            let emitters = structure.entry(name).or_default();
            for emitter_dir in subdirs(&category_dir) {
                emitters.insert(dir_name(&emitter_dir), count_files(&emitter_dir));
            }
        }
        structure
    }

    /// Load counts saved by a previous run; a missing file loads nothing
    ///
    /// Returns the number of (category, emitter) pairs loaded.
    pub fn load_counts(&self) -> Result<usize, OrganizerError> {
        let Some(path) = &self.counts_file else {
            return Ok(0);
        };
        if !path.exists() {
            debug!(path = %path.display(), "No saved emitter counts");
            return Ok(0);
        }

        let content = std::fs::read_to_string(path)?;
        let stored: StoredCounts = serde_json::from_str(&content)
            .map_err(|e| OrganizerError::Counts(path.clone(), e.to_string()))?;

        let counts: HashMap<(Category, String), u32> = stored
            .into_iter()
            .flat_map(|(category, emitters)| {
                let category = Category::from(category);
                emitters
                    .into_iter()
                    .map(move |(emitter, count)| ((category.clone(), emitter), count))
            })
            .collect();

        let pairs = counts.len();
        self.lock().counts = counts;
        info!(path = %path.display(), pairs, "Emitter counts loaded");
        Ok(pairs)
    }

    /// Cross-check counts against the folder tree
    ///
    /// Every `{category}/{emitter}/` subfolder sets its pair's count to the
    /// files it holds. Emitters without a subfolder keep their loaded count,
    /// since their documents sit unlabelled at category level. Returns the
    /// number of subfolders found.
    pub fn reconcile_counts_with_disk(&self) -> Result<usize, OrganizerError> {
        if !self.base.is_dir() {
            return Err(OrganizerError::SourceMissing(self.base.clone()));
        }

        let mut on_disk = Vec::new();
        for category_dir in self.category_dirs() {
            let category = Category::from(dir_name(&category_dir));
            for emitter_dir in subdirs(&category_dir) {
                let files = count_files(&emitter_dir) as u32;
                on_disk.push(((category.clone(), dir_name(&emitter_dir)), files));
            }
        }

        let subfolders = on_disk.len();
        let mut state = self.lock();
        let mut corrected = 0usize;
        for (key, files) in on_disk {
            let previous = state.counts.insert(key.clone(), files);
            if previous.is_some_and(|p| p != files) {
                warn!(
                    category = %key.0,
                    emitter = %key.1,
                    saved = previous.unwrap_or(0),
                    on_disk = files,
                    "Emitter count differs from folder tree, using folder tree"
                );
                corrected += 1;
            }
        }
        if corrected > 0 {
            if let Err(e) = self.save_counts(&state.counts) {
                warn!(error = %e, "Emitter counts not saved");
            }
        }
        info!(base = %self.base.display(), subfolders, corrected, "Emitter counts checked against folder tree");
        Ok(subfolders)
    }

    fn category_dirs(&self) -> Vec<PathBuf> {
        subdirs(&self.base)
            .into_iter()
            .filter(|p| {
                let name = dir_name(p);
                !name.starts_with('.')
                    && !name.starts_with('_')
                    && !RESERVED_DIRS.contains(&name.as_str())
            })
            .collect()
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn subdirs(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect()
}

fn count_files(dir: &Path) -> usize {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organizer::FixedThreshold;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    struct FailingMover;

    impl FileMover for FailingMover {
        fn move_file(&self, _from: &Path, _to: &Path) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        }
    }

    /// Fixed threshold that counts how often it is asked
    struct CountingThreshold {
        threshold: u32,
        asked: AtomicU32,
    }

    impl FolderThreshold for CountingThreshold {
        fn should_create_subfolder(
            &self,
            _category: &Category,
            _emitter: &EmitterInfo,
            current_count: u32,
        ) -> bool {
            self.asked.fetch_add(1, Ordering::SeqCst);
            current_count >= self.threshold
        }

        fn describe(&self) -> String {
            "counting".to_string()
        }
    }

    fn setup(threshold: u32) -> (TempDir, TempDir, DocumentOrganizer) {
        let base = TempDir::new().unwrap();
        let inbox = TempDir::new().unwrap();
        let organizer = DocumentOrganizer::new(base.path(), Arc::new(FixedThreshold(threshold)));
        (base, inbox, organizer)
    }

    fn drop_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, name.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_first_document_goes_to_category() {
        let (base, inbox, organizer) = setup(3);
        let doc = drop_file(inbox.path(), "facture.pdf");
        let edf = EmitterInfo::new("EDF", 0.9);

        let result = organizer.organize_document(&doc, &Category::Factures, Some(&edf));
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.organization_type, Some(OrganizationType::MainCategory));
        assert_eq!(result.destination_path, Some(base.path().join("factures/facture.pdf")));
        assert_eq!(result.emitter_count, 1);
        assert!(!doc.exists());
    }

    #[test]
    fn test_missing_source_is_failure() {
        let (_base, inbox, organizer) = setup(3);
        let edf = EmitterInfo::new("EDF", 0.9);
        let result = organizer.organize_document(
            &inbox.path().join("vanished.pdf"),
            &Category::Factures,
            Some(&edf),
        );
        assert!(!result.success);
        assert!(result.error.unwrap().contains("vanished.pdf"));
        assert_eq!(organizer.statistics().failed_organizations, 1);
    }

    #[test]
    fn test_directory_source_is_failure() {
        let (_base, inbox, organizer) = setup(3);
        let edf = EmitterInfo::new("EDF", 0.9);
        let result = organizer.organize_document(inbox.path(), &Category::Factures, Some(&edf));
        assert!(!result.success);
    }

    #[test]
    fn test_missing_emitter_is_failure() {
        let (_base, inbox, organizer) = setup(3);
        let doc = drop_file(inbox.path(), "facture.pdf");
        let result = organizer.organize_document(&doc, &Category::Factures, None);
        assert!(!result.success);
        assert!(doc.exists());
    }

    #[test]
    fn test_failed_move_leaves_counts_unchanged() {
        let (_base, inbox, organizer) = setup(3);
        let organizer = organizer.with_mover(Arc::new(FailingMover));
        let doc = drop_file(inbox.path(), "facture.pdf");
        let edf = EmitterInfo::new("EDF", 0.9);

        let result = organizer.organize_document(&doc, &Category::Factures, Some(&edf));
        assert!(!result.success);
        assert_eq!(result.emitter_count, 0);
        assert_eq!(organizer.emitter_count(&Category::Factures, "EDF"), 0);
        assert_eq!(organizer.statistics().documents_organized, 0);
        assert!(organizer.recent_history(10).is_empty());
        assert!(doc.exists());
    }

    #[test]
    fn test_existing_subfolder_is_used_below_threshold() {
        let (base, inbox, organizer) = setup(10);
        std::fs::create_dir_all(base.path().join("factures/EDF")).unwrap();
        let doc = drop_file(inbox.path(), "edf.pdf");
        let edf = EmitterInfo::new("EDF", 0.9);

        let result = organizer.organize_document(&doc, &Category::Factures, Some(&edf));
        assert_eq!(result.organization_type, Some(OrganizationType::SubfolderEmitter));
        assert!(!result.folder_created);
        assert!(result.swept_files.is_empty());
    }

    #[test]
    fn test_collision_gets_suffix() {
        let (base, inbox, organizer) = setup(10);
        let edf = EmitterInfo::new("EDF", 0.9);
        let other = TempDir::new().unwrap();

        let first = drop_file(inbox.path(), "scan.pdf");
        let second = drop_file(other.path(), "scan.pdf");
        organizer.organize_document(&first, &Category::Factures, Some(&edf));
        let result = organizer.organize_document(&second, &Category::Factures, Some(&edf));

        assert_eq!(result.destination_path, Some(base.path().join("factures/scan_1.pdf")));
        assert_eq!(organizer.emitter_count(&Category::Factures, "EDF"), 2);
    }

    #[test]
    fn test_reconcile_counts_and_structure() {
        let (base, _inbox, organizer) = setup(3);
        let edf = base.path().join("factures/EDF");
        std::fs::create_dir_all(&edf).unwrap();
        std::fs::write(edf.join("a.pdf"), b"a").unwrap();
        std::fs::write(edf.join("b.pdf"), b"b").unwrap();
        std::fs::create_dir_all(base.path().join("rib/BNP")).unwrap();
        std::fs::create_dir_all(base.path().join("logs")).unwrap();
        std::fs::create_dir_all(base.path().join("_inbox")).unwrap();

        let subfolders = organizer.reconcile_counts_with_disk().unwrap();
        assert_eq!(subfolders, 2);
        assert_eq!(organizer.emitter_count(&Category::Factures, "EDF"), 2);
        assert_eq!(organizer.emitter_count(&Category::Rib, "BNP"), 0);

        let structure = organizer.folder_structure();
        assert_eq!(structure.len(), 2);
        assert_eq!(structure["factures"]["EDF"], 2);
    }

    #[test]
    fn test_journal_written() {
        let (base, inbox, organizer) = setup(3);
        let logs = base.path().join("logs");
        let organizer = organizer.with_journal(&logs);
        let doc = drop_file(inbox.path(), "facture.pdf");
        let edf = EmitterInfo::new("EDF", 0.9);

        organizer.organize_document(&doc, &Category::Factures, Some(&edf));

        let entries = Journal::new(&logs).read_day(Utc::now()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::Document);
        assert_eq!(organizer.recent_history(5).len(), 1);
    }

    #[test]
    fn test_policy_not_asked_once_subfolder_exists() {
        let base = TempDir::new().unwrap();
        let inbox = TempDir::new().unwrap();
        let policy = Arc::new(CountingThreshold {
            threshold: 1,
            asked: AtomicU32::new(0),
        });
        let organizer = DocumentOrganizer::new(base.path(), policy.clone());
        let edf = EmitterInfo::new("EDF", 0.9);

        for i in 0..5 {
            let doc = drop_file(inbox.path(), &format!("edf_{}.pdf", i));
            let result = organizer.organize_document(&doc, &Category::Factures, Some(&edf));
            assert!(result.success, "{:?}", result.error);
        }

        // Asked for the first document and the one that created the folder
        assert_eq!(policy.asked.load(Ordering::SeqCst), 2);
        assert_eq!(organizer.emitter_count(&Category::Factures, "EDF"), 5);
    }

    #[test]
    fn test_unknown_emitter_stays_at_category_level() {
        let (base, inbox, organizer) = setup(1);
        let unknown = EmitterInfo::new(UNKNOWN_EMITTER, 0.0);

        for i in 0..3 {
            let doc = drop_file(inbox.path(), &format!("scan_{}.pdf", i));
            let result = organizer.organize_document(&doc, &Category::Courriers, Some(&unknown));
            assert_eq!(result.organization_type, Some(OrganizationType::MainCategory));
            assert!(!result.folder_created);
        }

        assert!(!base.path().join("courriers").join(UNKNOWN_EMITTER).exists());
        assert_eq!(organizer.statistics().folders_created, 0);
    }

    #[test]
    fn test_sweep_recomputes_count_from_subfolder() {
        let (base, inbox, organizer) = setup(1);
        let factures = base.path().join("factures");
        std::fs::create_dir_all(&factures).unwrap();
        for year in ["2021", "2022", "2023"] {
            std::fs::write(factures.join(format!("edf_{}.pdf", year)), b"old").unwrap();
        }
        let edf = EmitterInfo::new("EDF", 0.9);

        let first = drop_file(inbox.path(), "facture_edf_a.pdf");
        let result = organizer.organize_document(&first, &Category::Factures, Some(&edf));
        assert_eq!(result.organization_type, Some(OrganizationType::MainCategory));
        assert_eq!(result.emitter_count, 1);

        let second = drop_file(inbox.path(), "facture_edf_b.pdf");
        let result = organizer.organize_document(&second, &Category::Factures, Some(&edf));
        assert!(result.folder_created);
        assert_eq!(result.swept_files.len(), 4);
        assert_eq!(result.emitter_count, 5);
        assert_eq!(organizer.emitter_count(&Category::Factures, "EDF"), 5);

        // Folder tree agrees with memory
        organizer.reconcile_counts_with_disk().unwrap();
        assert_eq!(organizer.emitter_count(&Category::Factures, "EDF"), 5);
    }

    #[test]
    fn test_counts_reloaded_below_threshold() {
        let (base, inbox, _) = setup(3);
        let config = TempDir::new().unwrap();
        let counts_file = config.path().join(COUNTS_FILE);
        let edf = EmitterInfo::new("EDF", 0.9);

        let organizer = DocumentOrganizer::new(base.path(), Arc::new(FixedThreshold(2)))
            .with_counts_file(&counts_file);
        for name in ["edf_janvier.pdf", "edf_fevrier.pdf"] {
            let doc = drop_file(inbox.path(), name);
            let result = organizer.organize_document(&doc, &Category::Factures, Some(&edf));
            assert_eq!(result.organization_type, Some(OrganizationType::MainCategory));
        }
        assert!(counts_file.exists());
        drop(organizer);

        // Next run: no subfolder yet, so only the saved file knows the count
        let restarted = DocumentOrganizer::new(base.path(), Arc::new(FixedThreshold(2)))
            .with_counts_file(&counts_file);
        assert_eq!(restarted.load_counts().unwrap(), 1);
        assert_eq!(restarted.reconcile_counts_with_disk().unwrap(), 0);
        assert_eq!(restarted.emitter_count(&Category::Factures, "EDF"), 2);

        let doc = drop_file(inbox.path(), "edf_mars.pdf");
        let result = restarted.organize_document(&doc, &Category::Factures, Some(&edf));
        assert_eq!(result.organization_type, Some(OrganizationType::SubfolderEmitter));
        assert!(result.folder_created);
        assert_eq!(result.emitter_count, 3);
    }

    #[test]
    fn test_reconcile_prefers_folder_tree_for_subfolders() {
        let (base, _inbox, _) = setup(3);
        let config = TempDir::new().unwrap();
        let counts_file = config.path().join(COUNTS_FILE);
        std::fs::write(
            &counts_file,
            r#"{"factures": {"EDF": 7, "Orange": 2}}"#,
        )
        .unwrap();
        let edf = base.path().join("factures/EDF");
        std::fs::create_dir_all(&edf).unwrap();
        std::fs::write(edf.join("a.pdf"), b"a").unwrap();

        let organizer = DocumentOrganizer::new(base.path(), Arc::new(FixedThreshold(3)))
            .with_counts_file(&counts_file);
        assert_eq!(organizer.load_counts().unwrap(), 2);
        organizer.reconcile_counts_with_disk().unwrap();

        assert_eq!(organizer.emitter_count(&Category::Factures, "EDF"), 1);
        assert_eq!(organizer.emitter_count(&Category::Factures, "Orange"), 2);
        let saved = std::fs::read_to_string(&counts_file).unwrap();
        assert!(saved.contains("\"EDF\": 1"), "{}", saved);
    }

    #[test]
    fn test_corrupt_counts_file_is_error() {
        let (base, _inbox, _) = setup(3);
        let config = TempDir::new().unwrap();
        let counts_file = config.path().join(COUNTS_FILE);
        std::fs::write(&counts_file, b"not json").unwrap();

        let organizer = DocumentOrganizer::new(base.path(), Arc::new(FixedThreshold(3)))
            .with_counts_file(&counts_file);
        assert!(matches!(organizer.load_counts(), Err(OrganizerError::Counts(..))));
        assert_eq!(organizer.emitter_count(&Category::Factures, "EDF"), 0);
    }
}
