//! paperflow-ingest - Document classification and filing service
//!
//! Scans an inbox of scanned administrative documents, classifies each one
//! (rules fused with an optional LLM verdict), extracts the emitter and files
//! the document into `{root}/{category}/` or `{root}/{category}/{emitter}/`
//! once the emitter has enough documents.
//!
//! Runs a single pass by default; `--watch` keeps polling the inbox until
//! Ctrl+C or SIGTERM.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use paperflow_common::config::{
    default_config_file, load_toml_config, user_config_file, write_toml_config,
    RootFolderInitializer, RootFolderResolver, TomlConfig,
};
use paperflow_common::events::EventBus;
use paperflow_ingest::classifier::{CategoryDiscovery, DiscoveryConfig, RuleSet};
use paperflow_ingest::collaborators::{CallPolicy, HttpOcrClient, MistralClient, PlainTextOcr};
use paperflow_ingest::fusion::{FusionPolicy, FusionThresholds};
use paperflow_ingest::organizer::{DocumentOrganizer, FixedThreshold, FolderThreshold, COUNTS_FILE};
use paperflow_ingest::pipeline::DocumentPipeline;
use paperflow_ingest::scanner::InboxScanner;
use paperflow_ingest::thresholds::ThresholdManager;
use paperflow_ingest::types::OcrEngine;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Files younger than this are assumed to be still copying into the inbox
const WATCH_MIN_FILE_AGE: Duration = Duration::from_secs(2);

/// Command-line arguments for paperflow-ingest
#[derive(Parser, Debug)]
#[command(name = "paperflow-ingest")]
#[command(about = "Classify scanned documents and file them by category and emitter")]
#[command(version)]
struct Args {
    /// Root folder of the document tree
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Inbox folder (default: {root}/_inbox)
    #[arg(short, long)]
    inbox: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long, env = "PAPERFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Keep polling the inbox until interrupted
    #[arg(short, long)]
    watch: bool,

    /// Seconds between inbox scans in watch mode
    #[arg(long, default_value = "10", env = "PAPERFLOW_POLL_SECS")]
    poll_secs: u64,

    /// Fixed subfolder threshold; disables adaptive thresholds
    #[arg(short, long)]
    threshold: Option<u32>,

    /// Classify with rules only
    #[arg(long)]
    no_llm: bool,

    /// Propose and register categories for recurring unclassified documents
    #[arg(long)]
    discover: bool,

    /// JSON rule table replacing the built-in one
    #[arg(long, env = "PAPERFLOW_RULES")]
    rules: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_file);
    // The log level lives in the config, so its own warnings go to a
    // temporary stderr subscriber
    let config = tracing::subscriber::with_default(
        tracing_subscriber::fmt().with_writer(std::io::stderr).finish(),
        || match &config_path {
            Some(path) => load_toml_config(path)
                .with_context(|| format!("Failed to load config {}", path.display())),
            None => Ok(TomlConfig::default()),
        },
    )?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("paperflow_ingest={}", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting paperflow-ingest {}", env!("CARGO_PKG_VERSION"));
    info!(
        git = env!("GIT_HASH"),
        built = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        "Build"
    );
    if let Some(path) = &config_path {
        info!("Config: {}", path.display());
    }

    // Resolve and lay out the root folder
    let root = RootFolderResolver::new("paperflow-ingest")
        .with_cli_arg(args.root.clone())
        .with_config_file(config_path.clone())
        .resolve();
    let initializer = RootFolderInitializer::new(root.clone());
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    // First run: leave an editable config pointing at the resolved root
    if config_path.is_none() {
        if let Some(path) = user_config_file() {
            let bootstrap = TomlConfig {
                root_folder: Some(root.clone()),
                ..config.clone()
            };
            match write_toml_config(&bootstrap, &path) {
                Ok(()) => info!("Default config written to {}", path.display()),
                Err(e) => warn!(error = %e, "Could not write default config {}", path.display()),
            }
        }
    }

    let inbox = args
        .inbox
        .clone()
        .or_else(|| config.inbox_folder.clone())
        .unwrap_or_else(|| initializer.inbox_path());
    std::fs::create_dir_all(&inbox)
        .with_context(|| format!("Failed to create inbox {}", inbox.display()))?;
    info!("Root folder: {}", root.display());
    info!("Inbox: {}", inbox.display());

    let events = EventBus::new(256);
    spawn_event_logger(&events);

    // Subfolder policy
    let mut threshold_manager: Option<Arc<ThresholdManager>> = None;
    let policy: Arc<dyn FolderThreshold> = match args.threshold {
        Some(n) => Arc::new(FixedThreshold(n.max(1))),
        None if config.organizer.adaptive_thresholds => {
            let manager = Arc::new(
                ThresholdManager::load(initializer.config_dir(), config.thresholds.save_every)
                    .context("Failed to load threshold configuration")?,
            );
            threshold_manager = Some(manager.clone());
            manager
        }
        None => Arc::new(FixedThreshold(config.organizer.threshold_documents.max(1))),
    };
    info!(policy = %policy.describe(), "Subfolder policy");

    let journal_dir = config
        .logging
        .journal_dir
        .clone()
        .unwrap_or_else(|| initializer.logs_path());
    let organizer = Arc::new(
        DocumentOrganizer::new(root.clone(), policy)
            .with_journal(journal_dir)
            .with_counts_file(initializer.config_dir().join(COUNTS_FILE))
            .with_events(events.clone()),
    );
    if let Err(e) = organizer.load_counts() {
        warn!(error = %e, "Saved emitter counts ignored");
    }
    if let Err(e) = organizer.reconcile_counts_with_disk() {
        warn!(error = %e, "Could not check emitter counts against folder tree");
    }

    // Collaborators
    let timeout = Duration::from_secs(config.collaborators.timeout_secs.max(1));
    let ocr: Arc<dyn OcrEngine> = match &config.ocr.url {
        Some(url) => {
            info!("OCR service: {}", url);
            Arc::new(HttpOcrClient::new(url.as_str(), timeout).context("Failed to create OCR client")?)
        }
        None => {
            warn!("No OCR service configured, only .txt documents will carry text");
            Arc::new(PlainTextOcr)
        }
    };

    let mut pipeline = DocumentPipeline::new(ocr, organizer.clone())
        .context("Failed to build pipeline")?
        .with_call_policy(CallPolicy::from_config(&config.collaborators))
        .with_fusion(FusionPolicy::with_thresholds(FusionThresholds::from(&config.fusion)))
        .with_events(events.clone());

    if let Some(path) = &args.rules {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules {}", path.display()))?;
        let rules = RuleSet::from_json(&json)
            .with_context(|| format!("Failed to parse rules {}", path.display()))?;
        pipeline = pipeline
            .with_rules(rules)
            .with_context(|| format!("Invalid rules {}", path.display()))?;
        info!("Rules: {}", path.display());
    }

    if config.llm.enabled && !args.no_llm {
        info!(url = %config.llm.url, model = %config.llm.model, "LLM classification enabled");
        let llm = MistralClient::new(config.llm.url.as_str(), config.llm.model.as_str(), timeout)
            .context("Failed to create LLM client")?;
        pipeline = pipeline.with_llm(Arc::new(llm));
    } else {
        info!("LLM classification disabled, rules only");
    }
    if args.discover {
        pipeline = pipeline.with_discovery(CategoryDiscovery::new(DiscoveryConfig::default()));
    }

    let mut failed = HashSet::new();
    if args.watch {
        let scanner = InboxScanner::new().with_min_age(WATCH_MIN_FILE_AGE);
        let token = CancellationToken::new();
        let signal_token = token.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            signal_token.cancel();
        });

        let mut ticker = tokio::time::interval(Duration::from_secs(args.poll_secs.max(1)));
        info!(poll_secs = args.poll_secs, "Watching inbox");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            scan_inbox(&pipeline, &scanner, &inbox, &mut failed, &token).await;
            if args.discover {
                register_categories(&pipeline);
            }
        }
    } else {
        let scanner = InboxScanner::new();
        scan_inbox(&pipeline, &scanner, &inbox, &mut failed, &CancellationToken::new()).await;
        if args.discover {
            register_categories(&pipeline);
        }
    }

    let stats = organizer.statistics();
    info!(
        organized = stats.documents_organized,
        main_category = stats.main_category,
        subfolder_emitter = stats.subfolder_emitter,
        folders_created = stats.folders_created,
        files_swept = stats.files_swept,
        failed = stats.failed_organizations,
        "Session summary"
    );

    if let Some(manager) = threshold_manager {
        for suggestion in manager.suggest_thresholds() {
            info!(
                category = %suggestion.category,
                current = suggestion.current,
                suggested = suggestion.suggested,
                reason = %suggestion.reason,
                "Threshold suggestion"
            );
        }
        manager.save().context("Failed to save thresholds")?;
        info!("Thresholds saved");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Process every document currently in the inbox
///
/// Documents that already failed are not retried in the same session; they
/// stay in the inbox for inspection.
async fn scan_inbox(
    pipeline: &DocumentPipeline,
    scanner: &InboxScanner,
    inbox: &Path,
    failed: &mut HashSet<PathBuf>,
    token: &CancellationToken,
) {
    let scan = match scanner.scan(inbox) {
        Ok(scan) => scan,
        Err(e) => {
            warn!(error = %e, "Inbox scan failed");
            return;
        }
    };
    if scan.skipped > 0 {
        debug!(skipped = scan.skipped, "Inbox entries skipped");
    }
    for (format, count) in &scan.by_format {
        debug!(format = %format, count, "Inbox documents by format");
    }
    let pending: Vec<PathBuf> = scan.files.into_iter().filter(|f| !failed.contains(f)).collect();
    if pending.is_empty() {
        debug!("Inbox empty");
        return;
    }

    info!(documents = pending.len(), "Processing inbox");
    let mut filed = 0usize;
    for path in pending {
        if token.is_cancelled() {
            info!("Interrupted, remaining documents left in inbox");
            break;
        }
        let report = pipeline.process_document(&path).await;
        if report.success() {
            filed += 1;
        } else {
            error!(
                path = %path.display(),
                error = report.organization.error.as_deref().unwrap_or("unknown"),
                "Document not filed"
            );
            failed.insert(path);
        }
    }
    info!(filed, failed = failed.len(), "Inbox pass complete");
}

fn register_categories(pipeline: &DocumentPipeline) {
    match pipeline.register_discovered_categories() {
        Ok(registered) => {
            for category in registered {
                info!(
                    category = %category.slug,
                    support = category.support,
                    keywords = ?category.keywords,
                    "Registered emerging category"
                );
            }
        }
        Err(e) => warn!(error = %e, "Could not register emerging categories"),
    }
}

/// Log every engine event at debug level as JSON
fn spawn_event_logger(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => debug!(event = %json, "Event"),
                    Err(e) => warn!(error = %e, "Unserializable event"),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event logger lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
