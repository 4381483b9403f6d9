//! Command handlers: one function per CLI subcommand, operating on the
//! shared `Context` built in `main`. Kept separate from `cli.rs` (argument
//! shapes) and `main.rs` (wiring), mirroring how the teacher split its GUI
//! event handlers from `main.rs`'s app bootstrap.

use crate::cli::ConfigAction;
use crate::operator::{NonInteractiveOperator, OperatorDecision, OperatorInteraction};
use anyhow::{bail, Context as _};
use chrono::{NaiveDate, TimeZone, Utc};
use console::style;
use services::classifier::sanitize_destination;
use services::folder_scanner::{render_ascii_tree, FolderScanner};
use services::indexing_driver::IndexingDriver;
use services::processor::{Processor, ProcessingOutcome, ProcessingStage};
use services::search::SearchFilters;
use services::watcher::{scan_existing, FolderWatcher};
use shared::types::{Decision, FileStatus};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Context;
use shared::config::AppConfig;

pub fn init(config: &AppConfig, config_path: &Path, db_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = db_path.unwrap_or_else(|| config.database.path.clone());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = persistence::Store::open(&path).context("failed to initialize database")?;

    std::fs::create_dir_all(&config.database.vector_store_path)?;

    if !config_path.exists() {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(config_path, config.to_yaml()?)?;
        println!("Wrote default configuration to {}", config_path.display());
    }
    println!("Initialized database at {}", path.display());
    Ok(())
}

pub fn status(ctx: &Context) -> anyhow::Result<()> {
    let counts = ctx.store.count_by_status()?;
    println!("File counts:");
    for (status, count) in &counts {
        println!("  {:<12} {}", status.as_str(), count);
    }
    println!("\nConfiguration ({}):", ctx.config_path.display());
    print!("{}", ctx.config.to_yaml()?);
    Ok(())
}

pub fn config_show(ctx: &Context) -> anyhow::Result<()> {
    print!("{}", ctx.config.to_yaml()?);
    Ok(())
}

pub fn config_edit(ctx: &Context) -> anyhow::Result<()> {
    match std::env::var("EDITOR") {
        Ok(editor) => {
            let status = std::process::Command::new(editor).arg(&ctx.config_path).status()?;
            if !status.success() {
                bail!("editor exited with status {status}");
            }
        }
        Err(_) => {
            println!("Set $EDITOR to edit interactively. Config file: {}", ctx.config_path.display());
        }
    }
    Ok(())
}

pub fn config(ctx: &Context, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => config_show(ctx),
        ConfigAction::Edit => config_edit(ctx),
    }
}

pub async fn watch(ctx: &Context, folders: Vec<PathBuf>) -> anyhow::Result<()> {
    let roots = resolve_folders(ctx, folders);
    let debounce = Duration::from_secs(ctx.config.processing.debounce_seconds);
    let watcher = FolderWatcher::start(&roots, debounce)?;
    let tracker = watcher.tracker();

    // Existing-file scan (spec §4.8): reported once at start-up, bypassing
    // the debouncer entirely.
    for path in scan_existing(&roots) {
        println!("{} {}", style("existing").dim(), path.display());
    }

    println!("Watching {} folder(s); press Ctrl-C to stop.", roots.len());
    let mut ticker = tokio::time::interval(debounce.max(Duration::from_millis(200)) / 2);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                watcher.pump();
                for path in tracker.drain_stable() {
                    println!("{} {}", style("detected").cyan().bold(), path.display());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping.");
                break;
            }
        }
    }
    Ok(())
}

pub fn analyze(ctx: &Context, path: PathBuf, show_content: bool, preview_length: Option<usize>) -> anyhow::Result<()> {
    let result = ctx.analyzer.analyze(&path);
    if !result.success {
        eprintln!("{}: {}", style("error").red().bold(), result.error_message.unwrap_or_default());
        bail!("analysis failed");
    }

    if let Some(meta) = &result.metadata {
        println!("Path:       {}", meta.path.display());
        println!("Filename:   {}", meta.filename);
        println!("Extension:  {}", meta.extension);
        println!("Size:       {} bytes", meta.size_bytes);
        println!("MD5:        {}", meta.md5);
        println!("Modified:   {}", meta.modified_at);
    }
    println!("Words:      {}", result.word_count);
    println!("Lines:      {}", result.line_count);

    if show_content {
        println!("\n{}", result.content);
    } else {
        let limit = preview_length.unwrap_or(500);
        let preview: String = result.content.chars().take(limit).collect();
        println!("\n{preview}");
    }
    Ok(())
}

pub fn scan(path: PathBuf, recursive: bool) -> anyhow::Result<()> {
    let scanner = if recursive { FolderScanner::new(u32::MAX) } else { FolderScanner::new(1) };
    let tree = scanner.scan(&path);
    println!("{}", render_ascii_tree(&tree));
    println!("\n{} files", scanner.count_files(&path));
    Ok(())
}

pub async fn process(ctx: &Context, path: PathBuf, operator: &dyn OperatorInteraction) -> anyhow::Result<()> {
    let processor = ctx.build_processor();
    let outcome = processor.process(&path).await;
    let outcome = resolve_if_awaiting(&ctx.store, &processor, outcome, &path, operator);
    report_outcome(operator, &path, &outcome);
    if outcome.stage == ProcessingStage::Errored {
        bail!("processing failed");
    }
    Ok(())
}

pub async fn run(ctx: &Context, folders: Vec<PathBuf>) -> anyhow::Result<()> {
    let roots = resolve_folders(ctx, folders);
    let debounce = Duration::from_secs(ctx.config.processing.debounce_seconds);
    let watcher = FolderWatcher::start(&roots, debounce)?;
    let tracker = watcher.tracker();
    let processor = ctx.build_processor();
    let operator = NonInteractiveOperator;

    println!("Running watcher + processor over {} folder(s); press Ctrl-C to stop.", roots.len());

    // Existing-file scan (spec §4.8): files already sitting in the watched
    // roots at start-up are processed once, directly, bypassing the
    // debouncer (they're already stable by definition).
    for path in scan_existing(&roots) {
        let outcome = processor.process(&path).await;
        let outcome = resolve_if_awaiting(&ctx.store, &processor, outcome, &path, &operator);
        report_outcome(&operator, &path, &outcome);
    }

    let mut ticker = tokio::time::interval(debounce.max(Duration::from_millis(200)) / 2);

    // Database auto-backup (SPEC_FULL.md §G): a periodic copy of the
    // relational store, not a separate daemon — just another branch of this
    // same loop.
    let backup_interval = Duration::from_secs(ctx.config.database.backup_interval_hours.max(1) * 3600);
    let mut backup_ticker = tokio::time::interval(backup_interval);
    backup_ticker.tick().await; // first tick fires immediately; consume it so backups start one interval in

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                watcher.pump();
                for path in tracker.drain_stable() {
                    let outcome = processor.process(&path).await;
                    let outcome = resolve_if_awaiting(&ctx.store, &processor, outcome, &path, &operator);
                    report_outcome(&operator, &path, &outcome);
                }
            }
            _ = backup_ticker.tick(), if ctx.config.database.backup_enabled => {
                match backup_database(&ctx.config.database.path) {
                    Ok(dest) => tracing::info!(backup = %dest.display(), "database backed up"),
                    Err(e) => tracing::warn!(error = %e, "database backup failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping.");
                break;
            }
        }
    }
    Ok(())
}

/// Copies the relational database to `<parent>/backups/<stem>-<timestamp>.db`
/// (spec SPEC_FULL.md §G: "a simple scheduled copy", not a background
/// daemon).
fn backup_database(db_path: &Path) -> anyhow::Result<PathBuf> {
    let backups_dir = db_path.parent().unwrap_or_else(|| Path::new(".")).join("backups");
    std::fs::create_dir_all(&backups_dir)?;
    let stem = db_path.file_stem().and_then(|s| s.to_str()).unwrap_or("fileassistant");
    let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let dest = backups_dir.join(format!("{stem}-{timestamp}.db"));
    std::fs::copy(db_path, &dest)?;
    Ok(dest)
}

#[allow(clippy::too_many_arguments)]
pub fn index(
    ctx: &Context,
    path: PathBuf,
    recursive: bool,
    no_recursive: bool,
    force: bool,
    dry_run: bool,
    max_size: Option<u64>,
) -> anyhow::Result<()> {
    let _ = recursive;
    let recursive = !no_recursive;
    let max_size_bytes = max_size.map(|mb| mb * 1024 * 1024).or(Some(ctx.config.processing.max_file_size_bytes()));

    let driver = IndexingDriver::new(&ctx.analyzer, &ctx.embedder, &ctx.index).with_store(&ctx.store);
    let summary = driver.reindex_folder(&path, recursive, force, dry_run, max_size_bytes);

    println!("scanned:        {}", summary.scanned);
    println!("indexed:        {}", summary.indexed);
    println!("already_indexed:{}", summary.already_indexed);
    println!("skipped(empty): {}", summary.skipped_empty);
    println!("failed:         {}", summary.failed);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn search(
    ctx: &Context,
    query: Vec<String>,
    file_type: Vec<String>,
    after: Option<String>,
    before: Option<String>,
    tags: Vec<String>,
    limit: usize,
    json: bool,
    compact: bool,
) -> anyhow::Result<()> {
    let query = query.join(" ");
    let filters = SearchFilters {
        extension: if file_type.is_empty() { None } else { Some(normalize_extensions(&file_type)) },
        file_type: None,
        tags: if tags.is_empty() { None } else { Some(tags) },
        modified_after: after.as_deref().map(parse_date_bound).transpose()?,
        modified_before: before.as_deref().map(parse_date_bound).transpose()?,
    };

    let results = ctx.search_engine().search(&query, limit, &filters)?;

    if json {
        let items: Vec<serde_json::Value> = results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "path": r.metadata.file_path,
                    "filename": r.metadata.filename,
                    "relevance": r.relevance,
                    "snippet": r.snippet,
                    "tags": r.metadata.tags,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if results.is_empty() {
        eprintln!("No results for '{query}'");
        bail!("no results");
    }

    for r in &results {
        if compact {
            println!("{:.3}  {}", r.relevance, r.metadata.file_path);
        } else {
            println!("{} ({:.0}%)", style(&r.metadata.file_path).bold(), r.relevance * 100.0);
            println!("  {}", r.snippet.lines().next().unwrap_or_default());
        }
    }
    Ok(())
}

pub fn history(ctx: &Context, limit: usize) -> anyhow::Result<()> {
    let actions = ctx.store.list_actions(limit)?;
    if actions.is_empty() {
        println!("No recorded actions.");
        return Ok(());
    }
    for action in &actions {
        let undone = if action.undone { " (undone)" } else { "" };
        let after = action.after_state.as_ref().map(|s| s.path.as_str()).unwrap_or("-");
        println!(
            "{:<6} {:<12} {}  ->  {}{undone}",
            action.id.unwrap_or(-1),
            action.action_type.as_str(),
            action.before_state.as_ref().map(|s| s.path.as_str()).unwrap_or("-"),
            after,
        );
    }
    Ok(())
}

pub fn undo(ctx: &Context, action_id: i64) -> anyhow::Result<()> {
    let mover = services::mover::Mover::new(&ctx.store);
    mover.undo(action_id)?;
    println!("Undid action {action_id}.");
    Ok(())
}

fn resolve_folders(ctx: &Context, folders: Vec<PathBuf>) -> Vec<PathBuf> {
    if folders.is_empty() {
        ctx.config.inbox_folders.clone()
    } else {
        folders
    }
}

fn normalize_extensions(exts: &[String]) -> Vec<String> {
    exts.iter()
        .map(|e| {
            let trimmed = e.trim().trim_start_matches('.').to_lowercase();
            format!(".{trimmed}")
        })
        .collect()
}

fn parse_date_bound(s: &str) -> anyhow::Result<chrono::DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD"))?;
    let naive = date.and_hms_opt(0, 0, 0).expect("midnight is always valid");
    Ok(Utc.from_utc_datetime(&naive))
}

/// When the pipeline parks on `awaiting_decision`, fetches the pending
/// classification and asks the operator for a verdict, finishing the move
/// (or recording a skip) accordingly.
fn resolve_if_awaiting(
    store: &persistence::Store,
    processor: &Processor,
    outcome: ProcessingOutcome,
    path: &Path,
    operator: &dyn OperatorInteraction,
) -> ProcessingOutcome {
    if outcome.stage != ProcessingStage::AwaitingDecision {
        return outcome;
    }

    let classifications = store.list_classifications_for_file(outcome.file_id).unwrap_or_default();
    let Some(classification) = classifications.into_iter().find(|c| c.decision == Decision::Pending) else {
        return ProcessingOutcome {
            stage: ProcessingStage::Errored,
            message: Some("no pending classification found".into()),
            ..outcome
        };
    };
    let classification_id = classification.id.expect("persisted classification always has an id");

    match operator.decide(&classification) {
        Ok(OperatorDecision::Accept) => {
            processor.finalize(outcome.file_id, classification_id, Decision::Accepted, &classification.suggested_destination, path)
        }
        Ok(OperatorDecision::Edit(destination)) => {
            let sanitized = sanitize_destination(&destination);
            processor.finalize(outcome.file_id, classification_id, Decision::Modified, &sanitized, path)
        }
        Ok(OperatorDecision::Skip) => {
            let _ = store.finalize_processing(outcome.file_id, classification_id, Decision::Rejected, None, None, FileStatus::Skipped);
            ProcessingOutcome { file_id: outcome.file_id, stage: ProcessingStage::Skipped, destination: None, message: None }
        }
        Err(e) => ProcessingOutcome { file_id: outcome.file_id, stage: ProcessingStage::Errored, destination: None, message: Some(e.to_string()) },
    }
}

fn report_outcome(operator: &dyn OperatorInteraction, path: &Path, outcome: &ProcessingOutcome) {
    match outcome.stage {
        ProcessingStage::Moved => {
            let dest = outcome.destination.as_ref().map(|d| d.display().to_string()).unwrap_or_default();
            operator.report_success(&path.display().to_string(), &dest);
        }
        ProcessingStage::Errored => {
            operator.report_failure(&path.display().to_string(), outcome.message.as_deref().unwrap_or("unknown error"));
        }
        ProcessingStage::Skipped => {
            tracing::info!(path = %path.display(), "skipped");
        }
        _ => {}
    }
}
