//! `file-assistant` — local, privacy-preserving file organizer and semantic
//! search index (spec §1). Thin CLI shell over the `services`/`persistence`
//! crates; this binary only wires configuration, storage, and the model
//! backends together and dispatches to `commands`.

mod cli;
mod commands;
mod logging;
mod operator;

use anyhow::Context as _;
use clap::Parser;
use cli::{Cli, Command};
use operator::InteractiveOperator;
use persistence::Store;
use services::analyzer::FileAnalyzer;
use services::embedder::{Embedder, FastEmbedBackend};
use services::llm_client::OllamaClient;
use services::processor::Processor;
use services::search::SearchEngine;
use services::vector_index::VectorIndex;
use shared::config::AppConfig;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared handles built once in `main` and threaded through every command.
struct Context {
    config: Arc<AppConfig>,
    config_path: PathBuf,
    store: Arc<Store>,
    index: Arc<VectorIndex>,
    embedder: Arc<Embedder>,
    analyzer: Arc<FileAnalyzer>,
    llm: Arc<OllamaClient>,
}

impl Context {
    fn build_processor(&self) -> Processor {
        Processor::new(
            self.store.clone(),
            self.analyzer.clone(),
            self.embedder.clone(),
            self.index.clone(),
            self.llm.clone(),
            self.config.clone(),
        )
    }

    fn search_engine(&self) -> SearchEngine {
        SearchEngine::new(self.embedder.clone(), self.index.clone())
    }
}

fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "file-assistant")
        .map(|dirs| dirs.config_dir().join("config.yaml"))
        .unwrap_or_else(|| PathBuf::from("config.yaml"))
}

fn load_config(path: &PathBuf) -> anyhow::Result<AppConfig> {
    AppConfig::load_from_file(path).context("failed to load configuration")
}

fn build_context(config_path: PathBuf, config: AppConfig) -> anyhow::Result<Context> {
    let store = Store::open(&config.database.path).context("failed to open database")?;
    let vector_store_file = config.database.vector_store_path.join("vectors.db");
    let index = VectorIndex::open(&vector_store_file, "files").context("failed to open vector index")?;

    let backend = Arc::new(FastEmbedBackend::new(&config.ai_settings.embedding_model));
    let embedder = Arc::new(Embedder::with_defaults(backend));

    let analyzer = Arc::new(FileAnalyzer::new(config.processing.max_file_size_bytes()));
    let llm = Arc::new(OllamaClient::new(
        config.ai_settings.ollama_base_url.clone(),
        config.ai_settings.model_name.clone(),
        config.ai_settings.temperature as f32,
        config.ai_settings.max_retries,
    ));

    Ok(Context {
        config: Arc::new(config),
        config_path,
        store: Arc::new(store),
        index: Arc::new(index),
        embedder,
        analyzer,
        llm,
    })
}

/// Exit codes follow spec.md §6: 0 success, 1 user/operational error.
/// Uncaught panics fall through to the Rust runtime's own non-zero default.
#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    let config = match load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e:#}");
            std::process::exit(1);
        }
    };

    let _log_guard = match logging::init(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize logging: {e:#}");
            std::process::exit(1);
        }
    };

    let exit_code = match run(cli.command, config_path, config).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("{e:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run(command: Command, config_path: PathBuf, config: AppConfig) -> anyhow::Result<()> {
    // `init` must work before the database or vector index exist, so it
    // doesn't go through `build_context`.
    if let Command::Init { db_path } = command {
        return commands::init(&config, &config_path, db_path);
    }

    let ctx = build_context(config_path, config)?;

    match command {
        Command::Init { .. } => unreachable!("handled above"),
        Command::Status => commands::status(&ctx),
        Command::Config { action } => commands::config(&ctx, action),
        Command::Watch { folders } => commands::watch(&ctx, folders).await,
        Command::Analyze { path, show_content, preview_length } => commands::analyze(&ctx, path, show_content, preview_length),
        Command::Scan { path, recursive } => commands::scan(path, recursive),
        Command::Process { path } => {
            let thresholds = &ctx.config.confidence_thresholds;
            let operator = InteractiveOperator::new(thresholds.high, thresholds.medium);
            commands::process(&ctx, path, &operator).await
        }
        Command::Run { folders } => commands::run(&ctx, folders).await,
        Command::Index { path, recursive, no_recursive, force, dry_run, max_size } => {
            commands::index(&ctx, path, recursive, no_recursive, force, dry_run, max_size)
        }
        Command::Search { query, file_type, after, before, tags, limit, json, compact } => {
            commands::search(&ctx, query, file_type, after, before, tags, limit, json, compact)
        }
        Command::History { limit } => commands::history(&ctx, limit),
        Command::Undo { action_id } => commands::undo(&ctx, action_id),
    }
}
