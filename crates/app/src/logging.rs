//! Tracing setup (SPEC_FULL.md ambient logging section): console and/or
//! rotating file output driven by `LoggingSettings`, extending the
//! `tracing-subscriber` baseline the teacher's GUI binary used.
//!
//! `tracing-appender`'s rolling writer rotates by calendar day rather than
//! by byte count, so `max_bytes` isn't enforced exactly; `backup_count`
//! instead bounds how many daily log files are kept in `log_dir`.

use shared::config::LoggingSettings;
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes the global tracing subscriber. The returned guard must be
/// held for the lifetime of `main` so buffered file writes are flushed on
/// exit; `None` means no file appender was installed.
pub fn init(settings: &LoggingSettings) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.as_tracing_level().to_string()));
    let registry = tracing_subscriber::registry().with(filter);

    if settings.file_enabled {
        fs::create_dir_all(&settings.log_dir)?;
        prune_old_logs(&settings.log_dir, settings.backup_count)?;
        let appender = tracing_appender::rolling::daily(&settings.log_dir, "file-assistant.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

        if settings.console_enabled {
            registry.with(file_layer).with(fmt::layer().with_writer(std::io::stderr)).init();
        } else {
            registry.with(file_layer).init();
        }
        Ok(Some(guard))
    } else if settings.console_enabled {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
        Ok(None)
    } else {
        registry.init();
        Ok(None)
    }
}

/// Keeps at most `keep` log files in `dir`, oldest-first eviction by name
/// (daily files sort lexicographically by date).
fn prune_old_logs(dir: &Path, keep: u32) -> std::io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());
    let excess = entries.len().saturating_sub(keep as usize);
    for entry in entries.into_iter().take(excess) {
        let _ = fs::remove_file(entry.path());
    }
    Ok(())
}
