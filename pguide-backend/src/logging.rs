use std::{
    fmt::{self, Write as _},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};
use tokio::sync::mpsc;
use tokio::task;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::{fmt as tracing_fmt, prelude::*, EnvFilter};

use crate::store::CacheStore;

#[allow(dead_code)]
pub struct LoggerGuard(WorkerGuard);

/// A log event captured for the store's log list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: String,
    pub message: String,
}

pub type LogReceiver = mpsc::UnboundedReceiver<LogLine>;

/// Forwards INFO and above to an unbounded channel. Events emitted by the
/// store itself are skipped so persisting a line never produces another.
pub struct StoreLogLayer {
    sender: mpsc::UnboundedSender<LogLine>,
}

impl StoreLogLayer {
    pub fn new() -> (Self, LogReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl<S: Subscriber> Layer<S> for StoreLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > Level::INFO || metadata.target().starts_with("pguide_backend::store") {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        // Receiver gone means persistence was never started or has stopped
        let _ = self.sender.send(LogLine {
            level: metadata.level().to_string(),
            message: visitor.finish(),
        });
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// Installs the global subscriber. When `persist` is set the returned
/// receiver carries every INFO+ line until [`spawn_log_persistence`] drains it.
pub fn init_logging(
    log_dir: impl AsRef<Path>,
    prefix: &str,
    level: &str,
    persist: bool,
) -> anyhow::Result<(LoggerGuard, Option<LogReceiver>)> {
    let log_dir = log_dir.as_ref().to_path_buf();

    let level = match level {
        "trace" | "debug" | "info" | "warn" | "error" => level,
        _ => {
            eprintln!("Invalid log level '{}', defaulting to 'info'", level);
            "info"
        }
    };

    let builder = EnvFilter::builder()
        .with_default_directive(level.parse().unwrap_or_else(|_| LevelFilter::INFO.into()));

    let rust_log = std::env::var("RUST_LOG").unwrap_or_default();
    let console_filter = builder.clone().parse_lossy(&rust_log);
    let file_filter = builder.parse_lossy(&rust_log);

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(&log_dir)?;
    let (non_blocking, guard) = NonBlocking::new(file_appender);

    let file_layer = tracing_fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(file_filter);
    let stdout_layer = tracing_fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_filter(console_filter);

    let (store_layer, receiver) = if persist {
        let (layer, receiver) = StoreLogLayer::new();
        (Some(layer), Some(receiver))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer)
        .with(store_layer)
        .init();

    start_log_cleanup_task(log_dir, prefix.to_string());

    Ok((LoggerGuard(guard), receiver))
}

/// Drains captured log lines into the store until every sender is dropped.
pub fn spawn_log_persistence(mut receiver: LogReceiver, store: Arc<dyn CacheStore>) -> task::JoinHandle<()> {
    task::spawn(async move {
        while let Some(line) = receiver.recv().await {
            if let Err(e) = store.add_log(&line.level, &line.message).await {
                eprintln!("Failed to persist log line: {}", e);
            }
        }
    })
}

fn start_log_cleanup_task(log_dir: PathBuf, prefix: String) {
    const MAX_AGE: Duration = Duration::from_secs(60 * 60 * 24 * 3);
    const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

    task::spawn(async move {
        loop {
            if let Err(e) = cleanup_old_logs(&log_dir, &prefix, MAX_AGE) {
                tracing::warn!("Failed to delete old log file: {}", e);
            }
            tokio::time::sleep(CLEANUP_INTERVAL).await;
        }
    });
}

fn cleanup_old_logs(log_dir: &Path, prefix: &str, max_age: Duration) -> std::io::Result<()> {
    let now = SystemTime::now();

    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();

        if let Some(file_name) = path.file_name().and_then(|n| n.to_str()) {
            if file_name.starts_with(prefix) && file_name.ends_with(".log") {
                let metadata = fs::metadata(&path)?;
                if let Ok(modified) = metadata.modified() {
                    if now.duration_since(modified).unwrap_or_default() > max_age {
                        fs::remove_file(&path)?;
                        tracing::info!("Old log file deleted: {}", file_name);
                    }
                }
            }
        }
    }
    Ok(())
}
