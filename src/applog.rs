//! Application logging (§4.8, ambient)
//!
//! Builds the one process-wide `tracing` subscriber the Supervisor installs
//! before starting any worker. The active `*:logging` section picks the
//! sink: a daily-rolling file (retention-pruned) or a dedicated syslog
//! session, independent of the one the Dispatcher opens per message.
//! Absent either section, a permissive stderr subscriber is installed so the
//! daemon is never silently unobservable.

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use std::io;
use std::sync::Mutex;
use syslog::{Formatter3164, Logger, LoggerBackend};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{Layer, Registry};

/// Keeps the non-blocking file writer (if any) alive for the process
/// lifetime; dropping it flushes and stops the background flush thread.
pub struct AppLogGuard(#[allow(dead_code)] Option<WorkerGuard>);

/// Install the global subscriber per the active `*:logging` section (or a
/// permissive stderr fallback if neither is configured). Per §9's fix, the
/// active section's `level` is read unconditionally - the original only read
/// it on the file-logging branch.
pub fn init(logging: Option<&LoggingConfig>) -> Result<AppLogGuard> {
    match logging {
        Some(LoggingConfig::File { file, retention_days, level }) => {
            prune_old_logs(file, *retention_days);
            let dir = file.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let name = file.file_name().and_then(|n| n.to_str()).unwrap_or("pylogchop.log");
            let appender = tracing_appender::rolling::daily(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let filter = EnvFilter::new(level.to_tracing_filter());
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(false)
                .with_thread_names(true);
            let subscriber = Registry::default().with(filter).with(fmt_layer);
            tracing::subscriber::set_global_default(subscriber)
                .context("installing the file application-log subscriber")?;
            Ok(AppLogGuard(Some(guard)))
        }
        Some(LoggingConfig::Syslog { address, facility, level }) => {
            let formatter = Formatter3164 {
                facility: facility.to_syslog_facility(),
                hostname: None,
                process: "pylogchop".to_string(),
                pid: 0,
            };
            let logger = open_syslog(address, formatter)?;
            let filter = EnvFilter::new(level.to_tracing_filter());
            let layer = SyslogLayer { logger: Mutex::new(logger) };
            let subscriber = Registry::default().with(filter).with(layer);
            tracing::subscriber::set_global_default(subscriber)
                .context("installing the syslog application-log subscriber")?;
            Ok(AppLogGuard(None))
        }
        None => {
            let subscriber = Registry::default()
                .with(EnvFilter::new("info"))
                .with(tracing_subscriber::fmt::layer().with_writer(io::stderr));
            tracing::subscriber::set_global_default(subscriber)
                .context("installing the fallback stderr application-log subscriber")?;
            Ok(AppLogGuard(None))
        }
    }
}

fn open_syslog(
    address: &str,
    formatter: Formatter3164,
) -> Result<Logger<LoggerBackend, Formatter3164>> {
    if let Some((host, port)) = address.split_once(':') {
        let port: u16 = port.parse().with_context(|| format!("invalid syslog port in '{address}'"))?;
        syslog::tcp(formatter, (host, port)).with_context(|| format!("connecting to syslog at {address}"))
    } else {
        syslog::tcp(formatter, (address, 514)).with_context(|| format!("connecting to syslog at {address}"))
    }
}

/// Remove daily-rolling log files under `file`'s directory older than
/// `retention_days`. `max_length` in `[main]` governs nothing here (§9); this
/// is the only pruning the application log performs.
fn prune_old_logs(file: &std::path::Path, retention_days: u32) {
    let Some(dir) = file.parent() else { return };
    let Some(prefix) = file.file_name().and_then(|n| n.to_str()) else { return };
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    let cutoff = std::time::SystemTime::now()
        .checked_sub(std::time::Duration::from_secs(u64::from(retention_days) * 86_400));
    let Some(cutoff) = cutoff else { return };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name == prefix || !name.starts_with(prefix) {
            continue;
        }
        if let Ok(metadata) = entry.metadata() {
            if let Ok(modified) = metadata.modified() {
                if modified < cutoff {
                    let _ = std::fs::remove_file(entry.path());
                }
            }
        }
    }
}

/// A `tracing_subscriber::Layer` that writes one syslog record per event, at
/// a severity derived from the event's level (§4.8).
struct SyslogLayer {
    logger: Mutex<Logger<LoggerBackend, Formatter3164>>,
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else if !self.message.is_empty() {
            self.message.push_str(&format!(" {}={value:?}", field.name()));
        } else {
            self.message = format!("{}={value:?}", field.name());
        }
    }
}

impl<S> Layer<S> for SyslogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let mut logger = match self.logger.lock() {
            Ok(logger) => logger,
            Err(_) => return,
        };
        let result = match *event.metadata().level() {
            Level::ERROR => logger.err(&visitor.message),
            Level::WARN => logger.warning(&visitor.message),
            Level::INFO => logger.info(&visitor.message),
            Level::DEBUG | Level::TRACE => logger.debug(&visitor.message),
        };
        drop(logger);
        if result.is_err() {
            // Can't log this failure without risking recursion into this
            // very layer; silently drop it.
        }
    }
}
