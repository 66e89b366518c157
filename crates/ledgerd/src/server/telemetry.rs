//! # Logging
//!
//! Two `tracing-subscriber` layers are installed on one registry:
//!
//! - A console layer for operational logs, filtered by `RUST_LOG` (default
//!   `info`), with thread ids, file/line and local RFC 3339 timestamps.
//! - An audit layer that appends to the configured log file. It only records
//!   events whose target is [`AUDIT_TARGET`], one line per event:
//!
//! ```text
//! [2024-05-01 12:00:00] Server started
//! ```
//!
//! The audit layer has its own filter, so `RUST_LOG` never silences it.
//!
//! Emit an audit event with:
//!
//! ```rust,ignore
//! tracing::info!(target: AUDIT_TARGET, "Server started");
//! ```

use anyhow::Context;
use core::fmt;
use std::{fs::OpenOptions, path::Path, sync::Mutex};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::Targets,
    fmt::{
        FmtContext, FormatEvent, FormatFields, MakeWriter,
        format::Writer,
        time::{ChronoLocal, FormatTime},
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Target of events written to the audit log.
pub const AUDIT_TARGET: &str = "ledgerd::audit";

/// `strftime` layout of audit log timestamps.
const AUDIT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Installs the global subscriber: console output plus the audit log at
/// `log_file`, which is opened in append mode and created if missing.
///
/// # Errors
///
/// Fails if the log file cannot be opened or a global subscriber is already
/// installed.
pub fn init_telemetry(log_file: &Path) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;

    let console = tracing_subscriber::fmt::layer()
        .with_thread_ids(true)
        .with_line_number(true)
        .with_target(false)
        .with_timer(ChronoLocal::rfc_3339())
        .with_file(true)
        .pretty()
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()));

    tracing_subscriber::registry()
        .with(console)
        .with(audit_layer(Mutex::new(file)))
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(())
}

/// Builds the audit log layer over any writer.
pub fn audit_layer<S, W>(make_writer: W) -> impl Layer<S> + Send + Sync + 'static
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(make_writer)
        .event_format(AuditFormat::default())
        .with_filter(Targets::new().with_target(AUDIT_TARGET, Level::INFO))
}

/// Formats an event as `[<local time>] <message>`.
pub struct AuditFormat {
    timer: ChronoLocal,
}

impl Default for AuditFormat {
    fn default() -> Self {
        Self {
            timer: ChronoLocal::new(AUDIT_TIME_FORMAT.to_owned()),
        }
    }
}

impl<S, N> FormatEvent<S, N> for AuditFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        writer.write_char('[')?;
        self.timer.format_time(&mut writer)?;
        writer.write_str("] ")?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
