//! Wires `tracing` to two sinks (SPEC_FULL.md §1): a colored compact
//! layer on stdout, and a plain `TIMESTAMP LEVEL:MESSAGE` layer
//! appended to `app.log` (spec.md §6). Rotation is explicitly out of
//! scope (spec.md §1), so the file sink is a simple append-only
//! writer.

use std::fmt;

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

struct AppLogFormat;

impl<S, N> FormatEvent<S, N> for AppLogFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        write!(writer, "{now} {}:", event.metadata().level())?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Installs the stdout + `app.log` tracing layers. Must be called
/// once, before any other component starts.
pub fn init(log_path: &std::path::Path) -> anyhow::Result<()> {
    let file = std::fs::OpenOptions::new().create(true).append(true).open(log_path)?;

    let env_filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(env_filter());

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .event_format(AppLogFormat)
        .with_filter(env_filter());

    tracing_subscriber::registry().with(stdout_layer).with(file_layer).try_init()?;
    Ok(())
}
