//! Logging integration for isql-rs.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`Settings`](crate::settings::Settings) and for creating the spans used
//! while connections are opened.

use crate::settings::Settings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The log level is read from `settings.log_level` (e.g. "debug", "info",
/// "warn", "error", or a full `EnvFilter` directive such as
/// `"isql_db=trace,info"`). In debug mode a pretty, human-readable format is
/// used; otherwise a structured JSON format is used.
///
/// Installing a subscriber when one is already set is a no-op.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for opening one connection.
///
/// `role` is `"primary"` or `"replica"`; `index` is the position of a
/// replica in its set (zero for the primary).
///
/// # Examples
///
/// ```
/// use isql_core::logging::connection_span;
///
/// let span = connection_span("sqlite", "replica", 2);
/// let _guard = span.enter();
/// tracing::info!("opening");
/// ```
pub fn connection_span(driver: &str, role: &str, index: usize) -> tracing::Span {
    tracing::info_span!("connection", driver, role, index)
}
