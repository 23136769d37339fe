//! Diagnostic logging on stderr.
//!
//! Every event is emitted inside a `json2mail` span whose `channel` field
//! says what the event concerns: `smtp.out` and `smtp.in` for protocol
//! lines, `internal` for everything else.

use std::{
    io::{self, IsTerminal},
    str::FromStr,
};

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, Registry, filter::FilterFn, fmt::time::ChronoUtc, layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[macro_export]
macro_rules! log {
    ($level:ident, $channel:literal, $($msg:expr),*) => {{
        let span = $crate::tracing::span!(
            $crate::tracing::Level::$level,
            "json2mail",
            channel = $channel
        );
        let _enter = span.enter();

        $crate::tracing::event!($crate::tracing::Level::$level, $($msg),*)
    }};
}

/// A line written to the SMTP server.
#[macro_export]
macro_rules! smtp_out {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($level, "smtp.out", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::log!(TRACE, "smtp.out", $($msg),*)
    };
}

/// A reply read from the SMTP server.
#[macro_export]
macro_rules! smtp_in {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($level, "smtp.in", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::log!(TRACE, "smtp.in", $($msg),*)
    };
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::log!(TRACE, "internal", $($msg),*)
    };
}

/// Output layout selected with `LOG_FORMAT`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Format {
    #[default]
    Compact,
    Json,
}

impl Format {
    fn from_env(value: Option<&str>) -> Self {
        match value {
            Some(value) if value.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Level used when `LOG_LEVEL` is unset or unparseable.
const fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    }
}

fn level_from(value: Option<&str>) -> LevelFilter {
    let default = default_level();

    value.map_or(default, |level| {
        LevelFilter::from_str(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

fn layer(format: Format) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_file(false)
        .with_line_number(false)
        .with_timer(ChronoUtc::rfc_3339());

    match format {
        Format::Compact => layer
            .compact()
            .with_ansi(io::stderr().is_terminal())
            .boxed(),
        Format::Json => layer.json().with_ansi(false).boxed(),
    }
}

/// Install the diagnostic subscriber.
///
/// Diagnostics go to stderr so that stdout stays free for the mail outcome
/// log. Only events from the json2mail crates are shown. Calling this a
/// second time leaves the first subscriber in place.
pub fn init() {
    let level = level_from(std::env::var("LOG_LEVEL").ok().as_deref());
    let format = Format::from_env(std::env::var("LOG_FORMAT").ok().as_deref());

    let result = Registry::default()
        .with(
            layer(format)
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with("json2mail")
                })),
        )
        .try_init();

    if let Err(err) = result {
        eprintln!("Logging is already initialised: {err}");
    }
}
