// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! `WINPTY_DEBUG` / `WINPTY_SHOW_CONSOLE` handling and tracing setup.
//!
//! The agent's stdout and stderr belong to the hidden console session, so
//! normal operation logs nowhere. With `WINPTY_DEBUG=trace` a non-blocking
//! file layer is installed under the temp directory; the `input` flag
//! additionally raises the decoder's target to TRACE.

use std::collections::HashSet;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Parsed `WINPTY_DEBUG` flag set.
#[derive(Debug, Default, Clone)]
pub struct DebugFlags {
    flags: HashSet<String>,
}

impl DebugFlags {
    /// Parse from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::parse(std::env::var("WINPTY_DEBUG").unwrap_or_default().as_str())
    }

    #[must_use]
    pub fn parse(value: &str) -> Self {
        Self {
            flags: value
                .split(',')
                .map(str::trim)
                .filter(|flag| !flag.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }

    #[must_use]
    pub fn has(&self, flag: &str) -> bool { self.flags.contains(flag) }

    #[must_use]
    pub fn tracing_enabled(&self) -> bool { self.has("trace") }

    #[must_use]
    pub fn trace_input(&self) -> bool { self.has("input") }

    #[must_use]
    pub fn dump_input_map(&self) -> bool { self.has("dump_input_map") }
}

/// True when the hidden console window should stay visible (debug aid).
#[must_use]
pub fn show_console_requested() -> bool {
    std::env::var("WINPTY_SHOW_CONSOLE").is_ok_and(|value| !value.is_empty())
}

/// Install the tracing subscriber according to the flag set. Returns the
/// appender guard; dropping it flushes the log file on exit.
pub fn init_tracing(flags: &DebugFlags) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    if !flags.tracing_enabled() {
        return None;
    }

    let directive = if flags.trace_input() {
        "winpty_agent=trace"
    } else {
        "winpty_agent=debug"
    };
    let filter = EnvFilter::new(directive);

    let file_appender = tracing_appender::rolling::never(
        std::env::temp_dir(),
        format!("winpty-agent-{}.log", std::process::id()),
    );
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .init();

    tracing::debug!(?flags, "agent tracing started");
    Some(guard)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_splits_and_trims() {
        let flags = DebugFlags::parse("trace, input ,dump_input_map");
        assert!(flags.tracing_enabled());
        assert!(flags.trace_input());
        assert!(flags.dump_input_map());
        assert!(!flags.has("force_desktop"));
    }

    #[test]
    fn empty_value_has_no_flags() {
        let flags = DebugFlags::parse("");
        assert!(!flags.tracing_enabled());
        assert_eq!(flags.flags.len(), 0);
    }
}
