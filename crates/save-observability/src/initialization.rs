// SAVE Storage - key-addressed blob storage
// Copyright (C) 2026 SAVE Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//! Installing the global tracing subscriber.

use crate::config::{LogConfig, LogError, LogFormat, LogOutput};
use std::io;
use tracing::Subscriber;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Initialize tracing with a format and an optional level.
///
/// ```ignore
/// use save_observability::{init_tracing, LogFormat};
///
/// init_tracing(LogFormat::Compact, Some("debug"))?;
/// tracing::info!("ready");
/// ```
pub fn init_tracing(format: LogFormat, level: Option<&str>) -> Result<(), LogError> {
    let mut config = LogConfig::new().with_format(format);
    if let Some(level) = level {
        config = config.with_level(level);
    }
    init_tracing_with_config(config)
}

/// Initialize tracing with a detailed configuration.
///
/// Fails with [`LogError::AlreadyInitialized`] when called twice in one
/// process.
pub fn init_tracing_with_config(config: LogConfig) -> Result<(), LogError> {
    let env_filter = build_env_filter(&config)?;

    Registry::default()
        .with(env_filter)
        .with(fmt_layer(&config))
        .try_init()
        .map_err(|e| LogError::AlreadyInitialized(e.to_string()))
}

fn fmt_layer<S>(config: &LogConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let writer = get_writer(config.output);

    match config.format {
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_thread_names(true)
                .with_span_events(FmtSpan::ACTIVE)
                .with_ansi(config.use_color)
                .pretty();
            if config.use_timestamps {
                layer.boxed()
            } else {
                layer.without_time().boxed()
            }
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_span_events(FmtSpan::CLOSE)
                .with_ansi(config.use_color)
                .compact();
            if config.use_timestamps {
                layer.boxed()
            } else {
                layer.without_time().boxed()
            }
        }
        LogFormat::Json => {
            let layer = fmt::layer()
                .with_writer(writer)
                .json()
                .with_span_events(FmtSpan::CLOSE);
            if config.use_timestamps {
                layer.boxed()
            } else {
                layer.without_time().boxed()
            }
        }
    }
}

fn get_writer(output: LogOutput) -> fn() -> Box<dyn io::Write + Send> {
    match output {
        LogOutput::Stderr => || Box::new(io::stderr()),
        LogOutput::Stdout => || Box::new(io::stdout()),
    }
}

fn build_env_filter(config: &LogConfig) -> Result<EnvFilter, LogError> {
    let filter = config.effective_level();

    EnvFilter::try_new(&filter).map_err(|e| LogError::InvalidFilter {
        filter,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_parsing() {
        assert!(build_env_filter(&LogConfig::new().with_level("debug")).is_ok());
        assert!(
            build_env_filter(&LogConfig::new().with_level("save_stores=trace,sqlx=warn")).is_ok()
        );
    }

    #[test]
    fn test_invalid_filter() {
        let err = build_env_filter(&LogConfig::new().with_level("save_stores=loud")).unwrap_err();
        assert!(matches!(err, LogError::InvalidFilter { .. }));
    }

    // The only test in this binary that installs the global subscriber.
    #[test]
    fn test_second_init_fails() {
        let config = LogConfig::new()
            .with_format(LogFormat::Json)
            .with_level("warn")
            .with_timestamps(false);
        init_tracing_with_config(config.clone()).unwrap();

        let err = init_tracing_with_config(config).unwrap_err();
        assert!(matches!(err, LogError::AlreadyInitialized(_)));
    }
}
