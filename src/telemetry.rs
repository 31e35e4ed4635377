use std::env;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "airose_studio=info,overlay_engine=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_env() -> Self {
        match env::var("AIROSE_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

fn filter_from_env() -> EnvFilter {
    EnvFilter::try_from_env("AIROSE_LOG").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber. `AIROSE_LOG` takes an `EnvFilter`
/// directive; `AIROSE_LOG_FORMAT=json` switches to JSON lines. Fails if a
/// subscriber is already installed.
pub fn init_tracing() -> Result<()> {
    let registry = tracing_subscriber::registry().with(filter_from_env());

    let installed = match LogFormat::from_env() {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact().with_writer(std::io::stderr)).try_init(),
    };
    installed.context("tracing subscriber already installed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installs_once() {
        init_tracing().unwrap();
        tracing::info!(target: "airose_studio", "subscriber up");
        assert!(init_tracing().is_err());
    }
}
