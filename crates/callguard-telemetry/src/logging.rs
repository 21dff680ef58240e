//! Subscriber setup.
//!
//! JSON output carries target, thread id, file and line so log shippers can
//! parse it; pretty output is meant for a terminal.

use crate::{TelemetryConfig, TelemetryError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format picked from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Silent,
}

impl LogFormat {
    pub fn from_config(config: &TelemetryConfig) -> Self {
        match (config.console_output, config.json_logs) {
            (false, _) => Self::Silent,
            (true, true) => Self::Json,
            (true, false) => Self::Pretty,
        }
    }
}

pub(crate) fn build_filter(log_level: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(log_level).map_err(|e| TelemetryError::Filter {
        filter: log_level.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn init_logging(config: &TelemetryConfig) -> Result<LogFormat, TelemetryError> {
    let env_filter = build_filter(&config.log_level)?;
    let format = LogFormat::from_config(config);

    let result = match format {
        LogFormat::Json => {
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init()
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
        }
        LogFormat::Silent => tracing_subscriber::registry().with(env_filter).try_init(),
    };

    result.map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;
    Ok(format)
}
