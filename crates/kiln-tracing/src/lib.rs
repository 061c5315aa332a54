//! Logging setup shared by every kiln crate
//!
//! Library code only emits `tracing` events; whoever owns the process
//! (a test harness, a benchmark, or a C host through `kiln_init_tracing`)
//! installs the subscriber once with [`init_global_tracing`].
//!
//! ```no_run
//! use kiln_tracing::{init_global_tracing, TracingConfig};
//!
//! init_global_tracing(&TracingConfig::from_env()).ok();
//! ```

pub mod performance;

#[macro_use]
pub mod macros;

use std::env;
use std::str::FromStr;

pub use tracing::{debug, error, info, trace, warn};

use tracing::Subscriber;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Registry};

/// Filter used when nothing else selects one
pub const DEFAULT_DIRECTIVE: &str = "warn,kiln_core=info";

/// Preset bundles of [`TracingConfig`] settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    /// Human-readable, coloured
    Local,
    /// Machine-readable, no colour
    Ci,
    /// Machine-readable with span close timings and dispatch-level detail
    Performance,
}

impl FromStr for Profile {
    type Err = TracingSetupError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "local" => Ok(Profile::Local),
            "ci" => Ok(Profile::Ci),
            "perf" | "performance" => Ok(Profile::Performance),
            other => Err(TracingSetupError::UnknownSetting {
                name: "profile",
                value: other.to_string(),
            }),
        }
    }
}

/// Output format of the formatter layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingOutput {
    Compact,
    Pretty,
    Json,
}

impl FromStr for TracingOutput {
    type Err = TracingSetupError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(TracingSetupError::UnknownSetting {
                name: "format",
                value: other.to_string(),
            }),
        }
    }
}

/// How the process-wide subscriber filters and formats events
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Filter directives; `None` defers to `RUST_LOG`, then [`DEFAULT_DIRECTIVE`]
    pub directives: Option<String>,
    pub include_targets: bool,
    pub ansi: bool,
    pub span_events: FmtSpan,
    pub output: TracingOutput,
    /// Gates [`performance::PerformanceSpan`] and dispatch/transfer records
    pub enable_performance_tracing: bool,
    /// Spans shorter than this are not logged
    pub performance_threshold_us: Option<u64>,
    /// Appended to the filter while performance tracing is on
    pub performance_directives: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::for_profile(Profile::Local)
    }
}

impl TracingConfig {
    /// Settings of one preset
    pub fn for_profile(profile: Profile) -> Self {
        let local = Self {
            directives: None,
            include_targets: true,
            ansi: true,
            span_events: FmtSpan::NONE,
            output: TracingOutput::Pretty,
            enable_performance_tracing: cfg!(debug_assertions),
            performance_threshold_us: None,
            performance_directives: None,
        };

        match profile {
            Profile::Local => local,
            Profile::Ci => Self {
                ansi: false,
                output: TracingOutput::Json,
                enable_performance_tracing: false,
                ..local
            },
            Profile::Performance => Self {
                directives: Some("kiln_core=debug,kiln_backends=debug".to_string()),
                ansi: false,
                span_events: FmtSpan::CLOSE,
                output: TracingOutput::Json,
                enable_performance_tracing: true,
                performance_directives: Some("kiln_backends::backends=trace".to_string()),
                ..local
            },
        }
    }

    /// Preset chosen by `KILN_TRACING_PROFILE`, adjusted by the other variables
    ///
    /// # Environment Variables
    ///
    /// - `KILN_TRACING_PROFILE` - `local` (default), `ci`, or `performance`
    /// - `KILN_TRACING_DIRECTIVES` - filter directives
    /// - `KILN_TRACING_FORMAT` - `pretty`, `compact`, or `json`
    /// - `KILN_PERF_TRACING` - `1`/`true`/`yes` enables performance records
    /// - `KILN_PERF_THRESHOLD_US` - minimum logged span duration
    /// - `KILN_PERF_DIRECTIVES` - extra directives for performance tracing
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let profile = env_value("KILN_TRACING_PROFILE")
            .and_then(|value| value.parse().ok())
            .unwrap_or(Profile::Local);
        let mut config = Self::for_profile(profile);

        if let Some(directives) = env_value("KILN_TRACING_DIRECTIVES") {
            config.directives = Some(directives);
        }
        if let Some(output) = env_value("KILN_TRACING_FORMAT").and_then(|value| value.parse().ok()) {
            config.output = output;
            config.ansi &= output != TracingOutput::Json;
        }
        if let Some(flag) = env_value("KILN_PERF_TRACING") {
            config.enable_performance_tracing = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(threshold_us) = env_value("KILN_PERF_THRESHOLD_US").and_then(|value| value.parse().ok()) {
            config.performance_threshold_us = Some(threshold_us);
        }
        if let Some(directives) = env_value("KILN_PERF_DIRECTIVES") {
            config.performance_directives = Some(directives);
        }

        config
    }

    fn filter(&self) -> Result<EnvFilter, TracingSetupError> {
        let mut directives = self
            .directives
            .clone()
            .or_else(|| env_value("RUST_LOG"))
            .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string());

        if let (true, Some(extra)) = (self.enable_performance_tracing, &self.performance_directives) {
            directives = format!("{},{}", directives, extra);
        }

        EnvFilter::try_new(&directives).map_err(|err| TracingSetupError::InvalidFilter(err.to_string()))
    }
}

/// Non-blank value of an environment variable
fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Errors from configuring or installing the subscriber
#[derive(Debug, thiserror::Error)]
pub enum TracingSetupError {
    #[error("invalid tracing directive: {0}")]
    InvalidFilter(String),

    #[error("unknown tracing {name} `{value}`")]
    UnknownSetting { name: &'static str, value: String },

    /// Usually another subscriber is already installed
    #[error("failed to install global tracing subscriber: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
}

/// Subscriber for `config`, not yet installed
pub fn build_subscriber(config: &TracingConfig) -> Result<impl Subscriber + Send + Sync, TracingSetupError> {
    let (filter, layer) = subscriber_layers(config)?;
    Ok(Registry::default().with(layer).with(filter))
}

/// Filter and formatter layer for callers composing their own subscriber
pub fn subscriber_layers(
    config: &TracingConfig,
) -> Result<(EnvFilter, Box<dyn Layer<Registry> + Send + Sync>), TracingSetupError> {
    let base = tracing_fmt::layer()
        .with_target(config.include_targets)
        .with_span_events(config.span_events.clone());

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.output {
        TracingOutput::Compact => Box::new(base.compact().with_ansi(config.ansi)),
        TracingOutput::Pretty => Box::new(base.pretty().with_ansi(config.ansi)),
        TracingOutput::Json => Box::new(base.json().with_ansi(false)),
    };

    Ok((config.filter()?, layer))
}

/// Install the subscriber for `config` process-wide and apply its
/// performance settings
pub fn init_global_tracing(config: &TracingConfig) -> Result<(), TracingSetupError> {
    performance::configure(config.enable_performance_tracing, config.performance_threshold_us);
    build_subscriber(config)?.try_init()?;
    Ok(())
}
