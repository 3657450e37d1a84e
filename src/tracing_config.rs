//! Tracing subscriber setup for the command-line front end
//!
//! The library only emits `tracing` events and `log` records; installing a
//! subscriber is left to applications. `log` records from the engine backends
//! reach the subscriber through `tracing-subscriber`'s log bridge.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Output format of the subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output with colors (default)
    Console,
    /// Plain compact output for CI logs
    Compact,
    /// JSON lines for machine consumption
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Tracing configuration builder
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Environment filter string (overrides verbosity if set)
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-2+)
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Set a custom filter directive such as `sam2_prompt=debug,ort=warn`
    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Filter directive for the configured verbosity
    ///
    /// ONNX Runtime is chatty at debug level, so it stays at `warn` unless
    /// tracing everything.
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info,ort=warn",
            1 => "debug,ort=warn",
            _ => "trace",
        }
    }

    /// Resolve the effective filter: explicit directive, then `RUST_LOG`, then verbosity
    ///
    /// # Errors
    /// - Invalid filter directive syntax
    pub fn build_filter(&self) -> anyhow::Result<EnvFilter> {
        if let Some(directive) = &self.env_filter {
            return Ok(EnvFilter::try_new(directive)?);
        }
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => Ok(EnvFilter::try_new(self.verbosity_to_filter())?),
        }
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid filter directive syntax
    /// - A global subscriber is already installed
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let registry = Registry::default().with(self.build_filter()?);

        match self.format {
            TracingFormat::Console => {
                let layer = fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact();
                registry.with(layer).try_init()?;
            },
            TracingFormat::Compact => {
                let layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .compact();
                registry.with(layer).try_init()?;
            },
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                let layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr);
                registry.with(layer).try_init()?;
            },
        }

        tracing::debug!(verbosity = self.verbosity, "Tracing initialized");
        Ok(())
    }
}

/// Initialize tracing with CLI defaults
///
/// # Errors
/// - See [`TracingConfig::init`]
pub fn init_cli_tracing(verbosity: u8, format: TracingFormat) -> anyhow::Result<()> {
    TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(format)
        .init()
}

/// Span helpers for the CLI workflow
pub mod spans {
    use tracing::{Level, Span};

    /// Span covering model loading
    pub fn model_loading(model_dir: &std::path::Path, backend: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "model_loading",
            model_dir = %model_dir.display(),
            backend = %backend
        )
    }

    /// Span covering mask generation for one input image
    pub fn image_generation(image_path: &std::path::Path, dimensions: (u32, u32)) -> Span {
        tracing::span!(
            Level::INFO,
            "image_generation",
            image = %image_path.display(),
            width = dimensions.0,
            height = dimensions.1
        )
    }

    /// Span covering export of generated masks
    pub fn mask_export(output_dir: &std::path::Path, masks: usize) -> Span {
        tracing::span!(
            Level::DEBUG,
            "mask_export",
            output_dir = %output_dir.display(),
            masks
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_mapping() {
        assert_eq!(TracingConfig::new().verbosity_to_filter(), "info,ort=warn");
        assert_eq!(TracingConfig::new().with_verbosity(1).verbosity_to_filter(), "debug,ort=warn");
        assert_eq!(TracingConfig::new().with_verbosity(2).verbosity_to_filter(), "trace");
        assert_eq!(TracingConfig::new().with_verbosity(9).verbosity_to_filter(), "trace");
    }

    #[test]
    fn test_explicit_filter_wins() {
        let config = TracingConfig::new()
            .with_verbosity(2)
            .with_env_filter("sam2_prompt=debug");
        assert_eq!(config.build_filter().unwrap().to_string(), "sam2_prompt=debug");
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let config = TracingConfig::new().with_env_filter("sam2_prompt=notalevel");
        assert!(config.build_filter().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.verbosity, 0);
        assert_eq!(config.format, TracingFormat::Console);
        assert!(config.env_filter.is_none());
    }
}
