//! Log subscriber setup
//!
//! The container emits `tracing` events under the `component_factory`
//! target: `debug` for registrations and lifecycle transitions, `trace` for
//! lookups and cache hits, `warn` for destruction failures that are logged
//! and swallowed. This module wires a `tracing-subscriber` for applications
//! that have none of their own.
//!
//! # Features
//!
//! - `logging` - emit events (default)
//! - `logging-json` - JSON subscriber output
//! - `logging-pretty` - human-readable subscriber output
//!
//! # Example
//!
//! ```rust,ignore
//! use component_factory::logging;
//!
//! // Respect RUST_LOG, fall back to debug for the container only
//! logging::builder()
//!     .container_only()
//!     .from_env()
//!     .compact()
//!     .init();
//! ```

#[cfg(feature = "logging")]
use tracing::Level;

/// Target every container event is emitted under.
pub const TARGET: &str = "component_factory";

/// Output format of the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    /// Single line per event
    Compact,
}

#[cfg(feature = "logging")]
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
    from_env: bool,
    with_file: bool,
    with_line_number: bool,
    with_thread_ids: bool,
    with_thread_names: bool,
}

#[cfg(feature = "logging")]
impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Json,
            target: None,
            from_env: false,
            with_file: false,
            with_line_number: false,
            with_thread_ids: false,
            with_thread_names: false,
        }
    }
}

#[cfg(feature = "logging")]
impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn trace(self) -> Self {
        self.with_level(Level::TRACE)
    }

    pub fn debug(self) -> Self {
        self.with_level(Level::DEBUG)
    }

    pub fn info(self) -> Self {
        self.with_level(Level::INFO)
    }

    pub fn warn(self) -> Self {
        self.with_level(Level::WARN)
    }

    /// Only show events from `target`.
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    /// Only show container events.
    pub fn container_only(self) -> Self {
        self.with_target_filter(TARGET)
    }

    /// Take the filter from `RUST_LOG` when it is set.
    pub fn from_env(mut self) -> Self {
        self.from_env = true;
        self
    }

    pub fn with_file(mut self) -> Self {
        self.with_file = true;
        self
    }

    pub fn with_line_number(mut self) -> Self {
        self.with_line_number = true;
        self
    }

    pub fn with_thread_ids(mut self) -> Self {
        self.with_thread_ids = true;
        self
    }

    pub fn with_thread_names(mut self) -> Self {
        self.with_thread_names = true;
        self
    }

    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// Filter directive built from the level and target settings.
    fn directive(&self) -> String {
        match self.target {
            Some(target) => format!("{target}={}", self.level),
            None => self.level.to_string(),
        }
    }

    /// Install the subscriber globally.
    ///
    /// Does nothing if a global subscriber is already installed.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let fallback = self.directive();
        let filter = if self.from_env {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&fallback))
        } else {
            EnvFilter::new(&fallback)
        };

        let layer = fmt::layer()
            .with_file(self.with_file)
            .with_line_number(self.with_line_number)
            .with_thread_ids(self.with_thread_ids)
            .with_thread_names(self.with_thread_names)
            .with_target(true);
        let registry = tracing_subscriber::registry().with(filter);

        let _outcome = match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => registry.with(layer.json()).try_init(),
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => registry.with(layer).try_init(),
            LogFormat::Pretty => registry.with(layer.pretty()).try_init(),
            LogFormat::Compact => registry.with(layer.compact()).try_init(),
        };
    }

    /// No subscriber feature enabled; events still reach any subscriber the application installs.
    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) {}
}

#[cfg(feature = "logging")]
pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// JSON when `logging-json` is enabled, pretty otherwise.
#[cfg(feature = "logging")]
pub fn init() {
    #[cfg(feature = "logging-json")]
    builder().json().from_env().init();
    #[cfg(not(feature = "logging-json"))]
    builder().pretty().from_env().init();
}

#[cfg(feature = "logging")]
pub fn init_json() {
    builder().json().debug().init();
}

#[cfg(feature = "logging")]
pub fn init_pretty() {
    builder().pretty().debug().init();
}

/// Container events only, at debug level.
#[cfg(feature = "logging")]
pub fn init_container_only() {
    builder().container_only().debug().init();
}

#[cfg(all(test, feature = "logging"))]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = LoggingBuilder::default();
        assert_eq!(builder.level, Level::DEBUG);
        assert_eq!(builder.format, LogFormat::Json);
        assert!(builder.target.is_none());
        assert!(!builder.from_env);
        assert_eq!(builder.directive(), "DEBUG");
    }

    #[test]
    fn test_builder_chain() {
        let builder = LoggingBuilder::new()
            .trace()
            .compact()
            .with_file()
            .with_line_number()
            .container_only()
            .from_env();

        assert_eq!(builder.level, Level::TRACE);
        assert_eq!(builder.format, LogFormat::Compact);
        assert!(builder.with_file);
        assert!(builder.with_line_number);
        assert!(builder.from_env);
        assert_eq!(builder.directive(), "component_factory=TRACE");
    }
}
