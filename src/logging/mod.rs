//! Logging infrastructure - structured tracing throughout the runtime
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log levels via environment
//! - Zero-cost when disabled
//! - Console output with optional span events

use once_cell::sync::OnceCell;
use std::io;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

pub use tracing::{debug, error, info, trace, warn};

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // GCPTR_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("GCPTR_LOG_LEVEL") {
            config.level = match level_str.to_lowercase().as_str() {
                "trace" => Level::TRACE,
                "debug" => Level::DEBUG,
                "info" => Level::INFO,
                "warn" => Level::WARN,
                "error" => Level::ERROR,
                _ => Level::INFO,
            };
        }

        // GCPTR_LOG_JSON: enable JSON format
        config.json_format = std::env::var("GCPTR_LOG_JSON").is_ok();

        // GCPTR_LOG_SPANS: show span events
        config.show_spans = std::env::var("GCPTR_LOG_SPANS").is_ok();

        config
    }

    /// Create high-performance config (minimal logging)
    pub fn performance() -> Self {
        Self {
            level: Level::ERROR,
            json_format: false,
            show_spans: false,
        }
    }
}

/// Initialize logging with default configuration
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("gcptr={}", config.level.as_str().to_lowercase()))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(io::stdout)
                    .with_span_events(span_events)
                    .with_target(true)
                    .with_thread_ids(cfg!(debug_assertions))
                    .with_line_number(cfg!(debug_assertions)),
            )
            .init();
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Runtime-specific logging functions
// ============================================================================

/// Log adoption of a raw allocation into the registry
#[inline]
pub fn log_allocation(ptr: *const u8, len: usize) {
    trace!(
        event = "allocation",
        address = ?ptr,
        elements = len,
        "Allocation registered"
    );
}

/// Log release of a managed allocation
#[inline]
pub fn log_deallocation(ptr: *const u8) {
    trace!(
        event = "deallocation",
        address = ?ptr,
        "Memory released"
    );
}

/// Log completion of a collection sweep
pub fn log_sweep_complete(freed: usize, remaining: usize) {
    debug!(
        event = "sweep_complete",
        allocations_freed = freed,
        entries_remaining = remaining,
        "Collection sweep complete"
    );
}

/// Log forced reclamation at process shutdown
pub fn log_shutdown_flush(entries: usize) {
    info!(
        event = "shutdown_flush",
        entries = entries,
        "Forcing reclamation of all resident allocations"
    );
}
