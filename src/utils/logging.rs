//! Logging Module
//!
//! Structured logging setup using the `tracing` crate. Log lines go to
//! stderr so stdout only carries prediction output.

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to include timestamps
    pub timestamps: bool,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            timestamps: true,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Per-request probabilities, module paths and thread ids
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            include_target: true,
            include_thread_ids: true,
            ..Default::default()
        }
    }

    /// Errors only, for machine-readable output
    pub fn quiet() -> Self {
        Self {
            level: Level::ERROR,
            timestamps: false,
            ansi_colors: false,
            ..Default::default()
        }
    }

    /// Pick the preset for the command line flags. `--verbose` wins over `--json`.
    pub fn for_cli(verbose: bool, json: bool) -> Self {
        match (verbose, json) {
            (true, _) => Self::verbose(),
            (false, true) => Self::quiet(),
            (false, false) => Self::default(),
        }
    }
}

/// Install a global compact subscriber for the given configuration
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let builder = FmtSubscriber::builder()
        .with_max_level(config.level)
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact();

    let result = if config.timestamps {
        tracing::subscriber::set_global_default(builder.finish())
    } else {
        tracing::subscriber::set_global_default(builder.without_time().finish())
    };

    result.map_err(|e| format!("Failed to initialize logging: {}", e))
}
