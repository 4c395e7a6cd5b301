//! Logging Module
//!
//! Structured logging utilities using the `tracing` crate.

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs (useful to see loader workers)
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Verbose config for debugging sampler and collate decisions
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }

    /// Errors only
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// Parse a level name, falling back to `Info`
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Initialize the global subscriber with the given configuration
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Progress logger for iterating over the batches of one epoch
pub struct BatchProgress {
    /// Loader name ("train" / "eval")
    name: String,
    /// Epoch being iterated
    epoch: usize,
    /// Expected number of batches
    total: usize,
    /// Batches seen so far
    current: usize,
    /// Batches that carried soft (mixed) targets
    mixed: usize,
    /// Log every N batches
    log_interval: usize,
    start_time: std::time::Instant,
}

impl BatchProgress {
    /// Create a new progress logger
    pub fn new(name: &str, epoch: usize, total: usize) -> Self {
        Self {
            name: name.to_string(),
            epoch,
            total,
            current: 0,
            mixed: 0,
            log_interval: (total / 10).max(1),
            start_time: std::time::Instant::now(),
        }
    }

    /// Record one finished batch
    pub fn record(&mut self, mixed: bool) {
        self.current += 1;
        if mixed {
            self.mixed += 1;
        }

        if self.current % self.log_interval == 0 || self.current == self.total {
            let elapsed = self.start_time.elapsed().as_secs_f64();
            let per_sec = if elapsed > 0.0 {
                self.current as f64 / elapsed
            } else {
                0.0
            };

            tracing::info!(
                "[{}] epoch {}: batch {}/{} ({:.1} batches/s, {} mixed)",
                self.name,
                self.epoch,
                self.current,
                self.total,
                per_sec,
                self.mixed
            );
        }
    }

    /// Number of batches recorded
    pub fn seen(&self) -> usize {
        self.current
    }

    /// Number of recorded batches with soft targets
    pub fn mixed(&self) -> usize {
        self.mixed
    }

    /// Log completion
    pub fn finish(&self) {
        tracing::info!(
            "[{}] epoch {}: {} batches in {:.2}s ({} mixed)",
            self.name,
            self.epoch,
            self.current,
            self.start_time.elapsed().as_secs_f64(),
            self.mixed
        );
    }
}
