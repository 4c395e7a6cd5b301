//! Utilities module for logging and error handling
//!
//! - Structured logging with tracing
//! - The pipeline error type

pub mod error;
pub mod logging;

pub use error::{PipelineError, Result, ResultExt};
pub use logging::{init_logging, BatchProgress, LogConfig, LogLevel};
