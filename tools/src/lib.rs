/// Explicit tool-name to invocation mapping
mod config;
pub use config::{Error as ConfigError, Invocation, ToolConfig};

/// Shared seqkit command fragments
mod seqkit;
pub use seqkit::{filter_to_patterns, length_filter, stats_table};
