/*!
 * Error Types
 * Construction and configuration errors with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for fallible combining operations
pub type FcResult<T> = Result<T, FcError>;

/// Errors raised while building or configuring a combining structure
///
/// The add/remove protocol itself never fails; these only surface from
/// constructors and configuration loading.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum FcError {
    #[error("Invalid combining configuration: {0}")]
    #[diagnostic(
        code(combining::invalid_config),
        help("Check pass counts, tuning levels and the exploration interval.")
    )]
    InvalidConfig(String),

    #[error("Too many threads: requested {requested}, maximum is {max}")]
    #[diagnostic(
        code(combining::too_many_threads),
        help("The dead-thread bitmask holds one bit per thread id. Lower num_threads.")
    )]
    TooManyThreads { requested: usize, max: usize },

    #[error("Removal buffer overflow: more than {capacity} dequeues in one session")]
    #[diagnostic(
        code(skiplist::removal_buffer_overflow),
        help("A single combining session buffered more removals than it can hold.")
    )]
    RemovalBufferOverflow { capacity: usize },

    #[error("Failed to parse configuration: {0}")]
    #[diagnostic(
        code(combining::config_parse),
        help("Configuration must be valid JSON matching FcConfig.")
    )]
    ConfigParse(String),
}

impl From<serde_json::Error> for FcError {
    fn from(err: serde_json::Error) -> Self {
        FcError::ConfigParse(err.to_string())
    }
}
