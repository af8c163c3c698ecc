// ABOUTME: Error types for sandbox requests
// ABOUTME: Only hard rejections live here; runtime failures are folded into ExecutionResult

use thiserror::Error;

/// Requests the sandbox refuses before spawning anything
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SandboxError {
    /// No interpreter registered for the language tag
    #[error("Code execution for '{0}' is not supported")]
    UnsupportedLanguage(String),

    /// Source text exceeds the configured limit
    #[error("Source is {size} bytes, limit is {limit} bytes")]
    SourceTooLarge { size: usize, limit: usize },
}

/// Type alias for Results that return SandboxError
pub type Result<T> = std::result::Result<T, SandboxError>;
