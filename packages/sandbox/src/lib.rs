// ABOUTME: Execution sandbox for running untrusted room source text
// ABOUTME: Child processes confined to a scratch directory, with a wall-clock timeout and output caps

pub mod error;
pub mod executor;
pub mod isolation;
pub mod language;
pub mod types;

mod capture;

pub use error::{Result, SandboxError};
pub use executor::{CodeExecutor, ProcessExecutor};
pub use isolation::IsolationSupport;
pub use language::{LanguageRegistry, LanguageSpec};
pub use types::{ExecutionRequest, ExecutionResult, SandboxConfig};
