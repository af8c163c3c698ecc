// ABOUTME: Core type definitions for sandboxed execution
// ABOUTME: Requests, results, and the limits applied to each child process

use chrono::{DateTime, Utc};
use pairroom_config::ExecutionLimits;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Request to run a piece of source text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Source text to execute
    pub source: String,
    /// Language tag, e.g. "python"
    pub language: String,
    /// Connection that asked for the run, if any
    pub requested_by: Option<String>,
    pub requested_at: DateTime<Utc>,
}

impl ExecutionRequest {
    pub fn new(source: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            language: language.into(),
            requested_by: None,
            requested_at: Utc::now(),
        }
    }

    pub fn requested_by(mut self, connection_id: impl Into<String>) -> Self {
        self.requested_by = Some(connection_id.into());
        self
    }
}

/// Outcome of a run. Every runtime failure is represented here rather than
/// as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
    /// Either stream hit the capture cap
    pub truncated: bool,
    pub exit_code: Option<i32>,
}

impl ExecutionResult {
    /// A run that never produced a process exit (spawn failure, scratch setup)
    pub fn failed(stderr: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: duration.as_millis() as u64,
            timed_out: false,
            truncated: false,
            exit_code: None,
        }
    }
}

/// Limits applied to every child process
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Wall-clock budget; the child is killed when it elapses
    pub timeout: Duration,
    /// Per-stream capture cap in bytes
    pub max_output_bytes: usize,
    /// Largest source text accepted
    pub max_source_bytes: usize,
    /// Address-space limit in megabytes (unix only)
    pub memory_mb: u64,
    /// Largest file the child may write into its scratch area
    pub max_file_bytes: u64,
    /// Parent directory for per-run scratch directories (system temp dir when unset)
    pub scratch_root: Option<PathBuf>,
    /// Detach the child from the host network where the kernel allows it
    pub isolate_network: bool,
    /// Fail runs instead of executing them unconfined
    pub require_isolation: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self::from_limits(&ExecutionLimits::default())
    }
}

impl SandboxConfig {
    pub fn from_limits(limits: &ExecutionLimits) -> Self {
        Self {
            timeout: limits.timeout,
            max_output_bytes: limits.max_output_bytes,
            max_source_bytes: limits.max_source_bytes,
            memory_mb: limits.memory_mb,
            max_file_bytes: 16 * 1024 * 1024,
            scratch_root: None,
            isolate_network: true,
            require_isolation: limits.require_isolation,
        }
    }
}
