// ABOUTME: Code executor that runs source text in an isolated child process
// ABOUTME: Enforces the wall-clock budget, output caps, and scratch-only working directory

use async_trait::async_trait;
use pairroom_config::ExecutionLimits;
use std::ffi::OsString;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::capture::{read_capped, Captured};
use crate::error::{Result, SandboxError};
#[cfg(unix)]
use crate::isolation::Confinement;
use crate::isolation::IsolationSupport;
use crate::language::{LanguageRegistry, LanguageSpec};
use crate::types::{ExecutionRequest, ExecutionResult, SandboxConfig};

const FALLBACK_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// How long to wait for the output readers once the child is gone
const READER_GRACE: Duration = Duration::from_millis(500);

/// Anything that can turn an ExecutionRequest into an ExecutionResult
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Whether `language` can be executed at all
    fn supports(&self, language: &str) -> bool;

    /// Run the request. Only hard rejections are returned as errors; every
    /// runtime failure, including a timeout, comes back as a result.
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult>;
}

/// Executes source text as a local child process
pub struct ProcessExecutor {
    config: SandboxConfig,
    languages: LanguageRegistry,
    isolation: IsolationSupport,
}

impl ProcessExecutor {
    pub fn new(config: SandboxConfig, languages: LanguageRegistry) -> Self {
        let isolation = IsolationSupport::detect();
        if !isolation.filesystem {
            warn!(
                required = config.require_isolation,
                "Landlock is unavailable, sandbox children can write outside their scratch directory"
            );
        }
        if !isolation.network {
            warn!(
                required = config.require_isolation,
                "Landlock network rules are unavailable, network isolation relies on user namespaces"
            );
        }

        Self {
            config,
            languages,
            isolation,
        }
    }

    /// Build an executor for the configured python interpreter
    pub fn from_limits(limits: &ExecutionLimits) -> Self {
        Self::new(
            SandboxConfig::from_limits(limits),
            LanguageRegistry::with_python(limits.python_bin.clone()),
        )
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn languages(&self) -> &LanguageRegistry {
        &self.languages
    }

    /// Confinement this host can enforce on each child
    pub fn isolation(&self) -> IsolationSupport {
        self.isolation
    }

    fn validate(&self, request: &ExecutionRequest) -> Result<&LanguageSpec> {
        let spec = self
            .languages
            .get(&request.language)
            .ok_or_else(|| SandboxError::UnsupportedLanguage(request.language.clone()))?;

        if request.source.len() > self.config.max_source_bytes {
            return Err(SandboxError::SourceTooLarge {
                size: request.source.len(),
                limit: self.config.max_source_bytes,
            });
        }

        Ok(spec)
    }

    fn scratch_dir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pairroom-run-");
        match &self.config.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }

    async fn run(&self, spec: &LanguageSpec, source: &str) -> std::io::Result<ExecutionResult> {
        let started = Instant::now();

        // Removed on drop, after the child is gone
        let scratch = self.scratch_dir()?;
        tokio::fs::write(scratch.path().join(&spec.file_name), source).await?;

        let path = std::env::var_os("PATH").unwrap_or_else(|| OsString::from(FALLBACK_PATH));

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .arg(&spec.file_name)
            .current_dir(scratch.path())
            .env_clear()
            .env("PATH", path)
            .env("HOME", scratch.path())
            .env("TMPDIR", scratch.path())
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            let confinement = Confinement::for_run(scratch.path(), self.isolation, &self.config)?;
            limits::apply(&mut command, &self.config, confinement);
        }

        let mut child = command.spawn()?;
        let pid = child.id();
        debug!(pid = ?pid, program = %spec.program, "Spawned sandbox child");

        let cap = self.config.max_output_bytes;
        let stdout_task = child
            .stdout
            .take()
            .map(|stream| tokio::spawn(read_capped(stream, cap)));
        let stderr_task = child
            .stderr
            .take()
            .map(|stream| tokio::spawn(read_capped(stream, cap)));

        let (status, timed_out) =
            match tokio::time::timeout(self.config.timeout, child.wait()).await {
                Ok(status) => (Some(status?), false),
                Err(_) => {
                    warn!(
                        pid = ?pid,
                        timeout_ms = self.config.timeout.as_millis() as u64,
                        "Sandbox child exceeded its time budget, killing"
                    );
                    terminate(&mut child).await;
                    (None, true)
                }
            };

        // Reap anything the child left behind in its process group
        #[cfg(unix)]
        limits::kill_group(pid);

        let stdout = collect(stdout_task).await;
        let stderr = collect(stderr_task).await;
        let duration = started.elapsed();

        let mut stderr_text = stderr.text;
        if timed_out {
            if !stderr_text.is_empty() && !stderr_text.ends_with('\n') {
                stderr_text.push('\n');
            }
            stderr_text.push_str(&format!(
                "Execution timed out after {} ms",
                self.config.timeout.as_millis()
            ));
        }

        Ok(ExecutionResult {
            success: !timed_out && status.map(|s| s.success()).unwrap_or(false),
            stdout: stdout.text,
            stderr: stderr_text,
            duration_ms: duration.as_millis() as u64,
            timed_out,
            truncated: stdout.truncated || stderr.truncated,
            exit_code: status.and_then(|s| s.code()),
        })
    }
}

#[async_trait]
impl CodeExecutor for ProcessExecutor {
    fn supports(&self, language: &str) -> bool {
        self.languages.supports(language)
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult> {
        let spec = self.validate(request)?;

        if self.config.require_isolation && !self.isolation.filesystem {
            warn!(language = %spec.tag, "Refusing to run without filesystem isolation");
            return Ok(ExecutionResult::failed(
                "Execution is disabled: this host cannot confine the sandbox filesystem",
                Duration::ZERO,
            ));
        }

        info!(
            language = %spec.tag,
            bytes = request.source.len(),
            requested_by = ?request.requested_by,
            "Starting sandboxed execution"
        );

        let started = Instant::now();
        let result = match self.run(spec, &request.source).await {
            Ok(result) => result,
            Err(e) => {
                warn!(program = %spec.program, error = %e, "Sandboxed execution could not start");
                ExecutionResult::failed(
                    format!("Failed to start {}: {}", spec.program, e),
                    started.elapsed(),
                )
            }
        };

        info!(
            success = result.success,
            timed_out = result.timed_out,
            duration_ms = result.duration_ms,
            exit_code = ?result.exit_code,
            "Sandboxed execution finished"
        );

        Ok(result)
    }
}

async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    limits::kill_group(child.id());

    if let Err(e) = child.kill().await {
        debug!("Failed to kill sandbox child: {}", e);
    }
}

async fn collect(task: Option<JoinHandle<Captured>>) -> Captured {
    let Some(mut task) = task else {
        return Captured::default();
    };

    match tokio::time::timeout(READER_GRACE, &mut task).await {
        Ok(Ok(captured)) => captured,
        Ok(Err(e)) => {
            warn!("Output reader task failed: {}", e);
            Captured::default()
        }
        Err(_) => {
            task.abort();
            debug!("Output reader did not finish in time, dropping stream");
            Captured::default()
        }
    }
}

#[cfg(unix)]
mod limits {
    use super::{Confinement, SandboxConfig};
    use nix::sys::resource::{setrlimit, Resource};
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;
    use tokio::process::Command;

    /// Put the child in its own process group, apply rlimits, then enter
    /// the confinement before exec.
    pub(super) fn apply(command: &mut Command, config: &SandboxConfig, mut confinement: Confinement) {
        let cpu_seconds = config.timeout.as_secs().saturating_add(1);
        let file_bytes = config.max_file_bytes;
        #[cfg(target_os = "linux")]
        let memory_bytes = config.memory_mb.saturating_mul(1024 * 1024);

        command.process_group(0);

        // SAFETY: the hook only issues setrlimit, unshare, prctl and landlock
        // syscalls. The ruleset was built in the parent.
        unsafe {
            command.pre_exec(move || {
                setrlimit(Resource::RLIMIT_CPU, cpu_seconds, cpu_seconds)?;
                setrlimit(Resource::RLIMIT_FSIZE, file_bytes, file_bytes)?;
                setrlimit(Resource::RLIMIT_CORE, 0, 0)?;

                #[cfg(target_os = "linux")]
                {
                    if memory_bytes > 0 {
                        setrlimit(Resource::RLIMIT_AS, memory_bytes, memory_bytes)?;
                    }
                }

                confinement.enter()
            });
        }
    }

    pub(super) fn kill_group(pid: Option<u32>) {
        if let Some(pid) = pid {
            let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
        }
    }
}
