use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Verdict;

/// Smallest CPU time ever reported, in milliseconds
pub const MIN_TIME_MS: u64 = 1;
/// Smallest memory usage ever reported, in kilobytes
pub const MIN_MEMORY_KB: u64 = 125;

/// Trait for different solution execution implementations
///
/// This trait abstracts running one compiled program against one input file,
/// from full limit enforcement through an external sandbox tool to plain
/// process spawning without any isolation.
#[async_trait]
pub trait SandboxRunner: Send + Sync {
    fn name(&self) -> &'static str;

    /// What this runner is able to enforce and detect
    fn capabilities(&self) -> Capabilities;

    /// Runs the program described by `config` inside `workdir`, feeding it `input`
    async fn run(&self, config: &RunConfig, input: &Path, workdir: &Path) -> Result<RunOutcome>;
}

/// Limits a runner can honour. Verdicts outside these are never reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub memory_limit: bool,
    pub security: bool,
    pub idleness: bool,
}

/// Everything needed to launch a solution once
///
/// Built once per submission from the run profile and the problem limits;
/// never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunConfig {
    command: Vec<String>,
    stdout: Option<String>,
    stderr: Option<String>,
    time_limit_ms: u32,
    memory_limit_mb: u32,
    strict_sv: bool,
    invoker: Option<String>,
}

impl RunConfig {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            ..Self::default()
        }
    }

    pub fn limits(mut self, time_limit_ms: u32, memory_limit_mb: u32) -> Self {
        self.time_limit_ms = time_limit_ms;
        self.memory_limit_mb = memory_limit_mb;
        self
    }

    pub fn stdio(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = Some(stdout.into());
        self.stderr = Some(stderr.into());
        self
    }

    /// Forbid dangerous system calls in the sandbox
    pub fn strict(mut self, strict_sv: bool) -> Self {
        self.strict_sv = strict_sv;
        self
    }

    /// Run everything as another user via `sudo -u`
    pub fn invoker(mut self, user: Option<String>) -> Self {
        self.invoker = user;
        self
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn stdout(&self) -> Option<&str> {
        self.stdout.as_deref()
    }

    pub fn stderr(&self) -> Option<&str> {
        self.stderr.as_deref()
    }

    pub fn time_limit_ms(&self) -> u32 {
        self.time_limit_ms
    }

    pub fn memory_limit_mb(&self) -> u32 {
        self.memory_limit_mb
    }

    pub fn strict_sv(&self) -> bool {
        self.strict_sv
    }

    /// Prefixes `argv` with the sudo invocation, if any
    pub(crate) fn wrap_invoker(&self, argv: Vec<String>) -> Vec<String> {
        match &self.invoker {
            Some(user) => ["sudo", "-u", user]
                .into_iter()
                .map(String::from)
                .chain(argv)
                .collect(),
            None => argv,
        }
    }
}

/// Raw result of one run, before floors are applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub verdict: Verdict,
    pub cpu_time_ms: u64,
    pub real_time_ms: u64,
    /// `None` when the runner cannot measure memory
    pub memory_kb: Option<u64>,
}

impl RunOutcome {
    /// CPU time with the reporting floor applied
    pub fn time_ms(&self) -> u64 {
        self.cpu_time_ms.max(MIN_TIME_MS)
    }

    /// Memory with the reporting floor applied
    pub fn memory_kb(&self) -> u64 {
        self.memory_kb.unwrap_or(0).max(MIN_MEMORY_KB)
    }
}
