use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use crate::models::Verdict;

use super::{Capabilities, RunConfig, RunOutcome, SandboxRunner, parse_report};

/// File in the scratch directory that keeps the last raw sandbox report
const REPORT_FILE: &str = "ejudge.log";

// The sandbox enforces its own real-time limit of five times the time limit;
// this is only a backstop against the tool itself hanging
const TIMEOUT_SLACK: Duration = Duration::from_secs(5);
const UNLIMITED_TIMEOUT: Duration = Duration::from_secs(60);

/// A runner that invokes an `ejudge-execute` compatible sandbox and parses its report
///
/// The sandbox enforces CPU time, real time, address space and stack limits and,
/// in strict mode, forbids dangerous system calls.
pub struct EJudgeRunner {
    exe: PathBuf,
}

impl EJudgeRunner {
    pub fn new(exe: PathBuf) -> Self {
        Self { exe }
    }

    /// Builds the complete sandbox invocation for one run
    pub fn command_line(&self, config: &RunConfig, input: &Path) -> Vec<String> {
        let mut cmd = vec![self.exe.to_string_lossy().into_owned()];

        if let Some(stdout) = config.stdout() {
            cmd.push(format!("--stdout={stdout}"));
        }
        if let Some(stderr) = config.stderr() {
            cmd.push(format!("--stderr={stderr}"));
        }

        let time_limit = config.time_limit_ms();
        if time_limit > 0 {
            cmd.push(format!("--time-limit-millis={time_limit}"));
            cmd.push(format!("--real-time-limit={:.6}", f64::from(time_limit) / 200.0));
        }

        let memory_limit = config.memory_limit_mb();
        if memory_limit > 0 {
            cmd.push("--memory-limit".to_string());
            cmd.push(format!("--max-vm-size={memory_limit}M"));
            cmd.push(format!("--max-stack-size={memory_limit}M"));
        }

        if config.strict_sv() {
            cmd.push("--secure-exec".to_string());
            cmd.push("--security-violation".to_string());
        }

        cmd.push(format!("--stdin={}", input.display()));
        cmd.extend(config.command().iter().cloned());

        config.wrap_invoker(cmd)
    }

    fn wall_timeout(config: &RunConfig) -> Duration {
        match config.time_limit_ms() {
            0 => UNLIMITED_TIMEOUT,
            ms => Duration::from_millis(u64::from(ms) * 5) + TIMEOUT_SLACK,
        }
    }
}

#[async_trait]
impl SandboxRunner for EJudgeRunner {
    fn name(&self) -> &'static str {
        "EJudgeRunner"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            memory_limit: true,
            security: true,
            idleness: true,
        }
    }

    async fn run(&self, config: &RunConfig, input: &Path, workdir: &Path) -> Result<RunOutcome> {
        let argv = self.command_line(config, input);
        log::debug!("Executing {argv:?}");

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let started = Instant::now();
        let output = match timeout(Self::wall_timeout(config), cmd.output()).await {
            Ok(output) => output.with_context(|| format!("Failed to spawn {}", argv[0]))?,
            Err(_) => {
                log::warn!("Sandbox did not finish in time, killed");
                let limit = u64::from(config.time_limit_ms());
                return Ok(RunOutcome {
                    verdict: Verdict::TimeLimit,
                    cpu_time_ms: limit,
                    real_time_ms: started.elapsed().as_millis() as u64,
                    memory_kb: None,
                });
            }
        };

        tokio::fs::write(workdir.join(REPORT_FILE), &output.stderr).await?;
        let report = parse_report(&String::from_utf8_lossy(&output.stderr))?;

        let time_limit = u64::from(config.time_limit_ms());
        let verdict = if report.verdict == Verdict::TimeLimit
            && report.cpu_time_ms < time_limit
            && report.real_time_ms >= time_limit
        {
            // The sandbox cannot tell TL and IL apart
            Verdict::IdlenessLimit
        } else {
            report.verdict
        };

        Ok(RunOutcome {
            verdict,
            cpu_time_ms: report.cpu_time_ms,
            real_time_ms: report.real_time_ms,
            memory_kb: Some(report.memory_kb),
        })
    }
}
