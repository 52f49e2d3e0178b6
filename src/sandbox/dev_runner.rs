use std::fs::File;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::time::timeout;

use crate::models::Verdict;

use super::{Capabilities, RunConfig, RunOutcome, SandboxRunner};

const DEFAULT_TIME_LIMIT_MS: u32 = 1000;
const TERM_GRACE: Duration = Duration::from_millis(500);

/// A simple runner that executes solutions without sandboxing
///
/// DevRunner only enforces a wall-clock timeout. It cannot detect memory limit
/// or security violations and never measures memory, so it reports OK, run-time
/// error or time limit only. Use it in development environments only.
#[derive(Debug, Default)]
pub struct DevRunner;

impl DevRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SandboxRunner for DevRunner {
    fn name(&self) -> &'static str {
        "DevRunner"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            memory_limit: false,
            security: false,
            idleness: false,
        }
    }

    async fn run(&self, config: &RunConfig, input: &Path, workdir: &Path) -> Result<RunOutcome> {
        let time_limit = match config.time_limit_ms() {
            0 => DEFAULT_TIME_LIMIT_MS,
            ms => ms,
        };

        let argv = config.wrap_invoker(resolve_program(config.command(), workdir));
        if argv.is_empty() {
            bail!("Empty run command");
        }

        let stdin = File::open(workdir.join(input))
            .with_context(|| format!("Failed to open input {}", input.display()))?;

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .current_dir(workdir)
            .stdin(Stdio::from(stdin))
            .stdout(redirect(workdir, config.stdout())?)
            .stderr(redirect(workdir, config.stderr())?)
            .process_group(0)
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", argv[0]))?;
        let started = Instant::now();

        match timeout(Duration::from_millis(time_limit.into()), child.wait()).await {
            Ok(status) => {
                let status = status?;
                let elapsed = started.elapsed().as_millis() as u64;
                let verdict = if status.success() {
                    Verdict::Ok
                } else {
                    log::debug!("Solution exited with {status}");
                    Verdict::RuntimeError
                };
                Ok(RunOutcome {
                    verdict,
                    cpu_time_ms: elapsed,
                    real_time_ms: elapsed,
                    memory_kb: None,
                })
            }
            Err(_) => {
                terminate(&mut child).await?;
                Ok(RunOutcome {
                    verdict: Verdict::TimeLimit,
                    cpu_time_ms: time_limit.into(),
                    real_time_ms: time_limit.into(),
                    memory_kb: None,
                })
            }
        }
    }
}

/// Makes `./binary` style commands absolute so they do not depend on how the
/// platform resolves relative programs against `current_dir`
fn resolve_program(command: &[String], workdir: &Path) -> Vec<String> {
    let mut argv = command.to_vec();
    if let Some(program) = argv.first_mut() {
        if let Some(name) = program.strip_prefix("./") {
            let resolved = workdir.join(name).to_string_lossy().into_owned();
            *program = resolved;
        }
    }
    argv
}

fn redirect(workdir: &Path, name: Option<&str>) -> Result<Stdio> {
    match name {
        Some(name) => Ok(Stdio::from(File::create(workdir.join(name))?)),
        None => Ok(Stdio::null()),
    }
}

/// Asks the child to stop, then kills it if it does not within the grace period
async fn terminate(child: &mut Child) -> Result<()> {
    if let Some(pid) = child.id() {
        // SAFETY: the child has not been reaped yet, so the pid still refers to it
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
    if timeout(TERM_GRACE, child.wait()).await.is_err() {
        child.kill().await?;
    }
    Ok(())
}
