mod dev_runner;
mod ejudge_runner;
mod protocol;
mod runner;

// Re-export the trait and common types
pub use dev_runner::DevRunner;
pub use ejudge_runner::EJudgeRunner;
pub use protocol::{Report, parse_report};
pub use runner::{
    Capabilities, MIN_MEMORY_KB, MIN_TIME_MS, RunConfig, RunOutcome, SandboxRunner,
};

use crate::config::Config;

/// Creates a sandbox runner based on the daemon configuration
///
/// If an `ejudge_execute` path is configured, creates an EJudgeRunner that
/// delegates limits and isolation to that tool. Otherwise, creates a DevRunner
/// that only provides a wall-clock timeout and is meant for development.
pub fn create_sandbox_runner(config: &Config) -> Box<dyn SandboxRunner> {
    let runner: Box<dyn SandboxRunner> = match &config.ejudge_execute {
        Some(exe) => {
            log::info!("Creating EJudgeRunner ({})", exe.display());
            Box::new(EJudgeRunner::new(exe.clone()))
        }
        None => {
            log::info!("Creating DevRunner (no ejudge_execute configured)");
            Box::new(DevRunner::new())
        }
    };

    let caps = runner.capabilities();
    if !caps.memory_limit || !caps.security {
        log::warn!(
            "{} cannot detect memory limit or security violations - use only in trusted environments",
            runner.name()
        );
    }
    if !caps.idleness {
        log::info!("{} reports idle solutions as time limit exceeded", runner.name());
    }
    runner
}
