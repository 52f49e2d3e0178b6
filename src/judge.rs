use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::checker::Checker;
use crate::compilers::{CompileOutcome, CompilerRegistry, compile};
use crate::config::Config;
use crate::database as db;
use crate::models::{Judgement, SubmissionState, TestResult, Verdict};
use crate::sandbox::{RunConfig, SandboxRunner, create_sandbox_runner};
use crate::scoring::{Peaks, policy_for};
use crate::testing::enumerate_tests;

pub const INPUT: &str = "input.txt";
pub const OUTPUT: &str = "output.txt";
pub const ERRLOG: &str = "error.txt";

/// How processing of one submission ended
#[derive(Debug, Clone, PartialEq)]
pub enum Processed {
    /// A terminal state has been stored
    Finished(SubmissionState),
    /// Shutdown was requested before the submission was finished
    Interrupted,
}

/// Compile-and-test pipeline for one claimed submission at a time
pub struct Judge {
    pool: SqlitePool,
    registry: CompilerRegistry,
    runner: Box<dyn SandboxRunner>,
    problems_dir: PathBuf,
    checkers_dir: PathBuf,
    invoker: Option<String>,
    compile_timeout: Duration,
    checker_timeout: Duration,
}

impl Judge {
    pub fn new(pool: SqlitePool, config: &Config, registry: CompilerRegistry) -> Self {
        Self::with_runner(pool, config, registry, create_sandbox_runner(config))
    }

    pub fn with_runner(
        pool: SqlitePool,
        config: &Config,
        registry: CompilerRegistry,
        runner: Box<dyn SandboxRunner>,
    ) -> Self {
        Self {
            pool,
            registry,
            runner,
            problems_dir: config.problems_directory.clone(),
            checkers_dir: config.checkers_directory.clone(),
            invoker: config.invoker.clone(),
            compile_timeout: config.compile_timeout(),
            checker_timeout: config.checker_timeout(),
        }
    }

    pub fn registry(&self) -> &CompilerRegistry {
        &self.registry
    }

    /// Judges submission `id` inside the already cleaned `workdir`
    ///
    /// Configuration problems surface as a [`crate::error::RecoverableError`]
    /// before the stored state is touched. `token` is checked after
    /// compilation and after every test, before anything is recorded.
    pub async fn process(
        &self,
        id: i64,
        workdir: &Path,
        token: &CancellationToken,
    ) -> Result<Processed> {
        let submission = db::fetch_submission(&self.pool, id)
            .await
            .with_context(|| format!("Failed to load submission {id}"))?;
        let problem = &submission.problem;
        let mut policy = policy_for(submission.is_school);
        log::info!("{submission}");
        log::info!(
            "{} / {} ms / {} MB / {}",
            submission.compiler.codename,
            problem.time_limit,
            problem.memory_limit,
            policy.name()
        );

        let compiler = self.registry.compiler(&submission.compiler.codename)?;
        let profile = self.registry.runner(&submission.compiler.runner_codename)?;
        let problem_dir = self.problems_dir.join(&problem.path);
        let checker = Checker::locate(
            &problem.checker,
            &self.checkers_dir,
            &problem_dir,
            self.checker_timeout,
        )?;
        let tests = enumerate_tests(&problem_dir, &problem.mask_in, &problem.mask_out)?;

        db::set_state(&self.pool, id, &SubmissionState::Compiling).await?;
        log::info!("Compiling...");
        let outcome = compile(compiler, &submission.source, workdir, self.compile_timeout).await?;
        // A compiler killed by the shutdown signal is not a compilation error
        if token.is_cancelled() {
            return Ok(Processed::Interrupted);
        }
        let binary = match outcome {
            CompileOutcome::Compiled { binary } => binary,
            CompileOutcome::Failed { diagnostics } => {
                log::info!("Compilation error");
                let judgement = Judgement {
                    diagnostics: Some(diagnostics),
                    ..Judgement::new(SubmissionState::CompileError)
                };
                db::save_judgement(&self.pool, id, &judgement).await?;
                return Ok(Processed::Finished(judgement.state));
            }
        };

        let memory_limit = problem.memory_limit;
        let run_config = RunConfig::new(profile.command(&binary, memory_limit))
            .limits(
                problem.time_limit,
                if profile.sandbox_memory_limit() {
                    memory_limit
                } else {
                    0
                },
            )
            .stdio(OUTPUT, ERRLOG)
            .strict(compiler.strict_sv())
            .invoker(self.invoker.clone());

        let mut peaks = Peaks::default();
        let output = workdir.join(OUTPUT);

        log::info!("Testing {} tests in {}", tests.len(), problem_dir.display());
        for test in &tests {
            if token.is_cancelled() {
                return Ok(Processed::Interrupted);
            }

            db::set_state(&self.pool, id, &SubmissionState::Testing(test.number)).await?;
            tokio::fs::copy(&test.input, workdir.join(INPUT))
                .await
                .with_context(|| format!("Failed to copy {}", test.input.display()))?;

            let run = self.runner.run(&run_config, Path::new(INPUT), workdir).await?;
            let (verdict, comment) = if run.verdict == Verdict::Ok {
                let checked = checker
                    .check(&problem_dir, &test.input, &output, test.answer.as_deref())
                    .await?;
                (checked.verdict, checked.comment)
            } else {
                (run.verdict, String::new())
            };
            // Likewise for a solution or checker that died with it
            if token.is_cancelled() {
                return Ok(Processed::Interrupted);
            }

            let result = TestResult {
                test_number: test.number,
                verdict,
                time_ms: run.time_ms(),
                memory_kb: run.memory_kb(),
                checker_comment: comment,
            };
            log::info!(
                "Test {}: {} ({} ms / {} KB)",
                test.number,
                verdict.code(),
                result.time_ms,
                result.memory_kb
            );
            peaks.observe(&result);

            if policy.record(&result).is_break() {
                break;
            }
        }

        let (state, rows) = policy.finish();
        let judgement = Judgement {
            state,
            time_ms: Some(peaks.time_ms),
            memory_kb: Some(peaks.memory_kb),
            diagnostics: None,
            rows,
        };
        db::save_judgement(&self.pool, id, &judgement).await?;

        log::info!(
            "{} ({:.3} sec / {:.1} MB)",
            judgement.state,
            peaks.time_ms as f64 / 1000.0,
            peaks.memory_kb as f64 / 1024.0
        );
        Ok(Processed::Finished(judgement.state))
    }
}
