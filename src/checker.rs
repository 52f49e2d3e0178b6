use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::RecoverableError;
use crate::models::Verdict;
use crate::truncate_utf8;

/// Longest checker commentary kept per test
pub const MAX_COMMENT_LEN: usize = 4 * 1024;
const NO_ANSWER: &str = "/dev/null";

/// Verdict and commentary of one checker invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub verdict: Verdict,
    pub comment: String,
}

/// A testlib-style output verifier, located once per submission
#[derive(Debug, Clone)]
pub struct Checker {
    argv: Vec<String>,
    timeout: Duration,
}

impl Checker {
    /// Splits `command` shell-style and resolves a relative program name,
    /// first against the shared checkers directory, then against the
    /// problem's test directory
    pub fn locate(
        command: &str,
        checkers_dir: &Path,
        problem_dir: &Path,
        timeout: Duration,
    ) -> Result<Self, RecoverableError> {
        let mut argv = shlex::split(command)
            .filter(|argv| !argv.is_empty())
            .ok_or(RecoverableError::EmptyChecker)?;

        let program = PathBuf::from(&argv[0]);
        let resolved = if program.is_absolute() {
            program
        } else {
            let standard = checkers_dir.join(&program);
            if standard.is_file() {
                standard
            } else {
                problem_dir.join(&program)
            }
        };

        if !resolved.is_file() {
            return Err(RecoverableError::CheckerNotFound(
                resolved.display().to_string(),
            ));
        }
        argv[0] = resolved.to_string_lossy().into_owned();

        Ok(Self { argv, timeout })
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Runs `checker input output answer` from `test_dir`
    ///
    /// A missing `answer` is passed as `/dev/null`. Exit statuses other than
    /// 0, 1 and 2, death by signal and timeouts are system errors.
    pub async fn check(
        &self,
        test_dir: &Path,
        input: &Path,
        output: &Path,
        answer: Option<&Path>,
    ) -> Result<CheckOutcome> {
        let answer = answer.unwrap_or(Path::new(NO_ANSWER));

        let mut cmd = Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..])
            .arg(input)
            .arg(output)
            .arg(answer)
            .current_dir(test_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let output = match timeout(self.timeout, cmd.output()).await {
            Ok(output) => {
                output.with_context(|| format!("Failed to spawn checker {}", self.argv[0]))?
            }
            Err(_) => {
                log::warn!("Checker did not finish in {:?}", self.timeout);
                return Ok(CheckOutcome {
                    verdict: Verdict::SystemError,
                    comment: format!("Checker timed out after {:?}", self.timeout),
                });
            }
        };

        let verdict = Verdict::from_checker_exit(output.status.code());
        if verdict == Verdict::SystemError {
            log::warn!("Checker failed: {}", output.status);
        }

        Ok(CheckOutcome {
            verdict,
            comment: truncate_utf8(
                String::from_utf8_lossy(&output.stderr).into_owned(),
                MAX_COMMENT_LEN,
            ),
        })
    }
}
