use std::fmt;

use anyhow::{Result, anyhow, bail};

/// Categorical outcome of one test execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Ok,
    TimeLimit,
    IdlenessLimit,
    MemoryLimit,
    RuntimeError,
    SecurityViolation,
    WrongAnswer,
    PresentationError,
    SystemError,
}

impl Verdict {
    /// Short code stored in the `verdict` columns
    pub fn code(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::TimeLimit => "TL",
            Self::IdlenessLimit => "IL",
            Self::MemoryLimit => "ML",
            Self::RuntimeError => "RT",
            Self::SecurityViolation => "SV",
            Self::WrongAnswer => "WA",
            Self::PresentationError => "PE",
            Self::SystemError => "SE",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "OK" => Self::Ok,
            "TL" => Self::TimeLimit,
            "IL" => Self::IdlenessLimit,
            "ML" => Self::MemoryLimit,
            "RT" => Self::RuntimeError,
            "SV" => Self::SecurityViolation,
            "WA" => Self::WrongAnswer,
            "PE" => Self::PresentationError,
            "SE" => Self::SystemError,
            _ => return None,
        })
    }

    /// Maps a sandbox `Status:` value. Only run-time verdicts are valid there.
    pub fn from_sandbox_status(status: &str) -> Option<Self> {
        match status {
            "OK" | "TL" | "ML" | "RT" | "SV" => Self::from_code(status),
            _ => None,
        }
    }

    /// Maps a testlib-style checker exit code; `None` means killed by a signal.
    pub fn from_checker_exit(code: Option<i32>) -> Self {
        match code {
            Some(0) => Self::Ok,
            Some(1) => Self::WrongAnswer,
            Some(2) => Self::PresentationError,
            _ => Self::SystemError,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::TimeLimit => "Time limit exceeded",
            Self::IdlenessLimit => "Idleness limit exceeded",
            Self::MemoryLimit => "Memory limit exceeded",
            Self::RuntimeError => "Run-time error",
            Self::SecurityViolation => "Security violation",
            Self::WrongAnswer => "Wrong answer",
            Self::PresentationError => "Presentation error",
            Self::SystemError => "System error",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Lifecycle of a submission as seen by the judge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubmissionState {
    Unjudged,
    Claimed,
    Compiling,
    Testing(u32),
    CompileError,
    Accepted,
    Rejected { test: u32, verdict: Verdict },
    Tested { score: f64 },
    SystemError,
}

impl SubmissionState {
    /// Value of the `state` column
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unjudged => "unjudged",
            Self::Claimed => "claimed",
            Self::Compiling => "compiling",
            Self::Testing(_) => "testing",
            Self::CompileError => "compile_error",
            Self::Accepted => "accepted",
            Self::Rejected { .. } => "rejected",
            Self::Tested { .. } => "tested",
            Self::SystemError => "system_error",
        }
    }

    pub fn test_number(&self) -> Option<u32> {
        match self {
            Self::Testing(test) | Self::Rejected { test, .. } => Some(*test),
            _ => None,
        }
    }

    pub fn verdict(&self) -> Option<Verdict> {
        match self {
            Self::Rejected { verdict, .. } => Some(*verdict),
            Self::Accepted => Some(Verdict::Ok),
            _ => None,
        }
    }

    pub fn score(&self) -> Option<f64> {
        match self {
            Self::Tested { score } => Some(*score),
            _ => None,
        }
    }

    /// Rebuilds a state from its stored columns
    pub fn from_columns(
        label: &str,
        test_number: Option<i64>,
        verdict: Option<&str>,
        score: Option<f64>,
    ) -> Result<Self> {
        let test = || -> Result<u32> {
            let n = test_number.ok_or_else(|| anyhow!("state `{label}` without test number"))?;
            Ok(u32::try_from(n)?)
        };

        Ok(match label {
            "unjudged" => Self::Unjudged,
            "claimed" => Self::Claimed,
            "compiling" => Self::Compiling,
            "testing" => Self::Testing(test()?),
            "compile_error" => Self::CompileError,
            "accepted" => Self::Accepted,
            "rejected" => {
                let code = verdict.ok_or_else(|| anyhow!("rejected state without verdict"))?;
                let verdict =
                    Verdict::from_code(code).ok_or_else(|| anyhow!("unknown verdict `{code}`"))?;
                Self::Rejected {
                    test: test()?,
                    verdict,
                }
            }
            "tested" => Self::Tested {
                score: score.ok_or_else(|| anyhow!("tested state without score"))?,
            },
            "system_error" => Self::SystemError,
            other => bail!("unknown submission state `{other}`"),
        })
    }
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unjudged => f.write_str("Unjudged"),
            Self::Claimed => f.write_str("Queued"),
            Self::Compiling => f.write_str("Compiling..."),
            Self::Testing(test) => write!(f, "Testing... {test}"),
            Self::CompileError => f.write_str("Compilation error"),
            Self::Accepted => f.write_str("Accepted"),
            Self::Rejected { test, verdict } => write!(f, "{verdict} on test {test}"),
            Self::Tested { score } => write!(f, "Tested ({score:.2}%)"),
            Self::SystemError => f.write_str("System error"),
        }
    }
}

/// Read-only description of how a problem is tested
#[derive(Debug, Clone)]
pub struct Problem {
    pub id: i64,
    pub name: String,
    /// Test-data directory, relative to the configured problems root
    pub path: String,
    /// Milliseconds
    pub time_limit: u32,
    /// Megabytes
    pub memory_limit: u32,
    pub checker: String,
    pub mask_in: String,
    /// Empty when the problem has no reference answers
    pub mask_out: String,
}

#[derive(Debug, Clone)]
pub struct CompilerDescriptor {
    pub id: i64,
    pub name: String,
    pub codename: String,
    pub runner_codename: String,
}

/// A claimed submission together with everything needed to judge it
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: i64,
    pub source: String,
    pub compiler: CompilerDescriptor,
    pub problem: Problem,
    /// School contests are scored with partial credit
    pub is_school: bool,
}

impl fmt::Display for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:05}/{:03}] {} ({})",
            self.id, self.problem.id, self.problem.name, self.compiler.name
        )
    }
}

/// One row of per-test results
#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    pub test_number: u32,
    pub verdict: Verdict,
    pub time_ms: u64,
    pub memory_kb: u64,
    pub checker_comment: String,
}

/// Everything written when a submission reaches a terminal state
#[derive(Debug, Clone, PartialEq)]
pub struct Judgement {
    pub state: SubmissionState,
    /// Peak CPU time in milliseconds; `None` when nothing ran
    pub time_ms: Option<u64>,
    /// Peak memory in kilobytes; `None` when nothing ran
    pub memory_kb: Option<u64>,
    pub diagnostics: Option<String>,
    pub rows: Vec<TestResult>,
}

impl Judgement {
    pub fn new(state: SubmissionState) -> Self {
        Self {
            state,
            time_ms: None,
            memory_kb: None,
            diagnostics: None,
            rows: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_columns_round_trip() {
        let states = [
            SubmissionState::Testing(4),
            SubmissionState::Rejected {
                test: 3,
                verdict: Verdict::WrongAnswer,
            },
            SubmissionState::Tested { score: 80.0 },
            SubmissionState::CompileError,
        ];

        for state in states {
            let verdict = state.verdict().map(Verdict::code);
            let restored = SubmissionState::from_columns(
                state.label(),
                state.test_number().map(i64::from),
                verdict,
                state.score(),
            )
            .unwrap();
            assert_eq!(restored, state);
        }
    }

    #[test]
    fn test_state_display() {
        let state = SubmissionState::Rejected {
            test: 3,
            verdict: Verdict::WrongAnswer,
        };
        assert_eq!(state.to_string(), "Wrong answer on test 3");
        assert_eq!(SubmissionState::Testing(2).to_string(), "Testing... 2");
    }

    #[test]
    fn test_checker_exit_mapping() {
        assert_eq!(Verdict::from_checker_exit(Some(0)), Verdict::Ok);
        assert_eq!(Verdict::from_checker_exit(Some(1)), Verdict::WrongAnswer);
        assert_eq!(Verdict::from_checker_exit(Some(2)), Verdict::PresentationError);
        assert_eq!(Verdict::from_checker_exit(Some(3)), Verdict::SystemError);
        assert_eq!(Verdict::from_checker_exit(None), Verdict::SystemError);
    }

    #[test]
    fn test_sandbox_status_rejects_checker_verdicts() {
        assert_eq!(Verdict::from_sandbox_status("ML"), Some(Verdict::MemoryLimit));
        assert_eq!(Verdict::from_sandbox_status("WA"), None);
        assert_eq!(Verdict::from_sandbox_status("ok"), None);
    }
}
