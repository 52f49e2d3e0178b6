use std::ops::ControlFlow;

use crate::models::{SubmissionState, TestResult, Verdict};
use crate::sandbox::{MIN_MEMORY_KB, MIN_TIME_MS};

/// Decides when testing stops and what the final state is
///
/// Selected once per submission; fed the result of every test that runs.
pub trait ScoringPolicy: Send {
    fn name(&self) -> &'static str;

    /// Takes the result of one test and says whether to run the next one
    fn record(&mut self, result: &TestResult) -> ControlFlow<()>;

    /// Terminal state once testing ends, together with the rows to persist
    fn finish(self: Box<Self>) -> (SubmissionState, Vec<TestResult>);
}

/// Contest scoring: accepted only if every test passes
#[derive(Debug, Default)]
pub struct BinaryPolicy {
    rejected: Option<(u32, Verdict)>,
}

impl ScoringPolicy for BinaryPolicy {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn record(&mut self, result: &TestResult) -> ControlFlow<()> {
        if result.verdict == Verdict::Ok {
            return ControlFlow::Continue(());
        }
        self.rejected = Some((result.test_number, result.verdict));
        ControlFlow::Break(())
    }

    fn finish(self: Box<Self>) -> (SubmissionState, Vec<TestResult>) {
        let state = match self.rejected {
            Some((test, verdict)) => SubmissionState::Rejected { test, verdict },
            None => SubmissionState::Accepted,
        };
        (state, Vec::new())
    }
}

/// School scoring: every test runs, the score is the share of passed tests
#[derive(Debug, Default)]
pub struct PartialCreditPolicy {
    rows: Vec<TestResult>,
    passed: usize,
}

impl ScoringPolicy for PartialCreditPolicy {
    fn name(&self) -> &'static str {
        "partial credit"
    }

    fn record(&mut self, result: &TestResult) -> ControlFlow<()> {
        if result.verdict == Verdict::Ok {
            self.passed += 1;
        }
        self.rows.push(result.clone());
        ControlFlow::Continue(())
    }

    fn finish(self: Box<Self>) -> (SubmissionState, Vec<TestResult>) {
        let score = if self.rows.is_empty() {
            0.0
        } else {
            100.0 * self.passed as f64 / self.rows.len() as f64
        };
        (SubmissionState::Tested { score }, self.rows)
    }
}

pub fn policy_for(is_school: bool) -> Box<dyn ScoringPolicy> {
    if is_school {
        Box::new(PartialCreditPolicy::default())
    } else {
        Box::new(BinaryPolicy::default())
    }
}

/// Running maxima of time and memory across the tests that ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peaks {
    pub time_ms: u64,
    pub memory_kb: u64,
}

impl Default for Peaks {
    fn default() -> Self {
        Self {
            time_ms: MIN_TIME_MS,
            memory_kb: MIN_MEMORY_KB,
        }
    }
}

impl Peaks {
    pub fn observe(&mut self, result: &TestResult) {
        self.time_ms = self.time_ms.max(result.time_ms);
        self.memory_kb = self.memory_kb.max(result.memory_kb);
    }
}
