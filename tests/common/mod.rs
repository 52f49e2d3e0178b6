#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use sqlx::SqlitePool;

use judged::compilers::{Compiler, CompilerRegistry, RunProfile};
use judged::config::{Config, ShutdownPolicy};
use judged::database as db;
use judged::models::Problem;

// Global counter to ensure unique test database names
static TEST_DB_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn test_db_path(prefix: &str) -> String {
    let test_id = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("data/test_{prefix}_{}_{test_id}.db", std::process::id())
}

pub fn remove_db(db_path: impl AsRef<Path>) {
    let wal_path = format!("{}-wal", db_path.as_ref().display());
    let shm_path = format!("{}-shm", db_path.as_ref().display());
    let _ = fs::remove_file(wal_path);
    let _ = fs::remove_file(shm_path);
    let _ = fs::remove_file(db_path);
}

pub async fn create_test_db(prefix: &str) -> (SqlitePool, TestDbGuard) {
    let db_path = test_db_path(prefix);
    remove_db(&db_path);
    let pool = db::init_db(&db_path)
        .await
        .expect("Failed to initialize test database");
    (pool, TestDbGuard::new(db_path))
}

// RAII guard to ensure cleanup even if test panics
pub struct TestDbGuard {
    pub db_path: String,
}

impl TestDbGuard {
    pub fn new(db_path: String) -> Self {
        Self { db_path }
    }
}

impl Drop for TestDbGuard {
    fn drop(&mut self) {
        remove_db(&self.db_path);
    }
}

/// "Compiles" a shell script by checking its syntax
pub struct ShellCompiler;

impl Compiler for ShellCompiler {
    fn code_name(&self) -> &str {
        "sh"
    }

    fn source_name(&self) -> &str {
        "main.sh"
    }

    fn binary_name(&self) -> &str {
        "main.sh"
    }

    fn command(&self) -> Vec<String> {
        vec!["/bin/sh".into(), "-n".into(), "main.sh".into()]
    }
}

/// Registered as "sh" in place of [`ShellCompiler`]; runs `script` as the compile step
pub struct ScriptCompiler {
    pub script: &'static str,
}

impl Compiler for ScriptCompiler {
    fn code_name(&self) -> &str {
        "sh"
    }

    fn source_name(&self) -> &str {
        "main.sh"
    }

    fn binary_name(&self) -> &str {
        "main.sh"
    }

    fn command(&self) -> Vec<String> {
        vec!["/bin/sh".into(), "-c".into(), self.script.into()]
    }
}

pub struct ShellProfile;

impl RunProfile for ShellProfile {
    fn code_name(&self) -> &str {
        "shell"
    }

    fn command(&self, binary_name: &str, _memory_limit_mb: u32) -> Vec<String> {
        vec!["/bin/sh".into(), binary_name.into()]
    }
}

/// A run profile whose interpreter does not exist
pub struct BrokenProfile;

impl RunProfile for BrokenProfile {
    fn code_name(&self) -> &str {
        "broken"
    }

    fn command(&self, binary_name: &str, _memory_limit_mb: u32) -> Vec<String> {
        vec!["/nonexistent/interpreter".into(), binary_name.into()]
    }
}

pub fn test_registry() -> CompilerRegistry {
    let mut registry = CompilerRegistry::new();
    registry.register_compiler(Box::new(ShellCompiler));
    registry.register_runner(Box::new(ShellProfile));
    registry.register_runner(Box::new(BrokenProfile));
    registry
}

/// Doubles the number it reads
pub const DOUBLER: &str = "read x\necho $((x * 2))\n";

pub const CHECKER: &str = r#"[ "$(cat "$2")" = "$(cat "$3")" ] || { echo "expected $(cat "$3")" >&2; exit 1; }
"#;

/// Problem and checker directories laid out on disk
pub struct Fixture {
    pub problems: tempfile::TempDir,
    pub checkers: tempfile::TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            problems: tempfile::tempdir().unwrap(),
            checkers: tempfile::tempdir().unwrap(),
        }
    }

    pub fn config(&self, tester_name: &str) -> Config {
        Config {
            database: None,
            tester_name: tester_name.to_string(),
            problems_directory: self.problems.path().to_path_buf(),
            checkers_directory: self.checkers.path().to_path_buf(),
            ejudge_execute: None,
            invoker: None,
            poll_interval_ms: 50,
            compile_timeout_secs: 10,
            checker_timeout_secs: 10,
            on_shutdown: ShutdownPolicy::Reclaim,
        }
    }

    /// Writes tests `01`, `02`, ... with answers `01.a`, ... and a comparing checker
    ///
    /// Answers are twice the input unless listed in `wrong`.
    pub fn write_problem(&self, name: &str, inputs: &[u32], wrong: &[u32]) -> PathBuf {
        let dir = self.problems.path().join(name);
        fs::create_dir_all(&dir).unwrap();
        for (i, &input) in inputs.iter().enumerate() {
            let number = i as u32 + 1;
            let answer = if wrong.contains(&number) {
                input * 2 + 1
            } else {
                input * 2
            };
            fs::write(dir.join(format!("{number:02}")), format!("{input}\n")).unwrap();
            fs::write(dir.join(format!("{number:02}.a")), format!("{answer}\n")).unwrap();
        }
        fs::write(dir.join("check.sh"), CHECKER).unwrap();
        dir
    }
}

pub fn problem(name: &str, checker: &str) -> Problem {
    Problem {
        id: 0,
        name: name.to_string(),
        path: name.to_string(),
        time_limit: 2000,
        memory_limit: 64,
        checker: checker.to_string(),
        mask_in: "%02d".to_string(),
        mask_out: "%02d.a".to_string(),
    }
}

/// Inserts a contest, a problem, a compiler and one submission; returns the submission id
pub async fn seed_submission(
    pool: &SqlitePool,
    problem: &Problem,
    is_school: bool,
    runner: &str,
    source: &str,
) -> i64 {
    let contest = db::insert_contest(pool, "Test contest", is_school)
        .await
        .unwrap();
    let problem = db::insert_problem(pool, problem).await.unwrap();
    let compiler = db::insert_compiler(pool, "Shell", "sh", runner)
        .await
        .unwrap();
    db::insert_submission(pool, contest, problem, compiler, source)
        .await
        .unwrap()
}
