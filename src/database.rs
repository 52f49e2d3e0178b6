use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite};

use crate::create_timestamp;
use crate::models::{
    CompilerDescriptor, Judgement, Problem, Submission, SubmissionState, TestResult, Verdict,
};

const DATABASE_NAME: &str = "judged.sqlite3";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn get_db_path() -> anyhow::Result<PathBuf> {
    use directories::ProjectDirs;

    let proj_dirs =
        ProjectDirs::from("", "", "judged").context("Unable to find user directory")?;
    let data_dir = proj_dirs.data_local_dir();

    fs::create_dir_all(data_dir).context("Failed to create local data dir")?;

    Ok(data_dir.join(DATABASE_NAME))
}

pub async fn init_db(db_path: impl AsRef<Path>) -> sqlx::Result<SqlitePool> {
    // Pragmas go on the connect options so that every pooled connection gets them
    let options = SqliteConnectOptions::from_str(&format!(
        "sqlite://{}",
        db_path.as_ref().display()
    ))?
    .create_if_missing(true)
    .foreign_keys(true)
    .busy_timeout(BUSY_TIMEOUT)
    .journal_mode(SqliteJournalMode::Wal)
    .synchronous(SqliteSynchronous::Normal);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(0)
        .connect_with(options)
        .await?;

    let mut tx = db_pool.begin().await?;

    for sql in &[
        r"
        CREATE TABLE IF NOT EXISTS contests (
            id            INTEGER  PRIMARY KEY,
            name          TEXT     NOT NULL,
            is_school     INTEGER  NOT NULL DEFAULT 0
        );",
        r"
        CREATE TABLE IF NOT EXISTS problems (
            id            INTEGER  PRIMARY KEY,
            name          TEXT     NOT NULL,
            path          TEXT     NOT NULL,
            time_limit    INTEGER  NOT NULL,
            memory_limit  INTEGER  NOT NULL,
            checker       TEXT     NOT NULL,
            mask_in       TEXT     NOT NULL,
            mask_out      TEXT     NOT NULL DEFAULT ''
        );",
        r"
        CREATE TABLE IF NOT EXISTS compilers (
            id               INTEGER  PRIMARY KEY,
            name             TEXT     NOT NULL,
            codename         TEXT     NOT NULL,
            runner_codename  TEXT     NOT NULL
        );",
        r"
        CREATE TABLE IF NOT EXISTS submissions (
            id            INTEGER  PRIMARY KEY,
            contest_id    INTEGER  NOT NULL,
            problem_id    INTEGER  NOT NULL,
            compiler_id   INTEGER  NOT NULL,
            source        TEXT     NOT NULL,
            state         TEXT     NOT NULL DEFAULT 'unjudged',
            test_number   INTEGER,
            verdict       TEXT,
            score         REAL,
            used_time     INTEGER,
            used_memory   INTEGER,
            diagnostics   TEXT,
            tester_name   TEXT,
            created_time  TEXT     NOT NULL,
            updated_time  TEXT     NOT NULL,
            FOREIGN KEY (contest_id)   REFERENCES contests (id),
            FOREIGN KEY (problem_id)   REFERENCES problems (id),
            FOREIGN KEY (compiler_id)  REFERENCES compilers (id)
        );",
        "CREATE INDEX IF NOT EXISTS submissions_state ON submissions (state, id);",
        r"
        CREATE TABLE IF NOT EXISTS test_results (
            submission_id    INTEGER  NOT NULL,
            test_number      INTEGER  NOT NULL,
            verdict          TEXT     NOT NULL,
            time_ms          INTEGER  NOT NULL,
            memory_kb        INTEGER  NOT NULL,
            checker_comment  TEXT     NOT NULL DEFAULT '',
            PRIMARY KEY (submission_id, test_number),
            FOREIGN KEY (submission_id)  REFERENCES submissions (id)
        );",
        r"
        CREATE TABLE IF NOT EXISTS tester_status (
            id            INTEGER  PRIMARY KEY,
            name          TEXT     NOT NULL,
            started_time  TEXT     NOT NULL,
            updated_time  TEXT     NOT NULL
        );",
    ] {
        sqlx::query(sql).execute(tx.as_mut()).await?;
    }

    tx.commit().await?;

    log::info!("Initialized database at {}", db_path.as_ref().display());

    Ok(db_pool)
}

/// Atomically moves the oldest claimable submission to `claimed`
///
/// Only submissions whose compiler and runner codenames both appear in the
/// given lists are considered. The selection and the transition happen in one
/// conditional statement, so two instances can never claim the same row.
pub async fn claim_next(
    pool: &SqlitePool,
    tester_name: &str,
    compilers: &[&str],
    runners: &[&str],
) -> sqlx::Result<Option<i64>> {
    if compilers.is_empty() || runners.is_empty() {
        return Ok(None);
    }

    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new("UPDATE submissions SET state = 'claimed', tester_name = ");
    query.push_bind(tester_name);
    query.push(", updated_time = ");
    query.push_bind(create_timestamp());
    query.push(
        " WHERE id = (SELECT s.id FROM submissions s \
         JOIN compilers c ON c.id = s.compiler_id \
         WHERE s.state = 'unjudged' AND c.codename IN (",
    );
    let mut names = query.separated(", ");
    for name in compilers {
        names.push_bind(*name);
    }
    query.push(") AND c.runner_codename IN (");
    let mut names = query.separated(", ");
    for name in runners {
        names.push_bind(*name);
    }
    query.push(") ORDER BY s.id LIMIT 1) AND state = 'unjudged' RETURNING id");

    let row = query.build().fetch_optional(pool).await?;
    row.map(|row| row.try_get("id")).transpose()
}

/// Loads a submission with its problem, compiler and contest flag
pub async fn fetch_submission(pool: &SqlitePool, id: i64) -> sqlx::Result<Submission> {
    let row = sqlx::query(
        r"
        SELECT s.source, c.is_school,
               p.id AS problem_id, p.name AS problem_name, p.path, p.time_limit,
               p.memory_limit, p.checker, p.mask_in, p.mask_out,
               l.id AS compiler_id, l.name AS compiler_name, l.codename, l.runner_codename
        FROM submissions s
        JOIN contests c ON c.id = s.contest_id
        JOIN problems p ON p.id = s.problem_id
        JOIN compilers l ON l.id = s.compiler_id
        WHERE s.id = ?
        ",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;

    Ok(Submission {
        id,
        source: row.try_get("source")?,
        is_school: row.try_get("is_school")?,
        problem: Problem {
            id: row.try_get("problem_id")?,
            name: row.try_get("problem_name")?,
            path: row.try_get("path")?,
            time_limit: row.try_get("time_limit")?,
            memory_limit: row.try_get("memory_limit")?,
            checker: row.try_get("checker")?,
            mask_in: row.try_get("mask_in")?,
            mask_out: row.try_get("mask_out")?,
        },
        compiler: CompilerDescriptor {
            id: row.try_get("compiler_id")?,
            name: row.try_get("compiler_name")?,
            codename: row.try_get("codename")?,
            runner_codename: row.try_get("runner_codename")?,
        },
    })
}

/// Persists a non-terminal progress state such as `compiling` or `testing[k]`
pub async fn set_state(pool: &SqlitePool, id: i64, state: &SubmissionState) -> sqlx::Result<()> {
    sqlx::query(
        r"
        UPDATE submissions
        SET state = ?, test_number = ?, verdict = ?, score = ?, updated_time = ?
        WHERE id = ?
        ",
    )
    .bind(state.label())
    .bind(state.test_number().map(i64::from))
    .bind(state.verdict().map(Verdict::code))
    .bind(state.score())
    .bind(create_timestamp())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Writes the terminal state, the summaries and all per-test rows in one transaction
pub async fn save_judgement(pool: &SqlitePool, id: i64, judgement: &Judgement) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;
    let state = &judgement.state;

    sqlx::query(
        r"
        UPDATE submissions
        SET state = ?, test_number = ?, verdict = ?, score = ?,
            used_time = ?, used_memory = ?, diagnostics = ?, updated_time = ?
        WHERE id = ?
        ",
    )
    .bind(state.label())
    .bind(state.test_number().map(i64::from))
    .bind(state.verdict().map(Verdict::code))
    .bind(state.score())
    .bind(judgement.time_ms.map(|ms| ms as i64))
    .bind(judgement.memory_kb.map(|kb| kb as i64))
    .bind(judgement.diagnostics.as_deref())
    .bind(create_timestamp())
    .bind(id)
    .execute(tx.as_mut())
    .await?;

    for row in &judgement.rows {
        sqlx::query(
            r"
            INSERT INTO test_results (submission_id, test_number, verdict, time_ms, memory_kb, checker_comment)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(id)
        .bind(i64::from(row.test_number))
        .bind(row.verdict.code())
        .bind(row.time_ms as i64)
        .bind(row.memory_kb as i64)
        .bind(&row.checker_comment)
        .execute(tx.as_mut())
        .await?;
    }

    tx.commit().await
}

pub async fn mark_system_error(pool: &SqlitePool, id: i64, diagnostics: &str) -> sqlx::Result<()> {
    save_judgement(
        pool,
        id,
        &Judgement {
            diagnostics: Some(diagnostics.to_string()),
            ..Judgement::new(SubmissionState::SystemError)
        },
    )
    .await
}

/// Returns an interrupted submission to the queue
pub async fn reclaim(pool: &SqlitePool, id: i64) -> sqlx::Result<()> {
    sqlx::query(
        r"
        UPDATE submissions
        SET state = 'unjudged', test_number = NULL, verdict = NULL, score = NULL,
            tester_name = NULL, updated_time = ?
        WHERE id = ?
        ",
    )
    .bind(create_timestamp())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Stored state, summaries and diagnostics of a submission
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRecord {
    pub state: SubmissionState,
    pub used_time: Option<i64>,
    pub used_memory: Option<i64>,
    pub diagnostics: Option<String>,
    pub tester_name: Option<String>,
}

pub async fn fetch_record(pool: &SqlitePool, id: i64) -> anyhow::Result<SubmissionRecord> {
    let row = sqlx::query(
        r"
        SELECT state, test_number, verdict, score, used_time, used_memory, diagnostics, tester_name
        FROM submissions WHERE id = ?
        ",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;

    let label: String = row.try_get("state")?;
    let verdict: Option<String> = row.try_get("verdict")?;

    Ok(SubmissionRecord {
        state: SubmissionState::from_columns(
            &label,
            row.try_get("test_number")?,
            verdict.as_deref(),
            row.try_get("score")?,
        )?,
        used_time: row.try_get("used_time")?,
        used_memory: row.try_get("used_memory")?,
        diagnostics: row.try_get("diagnostics")?,
        tester_name: row.try_get("tester_name")?,
    })
}

pub async fn fetch_test_results(pool: &SqlitePool, id: i64) -> anyhow::Result<Vec<TestResult>> {
    let rows = sqlx::query(
        r"
        SELECT test_number, verdict, time_ms, memory_kb, checker_comment
        FROM test_results WHERE submission_id = ? ORDER BY test_number
        ",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| -> anyhow::Result<TestResult> {
            let code: String = row.try_get("verdict")?;
            Ok(TestResult {
                test_number: row.try_get::<i64, _>("test_number")? as u32,
                verdict: Verdict::from_code(&code)
                    .with_context(|| format!("Unknown verdict code {code}"))?,
                time_ms: row.try_get::<i64, _>("time_ms")? as u64,
                memory_kb: row.try_get::<i64, _>("memory_kb")? as u64,
                checker_comment: row.try_get("checker_comment")?,
            })
        })
        .collect()
}

/// Registers a running instance and returns the id of its status row
pub async fn insert_tester_status(pool: &SqlitePool, name: &str) -> sqlx::Result<i64> {
    let now = create_timestamp();
    let result = sqlx::query(
        "INSERT INTO tester_status (name, started_time, updated_time) VALUES (?, ?, ?)",
    )
    .bind(name)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Refreshes status row `id`, recreating it if it has been removed
pub async fn touch_tester_status(
    pool: &SqlitePool,
    id: i64,
    name: &str,
    started_time: &str,
) -> sqlx::Result<()> {
    sqlx::query(
        r"
        INSERT INTO tester_status (id, name, started_time, updated_time) VALUES (?, ?, ?, ?)
        ON CONFLICT (id) DO UPDATE SET updated_time = excluded.updated_time
        ",
    )
    .bind(id)
    .bind(name)
    .bind(started_time)
    .bind(create_timestamp())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_tester_status(pool: &SqlitePool, id: i64) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM tester_status WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Latest refresh time among the running instances called `name`
pub async fn fetch_tester_status(pool: &SqlitePool, name: &str) -> sqlx::Result<Option<String>> {
    sqlx::query_scalar::<_, String>(
        "SELECT MAX(updated_time) FROM tester_status WHERE name = ? GROUP BY name",
    )
    .bind(name)
    .fetch_optional(pool)
    .await
}

// Intake side: the web application creates these rows. The daemon never does,
// but tests and local setups need them.

pub async fn insert_contest(pool: &SqlitePool, name: &str, is_school: bool) -> sqlx::Result<i64> {
    let result = sqlx::query("INSERT INTO contests (name, is_school) VALUES (?, ?)")
        .bind(name)
        .bind(is_school)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn insert_problem(pool: &SqlitePool, problem: &Problem) -> sqlx::Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO problems (name, path, time_limit, memory_limit, checker, mask_in, mask_out)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(&problem.name)
    .bind(&problem.path)
    .bind(problem.time_limit)
    .bind(problem.memory_limit)
    .bind(&problem.checker)
    .bind(&problem.mask_in)
    .bind(&problem.mask_out)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn insert_compiler(
    pool: &SqlitePool,
    name: &str,
    codename: &str,
    runner_codename: &str,
) -> sqlx::Result<i64> {
    let result =
        sqlx::query("INSERT INTO compilers (name, codename, runner_codename) VALUES (?, ?, ?)")
            .bind(name)
            .bind(codename)
            .bind(runner_codename)
            .execute(pool)
            .await?;
    Ok(result.last_insert_rowid())
}

pub async fn insert_submission(
    pool: &SqlitePool,
    contest_id: i64,
    problem_id: i64,
    compiler_id: i64,
    source: &str,
) -> sqlx::Result<i64> {
    let now = create_timestamp();
    let result = sqlx::query(
        r"
        INSERT INTO submissions (contest_id, problem_id, compiler_id, source, created_time, updated_time)
        VALUES (?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(contest_id)
    .bind(problem_id)
    .bind(compiler_id)
    .bind(source)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}
