mod fpc;
mod gcc;
mod gfortran;
mod java;
mod mono;

pub use fpc::{FPC, FPCCompat};
pub use gcc::GCC;
pub use gfortran::GNUFortran;
pub use java::{Java, JavaProfile};
pub use mono::{MonoCSharp, MonoProfile};

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::RecoverableError;
use crate::truncate_utf8;

/// Compiler output kept in the scratch directory
const LOG_FILE: &str = "compiler.log";
/// Longest diagnostics text stored on a submission
pub const MAX_DIAGNOSTICS_LEN: usize = 64 * 1024;

/// Which output stream of the compiler carries its error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStream {
    Stdout,
    Stderr,
}

/// Language-specific compile stage
///
/// One implementation per supported language. The command runs inside the
/// scratch directory, where the source has been saved as `source_name`, and must
/// produce `binary_name` there.
pub trait Compiler: Send + Sync {
    /// Identifier used to reference the compiler from the database
    fn code_name(&self) -> &str;
    fn source_name(&self) -> &str;
    fn binary_name(&self) -> &str;
    fn command(&self) -> Vec<String>;

    /// File whose presence proves the compiler produced something runnable
    fn artifact_name(&self) -> &str {
        self.binary_name()
    }

    fn error_stream(&self) -> ErrorStream {
        ErrorStream::Stderr
    }

    /// Whether binaries from this compiler run with security violation checks
    fn strict_sv(&self) -> bool {
        false
    }
}

/// How a compiled binary is launched
pub trait RunProfile: Send + Sync {
    /// Identifier used to reference the runner from the database
    fn code_name(&self) -> &str;
    fn command(&self, binary_name: &str, memory_limit_mb: u32) -> Vec<String>;

    /// Whether the sandbox should cap the address space itself
    fn sandbox_memory_limit(&self) -> bool {
        true
    }
}

/// Runs the binary directly
pub struct NativeProfile;

impl RunProfile for NativeProfile {
    fn code_name(&self) -> &str {
        "native"
    }

    fn command(&self, binary_name: &str, _memory_limit_mb: u32) -> Vec<String> {
        vec![format!("./{binary_name}")]
    }
}

/// Compile adapters and run profiles known to this daemon instance
pub struct CompilerRegistry {
    compilers: HashMap<String, Box<dyn Compiler>>,
    runners: HashMap<String, Box<dyn RunProfile>>,
}

impl CompilerRegistry {
    pub fn new() -> Self {
        Self {
            compilers: HashMap::new(),
            runners: HashMap::new(),
        }
    }

    /// Registry with every built-in language
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_compiler(Box::new(GCC));
        registry.register_compiler(Box::new(FPC));
        registry.register_compiler(Box::new(FPCCompat));
        registry.register_compiler(Box::new(GNUFortran));
        registry.register_compiler(Box::new(Java));
        registry.register_compiler(Box::new(MonoCSharp));
        registry.register_runner(Box::new(NativeProfile));
        registry.register_runner(Box::new(JavaProfile));
        registry.register_runner(Box::new(MonoProfile));
        registry
    }

    pub fn register_compiler(&mut self, compiler: Box<dyn Compiler>) {
        self.compilers
            .insert(compiler.code_name().to_string(), compiler);
    }

    pub fn register_runner(&mut self, runner: Box<dyn RunProfile>) {
        self.runners.insert(runner.code_name().to_string(), runner);
    }

    pub fn compiler(&self, code_name: &str) -> Result<&dyn Compiler, RecoverableError> {
        self.compilers
            .get(code_name)
            .map(|c| c.as_ref())
            .ok_or_else(|| RecoverableError::UnknownCompiler(code_name.to_string()))
    }

    pub fn runner(&self, code_name: &str) -> Result<&dyn RunProfile, RecoverableError> {
        self.runners
            .get(code_name)
            .map(|r| r.as_ref())
            .ok_or_else(|| RecoverableError::UnknownRunner(code_name.to_string()))
    }

    pub fn compiler_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.compilers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn runner_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.runners.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for CompilerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Result of compilation process
#[derive(Debug, PartialEq, Eq)]
pub enum CompileOutcome {
    /// `binary` is the launchable file name inside the scratch directory
    Compiled { binary: String },
    Failed { diagnostics: String },
}

/// Saves `source` into `workdir` and runs the compiler there
///
/// A non-zero exit status, a timeout or a missing binary are compilation
/// failures; only problems launching the compiler are errors.
pub async fn compile(
    compiler: &dyn Compiler,
    source: &str,
    workdir: &Path,
    limit: Duration,
) -> Result<CompileOutcome> {
    tokio::fs::write(workdir.join(compiler.source_name()), source).await?;

    let argv = compiler.command();
    if argv.is_empty() {
        bail!("Empty compile command for {}", compiler.code_name());
    }
    log::debug!("Compiling with {argv:?}");

    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..])
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    let output = match timeout(limit, cmd.output()).await {
        Ok(output) => output.with_context(|| format!("Failed to spawn {}", argv[0]))?,
        Err(_) => {
            return Ok(CompileOutcome::Failed {
                diagnostics: format!("Compilation timed out after {limit:?}"),
            });
        }
    };

    let messages = match compiler.error_stream() {
        ErrorStream::Stdout => &output.stdout,
        ErrorStream::Stderr => &output.stderr,
    };
    if !messages.is_empty() {
        tokio::fs::write(workdir.join(LOG_FILE), messages).await?;
    }
    let diagnostics = truncate_utf8(
        String::from_utf8_lossy(messages).into_owned(),
        MAX_DIAGNOSTICS_LEN,
    );

    if !output.status.success() {
        return Ok(CompileOutcome::Failed { diagnostics });
    }

    if !workdir.join(compiler.artifact_name()).exists() {
        return Ok(CompileOutcome::Failed {
            diagnostics: format!(
                "{diagnostics}Compiler did not produce {}",
                compiler.artifact_name()
            ),
        });
    }

    Ok(CompileOutcome::Compiled {
        binary: compiler.binary_name().to_string(),
    })
}
