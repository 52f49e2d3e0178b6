use thiserror::Error;

/// Failures that abandon the current submission without touching its state.
///
/// The claim loop logs these and moves on; everything else that escapes the
/// pipeline marks the submission as a system error.
#[derive(Error, Debug)]
pub enum RecoverableError {
    #[error("unknown compiler `{0}`")]
    UnknownCompiler(String),

    #[error("unknown runner `{0}`")]
    UnknownRunner(String),

    #[error("checker is empty")]
    EmptyChecker,

    #[error("checker `{0}` is not found")]
    CheckerNotFound(String),

    #[error("sandbox protocol error: {0}")]
    Protocol(String),

    #[error("invalid test mask `{mask}`: {reason}")]
    InvalidMask { mask: String, reason: &'static str },

    #[error("no tests found at `{0}`")]
    NoTests(String),
}

/// Start-up configuration problems. These stop the daemon before it claims anything.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {kind} directory: `{path}`")]
    InvalidDirectory { kind: &'static str, path: String },

    #[error("`{0}` is not a directory")]
    NotADirectory(String),

    #[error("aborted")]
    Aborted,
}
