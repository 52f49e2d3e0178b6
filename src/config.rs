use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Parser)]
#[command(name = "judged", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c', default_value = "judged.json")]
    pub config_path: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a contest tester that processes unjudged submissions from the database
    Run {
        /// Tester working directory
        workdir: PathBuf,

        /// Do not prompt if the working directory is not empty
        #[arg(long = "force", short = 'f', default_value_t = false)]
        force: bool,
    },
}

impl CliArgs {
    /// Load the configuration from the specified file
    pub fn to_config(&self) -> anyhow::Result<Config> {
        Config::load(&self.config_path)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// SQLite database file; defaults to the user data directory
    pub database: Option<PathBuf>,
    #[serde(default = "default_tester_name")]
    pub tester_name: String,
    pub problems_directory: PathBuf,
    pub checkers_directory: PathBuf,
    /// Path to an `ejudge-execute` compatible sandbox; unset selects the dev runner
    pub ejudge_execute: Option<PathBuf>,
    /// User to run solutions as, via `sudo -u`
    pub invoker: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_compile_timeout_secs")]
    pub compile_timeout_secs: u64,
    #[serde(default = "default_checker_timeout_secs")]
    pub checker_timeout_secs: u64,
    #[serde(default)]
    pub on_shutdown: ShutdownPolicy,
}

/// What happens to a submission that is in flight when the daemon is asked to stop
#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Put it back to `unjudged` so another instance picks it up
    #[default]
    Reclaim,
    /// Mark it as a system error
    Fail,
}

/// `judged@<host>:<pid>`, unique per running instance
fn default_tester_name() -> String {
    format!("judged@{}:{}", hostname(), std::process::id())
}

fn hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: the buffer is writable for its full length
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return "localhost".to_string();
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_compile_timeout_secs() -> u64 {
    30
}

fn default_checker_timeout_secs() -> u64 {
    30
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path.as_ref())
            .with_context(|| format!("Failed to open config {}", path.as_ref().display()))?;
        let reader = std::io::BufReader::new(file);
        let mut config: Config = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse config {}", path.as_ref().display()))?;
        config.normalize();
        Ok(config)
    }

    /// Expands `~` in paths and drops empty optional settings
    fn normalize(&mut self) {
        self.problems_directory = expand_home(&self.problems_directory);
        self.checkers_directory = expand_home(&self.checkers_directory);
        self.database = self.database.as_deref().map(expand_home);
        self.ejudge_execute = self
            .ejudge_execute
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .map(expand_home);
        self.invoker = self.invoker.take().filter(|u| !u.trim().is_empty());
    }

    /// Checks that the directories the judge reads from exist
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (kind, path) in [
            ("problems", &self.problems_directory),
            ("checkers", &self.checkers_directory),
        ] {
            if !path.is_dir() {
                return Err(ConfigError::InvalidDirectory {
                    kind,
                    path: path.display().to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }

    pub fn checker_timeout(&self) -> Duration {
        Duration::from_secs(self.checker_timeout_secs)
    }
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match directories::BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let config = Config::load("data/example.json").unwrap();
        assert_eq!(config.tester_name, "judged-1");
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.compile_timeout_secs, 30);
        assert_eq!(config.on_shutdown, ShutdownPolicy::Reclaim);
        assert_eq!(
            config.ejudge_execute,
            Some(PathBuf::from("/usr/local/bin/ejudge-execute"))
        );
        assert_eq!(config.invoker, None);
    }

    #[test]
    fn test_shutdown_policy_parsing() {
        let raw = r#"{
            "problems_directory": "/srv/problems",
            "checkers_directory": "/srv/checkers",
            "ejudge_execute": "",
            "on_shutdown": "fail"
        }"#;
        let mut config: Config = serde_json::from_str(raw).unwrap();
        config.normalize();
        assert_eq!(config.on_shutdown, ShutdownPolicy::Fail);
        assert_eq!(config.ejudge_execute, None);
        assert!(config.tester_name.starts_with("judged@"));
        assert!(
            config
                .tester_name
                .ends_with(&format!(":{}", std::process::id()))
        );
    }

    #[test]
    fn test_validate_rejects_missing_directory() {
        let raw = r#"{
            "problems_directory": "/nonexistent/problems",
            "checkers_directory": "/nonexistent/checkers"
        }"#;
        let config: Config = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDirectory { kind: "problems", .. })
        ));
    }
}
