use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::error::ConfigError;

const PROMPT: &str = "Working directory is not empty. All files inside it will be deleted.\n\
                      Are you sure you want to proceed? (y/N) ";

/// The scratch directory every submission is compiled and run in
#[derive(Debug, Clone)]
pub struct Workdir {
    path: PathBuf,
}

impl Workdir {
    /// Creates the directory if missing, asking on the terminal before
    /// reusing a non-empty one unless `force` is set
    pub fn prepare(path: &Path, force: bool) -> Result<Self> {
        Self::prepare_with(path, force, || {
            print!("{PROMPT}");
            io::stdout().flush()?;
            let mut answer = String::new();
            io::stdin().lock().read_line(&mut answer)?;
            Ok(is_affirmative(&answer))
        })
    }

    pub fn prepare_with(
        path: &Path,
        force: bool,
        confirm: impl FnOnce() -> io::Result<bool>,
    ) -> Result<Self> {
        if path.exists() {
            if !path.is_dir() {
                return Err(ConfigError::NotADirectory(path.display().to_string()).into());
            }
            let is_empty = std::fs::read_dir(path)?.next().is_none();
            if !force && !is_empty && !confirm()? {
                return Err(ConfigError::Aborted.into());
            }
        } else {
            std::fs::create_dir_all(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
        }

        Ok(Self {
            path: path.canonicalize()?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes everything left by the previous submission
    pub async fn acquire(&self) -> Result<&Path> {
        let mut entries = tokio::fs::read_dir(&self.path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let removed = if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            removed.with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        Ok(&self.path)
    }
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes" | "yessir" | "yeah"
    )
}
