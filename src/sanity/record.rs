use crate::error::{RegtestError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Job output file names inside a stage directory
pub const STDOUT_FILE: &str = "rfm_job.out";
pub const STDERR_FILE: &str = "rfm_job.err";

/// Where a rule reads its text from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Stdout,
    Stderr,
    /// A named file produced by the run, relative to the stage directory
    File(String),
}

impl Source {
    pub fn file(name: impl Into<String>) -> Self {
        Source::File(name.into())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Stdout => f.write_str("stdout"),
            Source::Stderr => f.write_str("stderr"),
            Source::File(name) => f.write_str(name),
        }
    }
}

/// Captured output of one completed run of one check.
///
/// A record is only ever built from finished output; it has no way to be
/// appended to after construction.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionRecord {
    stdout: String,
    stderr: String,
    exit_status: Option<i32>,
    files: BTreeMap<String, String>,
}

impl ExecutionRecord {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        ExecutionRecord {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_status: None,
            files: BTreeMap::new(),
        }
    }

    pub fn with_exit_status(mut self, status: i32) -> Self {
        self.exit_status = Some(status);
        self
    }

    pub fn with_file(mut self, name: impl Into<String>, contents: impl Into<String>) -> Self {
        self.files.insert(name.into(), contents.into());
        self
    }

    /// Load a record from a stage directory.
    ///
    /// Job stdout/stderr must exist. Every other regular file in the
    /// directory (and the listed `extra` paths, which may sit in
    /// subdirectories such as `benchMEM-20200626/md.log`) is attached by its
    /// relative name.
    pub fn from_stagedir(dir: &Path, extra: &[&str]) -> Result<Self> {
        let stdout = read_text(&dir.join(STDOUT_FILE))?;
        let stderr = read_text(&dir.join(STDERR_FILE))?;
        let mut record = ExecutionRecord::new(stdout, stderr);

        let entries = fs::read_dir(dir).map_err(|e| RegtestError::io(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| RegtestError::io(dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name == STDOUT_FILE || name == STDERR_FILE {
                continue;
            }
            record.files.insert(name, read_text(&path)?);
        }

        for name in extra {
            let path = dir.join(name);
            if path.is_file() {
                record.files.insert(name.to_string(), read_text(&path)?);
            } else {
                debug!("log file {} not present in {}", name, dir.display());
            }
        }

        Ok(record)
    }

    /// Text of a source, `None` when a named file was not produced
    pub fn text(&self, source: &Source) -> Option<&str> {
        match source {
            Source::Stdout => Some(&self.stdout),
            Source::Stderr => Some(&self.stderr),
            Source::File(name) => self.files.get(name).map(String::as_str),
        }
    }

    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }

    /// Files whose names start with `prefix` and end with `suffix`, by name
    pub fn files_matching<'a>(
        &'a self,
        prefix: &'a str,
        suffix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.files
            .iter()
            .filter(move |(name, _)| name.starts_with(prefix) && name.ends_with(suffix))
            .map(|(name, contents)| (name.as_str(), contents.as_str()))
    }
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| RegtestError::io(path, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
