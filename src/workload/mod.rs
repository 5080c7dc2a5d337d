//! The container the ACME client runs in.
//!
//! The host framework owns the real container; the coordinator only needs to
//! know whether it is reachable, how to move files in and out of it and how to
//! run a command inside it.

use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

mod local;

pub use local::LocalWorkload;

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("workload file not found: {0}")]
    NotFound(String),
    #[error("workload unavailable: {0}")]
    Unavailable(String),
    #[error("workload I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A command to run inside the workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    pub command: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub working_dir: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("process exited with code {exit_code}")]
    Failed {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    #[error("process timed out after {timeout_secs} seconds")]
    TimedOut { timeout_secs: u64, stderr: String },
    #[error("failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },
}

impl ExecError {
    /// Exit code when the process ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecError::Failed { exit_code, .. } => Some(*exit_code),
            ExecError::TimedOut { .. } | ExecError::Spawn { .. } => None,
        }
    }

    pub fn stderr_lines(&self) -> Vec<String> {
        match self {
            ExecError::Failed { stderr, .. } | ExecError::TimedOut { stderr, .. } => {
                stderr.lines().map(str::to_string).collect()
            }
            ExecError::Spawn { reason, .. } => vec![reason.clone()],
        }
    }
}

#[async_trait]
pub trait Workload: Send + Sync {
    /// Whether the container can currently be reached.
    async fn can_connect(&self) -> bool;

    /// Writes `contents` to `path`, creating parent directories.
    async fn push(&self, path: &str, contents: &[u8]) -> Result<(), WorkloadError>;

    async fn pull(&self, path: &str) -> Result<Vec<u8>, WorkloadError>;

    /// Runs a command to completion or until its timeout expires.
    async fn exec(&self, request: &ExecRequest) -> Result<ExecOutput, ExecError>;
}
