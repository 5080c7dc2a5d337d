use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use log::{debug, error, info};
use tokio::{fs, process::Command, time::timeout};

use super::{ExecError, ExecOutput, ExecRequest, Workload, WorkloadError};

/// Workload backed by the local filesystem and process table.
///
/// Container paths are resolved under `root`; a root of `/` runs against the
/// host directly.
#[derive(Debug, Clone)]
pub struct LocalWorkload {
    root: PathBuf,
}

impl LocalWorkload {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a container path under the root, ignoring `..` segments.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let mut resolved = self.root.clone();
        for component in Path::new(path).components() {
            if let Component::Normal(segment) = component {
                resolved.push(segment);
            }
        }
        resolved
    }

    fn io_error(path: &Path, source: std::io::Error) -> WorkloadError {
        if source.kind() == ErrorKind::NotFound {
            WorkloadError::NotFound(path.display().to_string())
        } else {
            WorkloadError::Io {
                path: path.display().to_string(),
                source,
            }
        }
    }
}

#[async_trait]
impl Workload for LocalWorkload {
    async fn can_connect(&self) -> bool {
        fs::metadata(&self.root)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }

    async fn push(&self, path: &str, contents: &[u8]) -> Result<(), WorkloadError> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| Self::io_error(parent, err))?;
        }
        fs::write(&target, contents)
            .await
            .map_err(|err| Self::io_error(&target, err))?;
        debug!("[workload] wrote {} bytes to {}", contents.len(), target.display());
        Ok(())
    }

    async fn pull(&self, path: &str) -> Result<Vec<u8>, WorkloadError> {
        let target = self.resolve(path);
        fs::read(&target)
            .await
            .map_err(|err| Self::io_error(&target, err))
    }

    async fn exec(&self, request: &ExecRequest) -> Result<ExecOutput, ExecError> {
        let (program, args) = request.command.split_first().ok_or_else(|| ExecError::Spawn {
            program: String::new(),
            reason: "empty command".to_string(),
        })?;
        let working_dir = self.resolve(&request.working_dir);
        info!(
            "[workload] running {} in {} (timeout {}s)",
            program,
            working_dir.display(),
            request.timeout.as_secs()
        );

        let child = Command::new(program)
            .args(args)
            .envs(&request.environment)
            .current_dir(&working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| ExecError::Spawn {
                program: program.clone(),
                reason: err.to_string(),
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        match timeout(request.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                if output.status.success() {
                    Ok(ExecOutput { stdout, stderr })
                } else {
                    let exit_code = output.status.code().unwrap_or(-1);
                    error!("[workload] {} exited with code {}", program, exit_code);
                    Err(ExecError::Failed {
                        exit_code,
                        stdout,
                        stderr,
                    })
                }
            }
            Ok(Err(err)) => Err(ExecError::Spawn {
                program: program.clone(),
                reason: err.to_string(),
            }),
            Err(_) => {
                error!(
                    "[workload] {} timed out after {}s",
                    program,
                    request.timeout.as_secs()
                );
                Err(ExecError::TimedOut {
                    timeout_secs: request.timeout.as_secs(),
                    stderr: String::new(),
                })
            }
        }
    }
}
