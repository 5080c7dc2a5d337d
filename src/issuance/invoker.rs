use std::{collections::BTreeMap, time::Duration};

use log::{debug, error, info};

use crate::{
    config::{AccountConfig, IssuerSettings},
    workload::{ExecError, ExecOutput, ExecRequest, Workload},
};

use super::{csr::Subject, plugins::DnsPlugin};

/// A single run of the external ACME client for one CSR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceCommand {
    binary: String,
    csr_path: String,
    working_dir: String,
    timeout: Duration,
    email: String,
    server: String,
    plugin: DnsPlugin,
    environment: BTreeMap<String, String>,
}

impl IssuanceCommand {
    pub fn new(settings: &IssuerSettings, config: &AccountConfig) -> Self {
        Self {
            binary: settings.binary.clone(),
            csr_path: settings.csr_path.clone(),
            working_dir: settings.working_dir.clone(),
            timeout: settings.timeout(),
            email: config.email.clone(),
            server: config.server.clone(),
            plugin: config.plugin.clone(),
            environment: config.plugin_secrets.clone(),
        }
    }

    /// `lego --email <email> --accept-tos --csr <csr> --server <url> --dns <plugin> run`
    pub fn args(&self) -> Vec<String> {
        vec![
            self.binary.clone(),
            "--email".to_string(),
            self.email.clone(),
            "--accept-tos".to_string(),
            "--csr".to_string(),
            self.csr_path.clone(),
            "--server".to_string(),
            self.server.clone(),
            "--dns".to_string(),
            self.plugin.code().to_string(),
            "run".to_string(),
        ]
    }

    pub fn to_exec_request(&self) -> ExecRequest {
        ExecRequest {
            command: self.args(),
            environment: self.environment.clone(),
            working_dir: self.working_dir.clone(),
            timeout: self.timeout,
        }
    }

    /// Runs the client and waits for it; failures are returned as-is and
    /// never retried.
    pub async fn invoke(
        &self,
        workload: &dyn Workload,
        subject: &Subject,
    ) -> Result<ExecOutput, ExecError> {
        info!(
            "[invoker] requesting certificate for {} from {} via {} plugin",
            subject, self.server, self.plugin
        );
        self.plugin.missing_env(&self.environment);
        match workload.exec(&self.to_exec_request()).await {
            Ok(output) => {
                info!("[invoker] {} finished for {}", self.binary, subject);
                for line in output.stdout.lines() {
                    debug!("[invoker] stdout: {}", line);
                }
                for line in output.stderr.lines() {
                    debug!("[invoker] stderr: {}", line);
                }
                Ok(output)
            }
            Err(err) => {
                match err.exit_code() {
                    Some(code) => error!("[invoker] Exited with code {}. Stderr:", code),
                    None => error!("[invoker] {} for {}. Stderr:", err, subject),
                }
                for line in err.stderr_lines() {
                    error!("[invoker]     {}", line);
                }
                Err(err)
            }
        }
    }
}
