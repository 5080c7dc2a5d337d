//! Turns certificate creation requests into certificates.
//!
//! One request is handled at a time: check leadership and container
//! readiness, write the CSR into the workload, run the ACME client, split the
//! bundle it leaves behind and publish the result on the relation.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info, warn};

use crate::{
    config::{AccountConfig, IssuerSettings, ValidationError},
    issuance::{
        IssuanceError,
        chain::{self, IssuedChain},
        csr::{self, Subject},
        invoker::IssuanceCommand,
    },
    relation::{CertificateCreationRequest, CertificatePublisher, CertificateResponse},
    workload::Workload,
};

pub const WAITING_FOR_CONTAINER: &str = "Waiting for container to be ready";
pub const EXECUTION_FAILED: &str = "Error getting certificate. Check logs for details";
pub const ARTIFACT_MISSING: &str = "Issued certificate not found. Check logs for details";
pub const EMAIL_NOT_PROVIDED: &str = "Email address was not provided.";

/// Operator-visible status of this unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    Active,
    Waiting(String),
    Blocked(String),
}

/// Capabilities the host framework provides for this unit.
pub trait Unit: Send + Sync {
    fn is_leader(&self) -> bool;
    fn set_status(&self, status: UnitStatus);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    AwaitingContainer,
    Issuing,
    Publishing,
    Blocked,
    Deferred,
}

/// What happened to one delivered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Not the leader; nothing was done.
    Ignored,
    /// The container was unreachable; the event must be delivered again.
    Deferred,
    /// The CSR could not be parsed; the event is discarded.
    Dropped,
    /// Issuance failed in a way only an operator can fix.
    Blocked,
    Published,
}

pub struct Coordinator {
    settings: IssuerSettings,
    config: Option<AccountConfig>,
    workload: Arc<dyn Workload>,
    unit: Arc<dyn Unit>,
    publisher: Arc<dyn CertificatePublisher>,
    state: CoordinatorState,
}

impl Coordinator {
    pub fn new(
        settings: IssuerSettings,
        workload: Arc<dyn Workload>,
        unit: Arc<dyn Unit>,
        publisher: Arc<dyn CertificatePublisher>,
    ) -> Self {
        Self {
            settings,
            config: None,
            workload,
            unit,
            publisher,
            state: CoordinatorState::Idle,
        }
    }

    pub fn with_config(mut self, config: AccountConfig) -> Result<Self, ValidationError> {
        self.update_config(config)?;
        Ok(self)
    }

    /// Where the most recently delivered event ended up.
    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn config(&self) -> Option<&AccountConfig> {
        self.config.as_ref()
    }

    pub fn settings(&self) -> &IssuerSettings {
        &self.settings
    }

    /// Replaces the account config if the candidate validates.
    pub fn update_config(&mut self, candidate: AccountConfig) -> Result<(), ValidationError> {
        if let Err(err) = candidate.validate() {
            warn!("[coordinator] rejected config update: {}", err);
            return Err(err);
        }
        info!(
            "[coordinator] account config updated (email={}, server={}, plugin={})",
            candidate.email, candidate.server, candidate.plugin
        );
        self.config = Some(candidate);
        Ok(())
    }

    /// Updates only email and server, keeping the plugin and its secrets.
    ///
    /// With no config yet, there is no plugin to keep and the update is
    /// rejected.
    pub fn update_account(&mut self, email: &str, server: &str) -> Result<(), ValidationError> {
        crate::config::validate(email, server)?;
        let Some(current) = self.config.as_ref() else {
            return Err(ValidationError {
                field: crate::config::ConfigField::Plugin,
                reason: "no DNS plugin configured".to_string(),
            });
        };
        let candidate = AccountConfig {
            email: email.trim().to_string(),
            server: server.trim().to_string(),
            ..current.clone()
        };
        self.update_config(candidate)
    }

    /// The workload container came up.
    pub fn on_workload_ready(&mut self) {
        if self.config.is_some() {
            self.unit.set_status(UnitStatus::Active);
        } else {
            self.unit
                .set_status(UnitStatus::Blocked(EMAIL_NOT_PROVIDED.to_string()));
        }
    }

    pub async fn handle_certificate_request(
        &mut self,
        event: &CertificateCreationRequest,
    ) -> Result<Disposition> {
        if !self.unit.is_leader() {
            self.state = CoordinatorState::Idle;
            return Ok(Disposition::Ignored);
        }

        self.state = CoordinatorState::AwaitingContainer;
        if !self.workload.can_connect().await {
            info!(
                "[coordinator] container not ready, deferring request for relation {}",
                event.relation_id
            );
            self.unit
                .set_status(UnitStatus::Waiting(WAITING_FOR_CONTAINER.to_string()));
            self.state = CoordinatorState::Deferred;
            return Ok(Disposition::Deferred);
        }

        let (subject, bundle_path) = match csr::parse(event.certificate_signing_request.as_bytes())
            .and_then(|subject| {
                let artifact = subject.artifact_file_name()?;
                Ok((subject, self.settings.bundle_path(&artifact)))
            }) {
            Ok(parsed) => parsed,
            Err(err) => {
                error!("[coordinator] Bad CSR received, aborting: {}", err);
                self.state = CoordinatorState::Idle;
                return Ok(Disposition::Dropped);
            }
        };
        info!(
            "[coordinator] Received Certificate Creation Request for domain {}",
            subject
        );

        let Some(config) = self.config.clone() else {
            error!("[coordinator] no account config, cannot request a certificate");
            self.unit
                .set_status(UnitStatus::Blocked(EMAIL_NOT_PROVIDED.to_string()));
            self.state = CoordinatorState::Blocked;
            return Ok(Disposition::Blocked);
        };

        self.state = CoordinatorState::Issuing;
        let chain = match self.issue(&subject, &bundle_path, &config, event).await {
            Ok(chain) => chain,
            Err(err) => {
                let message = match &err {
                    IssuanceError::Artifact(_) => ARTIFACT_MISSING,
                    _ => EXECUTION_FAILED,
                };
                error!("[coordinator] issuance for {} failed: {}", subject, err);
                self.unit.set_status(UnitStatus::Blocked(message.to_string()));
                self.state = CoordinatorState::Blocked;
                return Ok(Disposition::Blocked);
            }
        };

        self.state = CoordinatorState::Publishing;
        let response = CertificateResponse {
            certificate: chain.leaf().to_string(),
            certificate_signing_request: event.certificate_signing_request.clone(),
            ca: chain.ca().to_string(),
            chain: chain.relation_chain(),
            relation_id: event.relation_id,
        };
        let published = self
            .publisher
            .set_relation_certificate(&response)
            .with_context(|| {
                format!(
                    "failed to publish certificate for {} on relation {}",
                    subject, event.relation_id
                )
            });
        self.state = CoordinatorState::Idle;
        published?;

        info!(
            "[coordinator] published certificate for {} on relation {}",
            subject, event.relation_id
        );
        self.unit.set_status(UnitStatus::Active);
        Ok(Disposition::Published)
    }

    async fn issue(
        &self,
        subject: &Subject,
        bundle_path: &str,
        config: &AccountConfig,
        event: &CertificateCreationRequest,
    ) -> Result<IssuedChain, IssuanceError> {
        self.workload
            .push(
                &self.settings.csr_path,
                event.certificate_signing_request.as_bytes(),
            )
            .await?;

        let command = IssuanceCommand::new(&self.settings, config);
        command.invoke(self.workload.as_ref(), subject).await?;

        Ok(chain::extract(self.workload.as_ref(), bundle_path).await?)
    }
}
