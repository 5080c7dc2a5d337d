//! Splitting the ACME client's PEM bundle into an ordered chain.
//!
//! Certificates in the bundle are separated by a blank line (`"\n\n"`). The
//! first certificate is the leaf and the last is the CA.

use chrono::{DateTime, TimeZone, Utc};
use log::{info, warn};
use sha2::{Digest, Sha256};
use thiserror::Error;
use x509_parser::pem::parse_x509_pem;

use crate::workload::{Workload, WorkloadError};

pub const BUNDLE_DELIMITER: &str = "\n\n";

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("certificate bundle missing at {0}")]
    MissingArtifact(String),
    #[error("certificate bundle at {path} is not valid UTF-8")]
    InvalidEncoding { path: String },
    #[error(transparent)]
    Workload(#[from] WorkloadError),
}

/// Certificates from one bundle, in the order the bundle lists them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedChain {
    certificates: Vec<String>,
}

impl IssuedChain {
    /// Splits bundle text on blank lines, dropping whitespace-only segments.
    pub fn split(bundle: &str) -> Option<Self> {
        let certificates: Vec<String> = bundle
            .split(BUNDLE_DELIMITER)
            .filter(|segment| !segment.trim().is_empty())
            .map(str::to_string)
            .collect();
        if certificates.is_empty() {
            None
        } else {
            Some(Self { certificates })
        }
    }

    pub fn leaf(&self) -> &str {
        &self.certificates[0]
    }

    pub fn ca(&self) -> &str {
        &self.certificates[self.certificates.len() - 1]
    }

    pub fn certificates(&self) -> &[String] {
        &self.certificates
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// Relation chain: the bundle order reversed, so the CA comes first.
    pub fn relation_chain(&self) -> Vec<String> {
        self.certificates.iter().rev().cloned().collect()
    }

    pub fn join(&self) -> String {
        self.certificates.join(BUNDLE_DELIMITER)
    }
}

/// Reads and splits the bundle the ACME client wrote for a subject.
pub async fn extract(workload: &dyn Workload, bundle_path: &str) -> Result<IssuedChain, ChainError> {
    let raw = match workload.pull(bundle_path).await {
        Ok(raw) => raw,
        Err(WorkloadError::NotFound(_)) => {
            return Err(ChainError::MissingArtifact(bundle_path.to_string()));
        }
        Err(err) => return Err(err.into()),
    };
    let text = String::from_utf8(raw).map_err(|_| ChainError::InvalidEncoding {
        path: bundle_path.to_string(),
    })?;
    let chain =
        IssuedChain::split(&text).ok_or_else(|| ChainError::MissingArtifact(bundle_path.to_string()))?;

    info!(
        "[chain] read {} certificate(s) from {}",
        chain.len(),
        bundle_path
    );
    match LeafSummary::from_pem(chain.leaf()) {
        Some(summary) => info!(
            "[chain] leaf subject={} not_after={} sha256={}",
            summary.subject,
            summary.not_after.to_rfc3339(),
            summary.fingerprint
        ),
        None => warn!("[chain] leaf certificate in {} could not be parsed", bundle_path),
    }
    Ok(chain)
}

/// Identifying details of an issued leaf certificate, for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafSummary {
    pub subject: String,
    pub not_after: DateTime<Utc>,
    pub fingerprint: String,
}

impl LeafSummary {
    pub fn from_pem(pem: &str) -> Option<Self> {
        let (_, block) = parse_x509_pem(pem.as_bytes()).ok()?;
        let cert = block.parse_x509().ok()?;
        let not_after = Utc
            .timestamp_opt(cert.validity().not_after.timestamp(), 0)
            .single()?;
        let fingerprint = {
            let mut hasher = Sha256::new();
            hasher.update(cert.as_raw());
            hex::encode(hasher.finalize())
        };
        Some(Self {
            subject: cert.subject().to_string(),
            not_after,
            fingerprint,
        })
    }
}
