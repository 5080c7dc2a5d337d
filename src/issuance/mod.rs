//! The steps of one issuance: CSR parsing, running the ACME client and
//! reading back the chain it produced.

use thiserror::Error;

pub mod chain;
pub mod csr;
pub mod invoker;
pub mod plugins;

use crate::workload::{ExecError, WorkloadError};

/// Failure of an issuance after the request was accepted.
#[derive(Debug, Error)]
pub enum IssuanceError {
    #[error("workload error: {0}")]
    Workload(#[from] WorkloadError),
    #[error("ACME client failed: {0}")]
    Execution(#[from] ExecError),
    #[error(transparent)]
    Artifact(#[from] chain::ChainError),
}
