pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod issuance;
pub mod relation;
pub mod workload;

pub use config::{AccountConfig, IssuerSettings, ValidationError};
pub use coordinator::{Coordinator, CoordinatorState, Disposition, Unit, UnitStatus};
pub use dispatch::{DispatchReport, EventQueue};
pub use issuance::plugins::DnsPlugin;
pub use relation::{
    CertificateCreationRequest, CertificatePublisher, CertificateResponse, InMemoryRelation,
};
pub use workload::{LocalWorkload, Workload};

/// Initializes `env_logger`, honouring `RUST_LOG` and defaulting to `info`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
