//! Backup and restore of NATS JetStream streams through the `nats` CLI.

pub mod binding;
pub mod credentials;
pub mod readiness;
pub mod reconcile;
pub mod session;
pub mod tool;
pub mod transfer;
pub mod units;

#[cfg(test)]
mod test_support;

pub use binding::{ConnectionDescriptor, SecretTransform};
pub use credentials::{CredentialLayout, CredentialMaterializer, CredentialScheme, EnvSink, SecretBundle};
pub use readiness::{wait_for_ready, ReadinessPolicy, DEFAULT_POLL_INTERVAL, DEFAULT_READY_TIMEOUT};
pub use reconcile::OverwriteReconciler;
pub use session::{RestoreRequest, Session, SessionOptions};
pub use tool::{NatsCli, StreamTool, NATS_CMD};
pub use transfer::UnitTransferDriver;
pub use units::UnitEnumerator;
