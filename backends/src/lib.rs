pub mod local;
pub mod process;
pub mod restic;
pub mod snapshot;
pub mod store;

pub use local::LocalObjectStore;
pub use process::{CommandOutput, CommandRunner, Invocation, ProcessRunner};
pub use restic::ResticEngine;
pub use snapshot::{BackupOptions, RestoreOptions, RetentionPolicy, SetupOptions, SnapshotEngine};
pub use store::{decode_secret, get_secret, ObjectKind, ObjectStore, SecretData};
