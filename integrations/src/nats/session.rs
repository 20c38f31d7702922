//! One backup or restore run against a NATS server, from credential
//! resolution to handing the staging directory to the snapshot engine.

use super::binding::ConnectionDescriptor;
use super::credentials::{CredentialLayout, CredentialMaterializer};
use super::readiness::{wait_for_ready, ReadinessPolicy};
use super::reconcile::OverwriteReconciler;
use super::tool::NatsCli;
use super::transfer::UnitTransferDriver;
use super::units::UnitEnumerator;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use streamsnap_backends::{
    BackupOptions, CommandRunner, ObjectStore, RestoreOptions, RetentionPolicy, SnapshotEngine,
};
use streamsnap_core::{
    Error, Operation, Result, SessionReport, StagingDir, TargetRef, DEFAULT_HOST,
};
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Namespace of the AppBinding and its secrets.
    pub namespace: String,
    pub binding: String,
    pub staging_dir: PathBuf,
    pub scratch_dir: PathBuf,
    /// Fixed stream list for backup, override list for restore.
    pub units: Vec<String>,
    /// Extra `nats` arguments for every export and import.
    pub tool_args: String,
    pub host: String,
    pub readiness: ReadinessPolicy,
    pub warning_threshold: String,
    pub layout: CredentialLayout,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            binding: String::new(),
            staging_dir: PathBuf::new(),
            scratch_dir: PathBuf::from("/tmp"),
            units: Vec::new(),
            tool_args: String::new(),
            host: DEFAULT_HOST.to_string(),
            readiness: ReadinessPolicy::default(),
            warning_threshold: "30s".to_string(),
            layout: CredentialLayout::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RestoreRequest {
    pub source_host: Option<String>,
    /// Snapshot ids; empty restores the latest one.
    pub snapshots: Vec<String>,
    /// Delete streams that already exist before importing them.
    pub overwrite: bool,
}

pub struct Session {
    store: Arc<dyn ObjectStore>,
    runner: Arc<dyn CommandRunner>,
    engine: Arc<dyn SnapshotEngine>,
    options: SessionOptions,
}

impl Session {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        runner: Arc<dyn CommandRunner>,
        engine: Arc<dyn SnapshotEngine>,
        options: SessionOptions,
    ) -> Self {
        Self {
            store,
            runner,
            engine,
            options,
        }
    }

    pub fn target(&self) -> TargetRef {
        TargetRef::app_binding(&self.options.binding, Some(self.options.namespace.clone()))
    }

    /// Always yields a report; a failed run is reported against the
    /// configured host with the first error's message.
    pub async fn backup(&self, retention: &RetentionPolicy) -> SessionReport {
        let started = Instant::now();
        let outcome = self.run_backup(retention).await;
        self.finish(Operation::Backup, started, outcome)
    }

    pub async fn restore(&self, request: &RestoreRequest) -> SessionReport {
        let started = Instant::now();
        let outcome = self.run_restore(request).await;
        self.finish(Operation::Restore, started, outcome)
    }

    fn finish(&self, operation: Operation, started: Instant, outcome: Result<SessionReport>) -> SessionReport {
        match &outcome {
            Ok(_) => info!(
                %operation,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Session succeeded"
            ),
            Err(e) => error!(%operation, timeout = e.is_timeout(), "Session failed: {}", e),
        }
        SessionReport::from_outcome(operation, self.target(), &self.options.host, outcome)
    }

    async fn run_backup(&self, retention: &RetentionPolicy) -> Result<SessionReport> {
        let staging = self.prepare_staging().await?;
        let tool = self.connect().await?;
        wait_for_ready(&tool, &self.options.readiness, &self.options.warning_threshold).await?;

        let manifest = UnitEnumerator::for_backup(&tool, &staging, &self.options.units).await?;
        UnitTransferDriver::new(&tool, &staging)
            .export_all(manifest.units())
            .await?;

        let usage = staging.usage();
        info!(files = usage.files, bytes = usage.bytes, "Streams exported to staging directory");

        let options = BackupOptions {
            host: self.options.host.clone(),
            paths: vec![staging.root().to_path_buf()],
            retention: retention.clone(),
        };
        self.engine
            .run_backup(&options, &self.target())
            .await
            .map_err(|e| Error::Delegation(e.to_string()))
    }

    async fn run_restore(&self, request: &RestoreRequest) -> Result<SessionReport> {
        let staging = self.prepare_staging().await?;
        let tool = self.connect().await?;
        wait_for_ready(&tool, &self.options.readiness, &self.options.warning_threshold).await?;

        let options = RestoreOptions {
            host: self.options.host.clone(),
            source_host: request.source_host.clone(),
            paths: vec![staging.root().to_path_buf()],
            snapshots: request.snapshots.clone(),
        };
        let report = self
            .engine
            .run_restore(&options, &self.target())
            .await
            .map_err(|e| Error::Delegation(e.to_string()))?;

        let usage = staging.usage();
        info!(files = usage.files, bytes = usage.bytes, "Snapshot restored to staging directory");

        let manifest = UnitEnumerator::for_restore(&staging, &self.options.units).await?;
        if request.overwrite {
            OverwriteReconciler::new(&tool).reconcile(manifest.units()).await?;
        }
        UnitTransferDriver::new(&tool, &staging)
            .import_all(manifest.units())
            .await?;

        Ok(report)
    }

    async fn prepare_staging(&self) -> Result<StagingDir> {
        let staging = StagingDir::absolute(&self.options.staging_dir)?;
        info!("Cleaning up staging directory {}", staging.root().display());
        staging.clear().await?;
        Ok(staging)
    }

    async fn connect(&self) -> Result<NatsCli> {
        let store = self.store.as_ref();
        let descriptor = ConnectionDescriptor::load(store, &self.options.namespace, &self.options.binding).await?;

        let materializer = CredentialMaterializer::new(self.options.layout.clone(), &self.options.scratch_dir);
        let mut env = BTreeMap::new();
        materializer
            .materialize(store, &self.options.namespace, &descriptor, &mut env)
            .await?;
        info!(variables = ?env.keys().collect::<Vec<_>>(), "Bound connection environment");

        Ok(NatsCli::new(self.runner.clone(), env, &self.options.tool_args))
    }
}
