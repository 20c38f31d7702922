pub mod backup;
pub mod restore;

use anyhow::{bail, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use streamsnap_backends::{LocalObjectStore, ProcessRunner, ResticEngine, SetupOptions};
use streamsnap_core::{SessionReport, DEFAULT_HOST, DEFAULT_OUTPUT_FILE_NAME};
use streamsnap_integrations::nats::{ReadinessPolicy, Session, SessionOptions};
use tracing::info;

/// Flags shared by backup and restore.
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Namespace of the target and, unless overridden, of its secrets
    #[arg(long, env = "STREAMSNAP_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Name of the AppBinding describing the NATS server
    #[arg(long, env = "STREAMSNAP_APPBINDING")]
    pub appbinding: String,

    /// Namespace of the AppBinding, if it differs from --namespace
    #[arg(long, env = "STREAMSNAP_APPBINDING_NAMESPACE")]
    pub appbinding_namespace: Option<String>,

    /// Directory holding <namespace>/<kind>/<name>.json objects
    #[arg(long, env = "STREAMSNAP_OBJECT_STORE_DIR")]
    pub object_store_dir: PathBuf,

    /// Secret with the repository credentials and password
    #[arg(long, env = "STREAMSNAP_STORAGE_SECRET_NAME")]
    pub storage_secret_name: Option<String>,

    #[arg(long, env = "STREAMSNAP_STORAGE_SECRET_NAMESPACE")]
    pub storage_secret_namespace: Option<String>,

    /// Repository backend: local, s3, gcs, azure, b2, swift or rest
    #[arg(long, env = "STREAMSNAP_PROVIDER", default_value = "local")]
    pub provider: String,

    #[arg(long, env = "STREAMSNAP_BUCKET", default_value = "")]
    pub bucket: String,

    #[arg(long, env = "STREAMSNAP_ENDPOINT", default_value = "")]
    pub endpoint: String,

    #[arg(long, env = "STREAMSNAP_REGION", default_value = "")]
    pub region: String,

    /// Path inside the bucket, or the repository directory for local
    #[arg(long, env = "STREAMSNAP_PATH", default_value = "")]
    pub path: String,

    /// Where credential files and the restic cache are written
    #[arg(long, env = "STREAMSNAP_SCRATCH_DIR", default_value = "/tmp")]
    pub scratch_dir: PathBuf,

    #[arg(long, env = "STREAMSNAP_ENABLE_CACHE")]
    pub enable_cache: bool,

    #[arg(long, env = "STREAMSNAP_MAX_CONNECTIONS")]
    pub max_connections: Option<u32>,

    /// Host identity recorded with snapshots and in the report
    #[arg(long, env = "STREAMSNAP_HOSTNAME", default_value = DEFAULT_HOST)]
    pub hostname: String,

    /// Staging directory, cleared at the start of every run
    #[arg(long, env = "STREAMSNAP_INTERIM_DATA_DIR")]
    pub interim_data_dir: PathBuf,

    /// Write output.json here when set
    #[arg(long, env = "STREAMSNAP_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Comma separated stream names
    #[arg(long, env = "STREAMSNAP_STREAMS", value_delimiter = ',')]
    pub streams: Vec<String>,

    /// Extra arguments for every stream backup or restore, split on whitespace
    #[arg(long, env = "STREAMSNAP_NATS_ARGS", default_value = "", allow_hyphen_values = true)]
    pub nats_args: String,

    /// Seconds to wait for the server to accept connections
    #[arg(long, env = "STREAMSNAP_WAIT_TIMEOUT", default_value_t = 300)]
    pub wait_timeout: u64,

    /// Connection time above which the readiness check warns
    #[arg(long, env = "STREAMSNAP_WARNING_THRESHOLD", default_value = "30s")]
    pub warning_threshold: String,
}

impl SessionArgs {
    fn binding_namespace(&self) -> &str {
        self.appbinding_namespace.as_deref().unwrap_or(&self.namespace)
    }

    pub fn setup_options(&self) -> SetupOptions {
        let storage_secret = self.storage_secret_name.as_ref().map(|name| {
            let namespace = self
                .storage_secret_namespace
                .clone()
                .unwrap_or_else(|| self.namespace.clone());
            (namespace, name.clone())
        });
        SetupOptions {
            provider: self.provider.clone(),
            bucket: self.bucket.clone(),
            endpoint: self.endpoint.clone(),
            region: self.region.clone(),
            path: self.path.clone(),
            scratch_dir: self.scratch_dir.clone(),
            enable_cache: self.enable_cache,
            max_connections: self.max_connections,
            storage_secret,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            namespace: self.binding_namespace().to_string(),
            binding: self.appbinding.clone(),
            staging_dir: self.interim_data_dir.clone(),
            scratch_dir: self.scratch_dir.clone(),
            units: self
                .streams
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            tool_args: self.nats_args.clone(),
            host: self.hostname.clone(),
            readiness: ReadinessPolicy::with_deadline(Duration::from_secs(self.wait_timeout)),
            warning_threshold: self.warning_threshold.clone(),
            ..Default::default()
        }
    }

    pub fn build_session(&self) -> Session {
        let store = Arc::new(LocalObjectStore::new(&self.object_store_dir));
        let runner = Arc::new(ProcessRunner::new());
        let engine = Arc::new(ResticEngine::new(runner.clone(), store.clone(), self.setup_options()));
        Session::new(store, runner, engine, self.session_options())
    }

    /// Writes the report when an output directory is set, then turns a
    /// failed session into a non-zero exit.
    pub async fn finish(&self, report: &SessionReport) -> Result<()> {
        if let Some(dir) = &self.output_dir {
            let path = dir.join(DEFAULT_OUTPUT_FILE_NAME);
            report.write_output(&path).await?;
            info!("Wrote session report to {}", path.display());
        }
        if let Some(error) = report.first_error() {
            bail!("{} of {} failed: {}", report.operation, self.appbinding, error);
        }
        if !report.is_success() {
            bail!("{} of {} failed", report.operation, self.appbinding);
        }
        Ok(())
    }
}
