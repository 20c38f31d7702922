use async_trait::async_trait;
use std::path::PathBuf;
use streamsnap_core::{Result, SessionReport, TargetRef, DEFAULT_HOST};

/// Storage location and knobs shared by backup and restore.
#[derive(Debug, Clone)]
pub struct SetupOptions {
    pub provider: String,
    pub bucket: String,
    pub endpoint: String,
    pub region: String,
    pub path: String,
    pub scratch_dir: PathBuf,
    pub enable_cache: bool,
    pub max_connections: Option<u32>,
    /// Namespace and name of the secret holding repository credentials.
    pub storage_secret: Option<(String, String)>,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            provider: String::new(),
            bucket: String::new(),
            endpoint: String::new(),
            region: String::new(),
            path: String::new(),
            scratch_dir: PathBuf::from("/tmp"),
            enable_cache: false,
            max_connections: None,
            storage_secret: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub keep_last: Option<u32>,
    pub keep_hourly: Option<u32>,
    pub keep_daily: Option<u32>,
    pub keep_weekly: Option<u32>,
    pub keep_monthly: Option<u32>,
    pub keep_yearly: Option<u32>,
    pub keep_tags: Vec<String>,
    pub prune: bool,
    pub dry_run: bool,
}

impl RetentionPolicy {
    pub fn is_empty(&self) -> bool {
        self.keep_last.is_none()
            && self.keep_hourly.is_none()
            && self.keep_daily.is_none()
            && self.keep_weekly.is_none()
            && self.keep_monthly.is_none()
            && self.keep_yearly.is_none()
            && self.keep_tags.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub host: String,
    pub paths: Vec<PathBuf>,
    pub retention: RetentionPolicy,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            paths: Vec::new(),
            retention: RetentionPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RestoreOptions {
    pub host: String,
    /// Host whose snapshots are restored; defaults to `host`.
    pub source_host: Option<String>,
    pub paths: Vec<PathBuf>,
    /// Explicit snapshot ids. Empty means the latest snapshot.
    pub snapshots: Vec<String>,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            source_host: None,
            paths: Vec::new(),
            snapshots: Vec::new(),
        }
    }
}

/// Durable, deduplicated storage for a set of local paths.
#[async_trait]
pub trait SnapshotEngine: Send + Sync {
    async fn run_backup(&self, options: &BackupOptions, target: &TargetRef) -> Result<SessionReport>;

    async fn run_restore(&self, options: &RestoreOptions, target: &TargetRef) -> Result<SessionReport>;
}
