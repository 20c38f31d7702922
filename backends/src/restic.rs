//! Snapshot engine backed by the `restic` command line tool.

use crate::process::{CommandRunner, Invocation};
use crate::snapshot::{BackupOptions, RestoreOptions, RetentionPolicy, SetupOptions, SnapshotEngine};
use crate::store::{get_secret, ObjectStore};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use streamsnap_core::{
    Error, HostStats, Operation, Result, SessionReport, SnapshotStats, TargetRef,
};
use tracing::{debug, info};

pub const RESTIC_CMD: &str = "restic";

pub struct ResticEngine {
    runner: Arc<dyn CommandRunner>,
    store: Arc<dyn ObjectStore>,
    setup: SetupOptions,
}

#[derive(Debug, Deserialize)]
struct BackupMessage {
    message_type: String,
    #[serde(default)]
    snapshot_id: Option<String>,
    #[serde(default)]
    files_new: u64,
    #[serde(default)]
    files_changed: u64,
    #[serde(default)]
    files_unmodified: u64,
    #[serde(default)]
    data_added: u64,
    #[serde(default)]
    total_bytes_processed: u64,
}

impl ResticEngine {
    pub fn new(runner: Arc<dyn CommandRunner>, store: Arc<dyn ObjectStore>, setup: SetupOptions) -> Self {
        Self { runner, store, setup }
    }

    pub fn repository_url(&self) -> Result<String> {
        let s = &self.setup;
        let path = s.path.trim_matches('/');
        let url = match s.provider.as_str() {
            "local" => {
                if s.path.is_empty() {
                    return Err(Error::InvalidConfig("local backend requires a path".to_string()));
                }
                s.path.clone()
            }
            "s3" => {
                let endpoint = if s.endpoint.is_empty() {
                    "s3.amazonaws.com"
                } else {
                    s.endpoint.trim_end_matches('/')
                };
                format!("s3:{}/{}/{}", endpoint, s.bucket, path)
            }
            "gcs" => format!("gs:{}:/{}", s.bucket, path),
            "azure" => format!("azure:{}:/{}", s.bucket, path),
            "b2" => format!("b2:{}:{}", s.bucket, path),
            "swift" => format!("swift:{}:/{}", s.bucket, path),
            "rest" => {
                if s.endpoint.is_empty() {
                    return Err(Error::InvalidConfig("rest backend requires an endpoint".to_string()));
                }
                format!("rest:{}/{}", s.endpoint.trim_end_matches('/'), path)
            }
            other => {
                return Err(Error::InvalidConfig(format!("unsupported provider: {:?}", other)));
            }
        };
        Ok(url)
    }

    async fn environment(&self) -> Result<BTreeMap<String, String>> {
        let mut env = BTreeMap::new();
        if let Some((namespace, name)) = &self.setup.storage_secret {
            let secret = get_secret(self.store.as_ref(), namespace, name).await?;
            for (key, value) in secret {
                env.insert(key, String::from_utf8_lossy(&value).into_owned());
            }
        }
        env.insert("RESTIC_REPOSITORY".to_string(), self.repository_url()?);
        if !self.setup.region.is_empty() {
            env.insert("AWS_DEFAULT_REGION".to_string(), self.setup.region.clone());
        }
        Ok(env)
    }

    fn global_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.setup.enable_cache {
            args.push("--cache-dir".to_string());
            args.push(self.setup.scratch_dir.join("restic-cache").display().to_string());
        } else {
            args.push("--no-cache".to_string());
        }
        if let Some(max) = self.setup.max_connections {
            let prefix = match self.setup.provider.as_str() {
                "gcs" => Some("gs"),
                "azure" => Some("azure"),
                "b2" => Some("b2"),
                _ => None,
            };
            if let Some(prefix) = prefix {
                args.push("-o".to_string());
                args.push(format!("{}.connections={}", prefix, max));
            }
        }
        args
    }

    fn command<I, S>(&self, env: &BTreeMap<String, String>, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation::new(RESTIC_CMD)
            .args(args)
            .args(self.global_args())
            .envs(env)
    }

    async fn ensure_repository(&self, env: &BTreeMap<String, String>) -> Result<()> {
        if self.runner.run(&self.command(env, ["cat", "config"])).await.is_ok() {
            return Ok(());
        }
        info!("Initializing restic repository");
        self.runner.run(&self.command(env, ["init"])).await?;
        Ok(())
    }

    async fn apply_retention(
        &self,
        env: &BTreeMap<String, String>,
        host: &str,
        policy: &RetentionPolicy,
    ) -> Result<()> {
        if policy.is_empty() {
            debug!("No retention policy configured, skipping forget");
            return Ok(());
        }
        let mut args = vec!["forget".to_string(), "--host".to_string(), host.to_string()];
        let rules = [
            ("--keep-last", policy.keep_last),
            ("--keep-hourly", policy.keep_hourly),
            ("--keep-daily", policy.keep_daily),
            ("--keep-weekly", policy.keep_weekly),
            ("--keep-monthly", policy.keep_monthly),
            ("--keep-yearly", policy.keep_yearly),
        ];
        for (flag, value) in rules {
            if let Some(n) = value {
                args.push(flag.to_string());
                args.push(n.to_string());
            }
        }
        for tag in &policy.keep_tags {
            args.push("--keep-tag".to_string());
            args.push(tag.clone());
        }
        if policy.prune {
            args.push("--prune".to_string());
        }
        if policy.dry_run {
            args.push("--dry-run".to_string());
        }
        self.runner.run(&self.command(env, args)).await?;
        Ok(())
    }
}

/// Picks the final `summary` message out of `restic backup --json` output.
fn parse_backup_summary(stdout: &[u8], paths: Vec<String>) -> Result<SnapshotStats> {
    let text = String::from_utf8_lossy(stdout);
    let summary = text
        .lines()
        .filter_map(|line| serde_json::from_str::<BackupMessage>(line).ok())
        .filter(|msg| msg.message_type == "summary")
        .last()
        .ok_or_else(|| Error::Other("restic backup produced no summary".to_string()))?;

    Ok(SnapshotStats {
        id: summary.snapshot_id.unwrap_or_default(),
        paths,
        files_new: summary.files_new,
        files_changed: summary.files_changed,
        files_unmodified: summary.files_unmodified,
        data_added: summary.data_added,
        total_bytes_processed: summary.total_bytes_processed,
    })
}

fn format_duration(started: Instant) -> String {
    format!("{:.3}s", started.elapsed().as_secs_f64())
}

#[async_trait]
impl SnapshotEngine for ResticEngine {
    async fn run_backup(&self, options: &BackupOptions, target: &TargetRef) -> Result<SessionReport> {
        let started = Instant::now();
        let env = self.environment().await?;
        self.ensure_repository(&env).await?;

        let paths: Vec<String> = options.paths.iter().map(|p| p.display().to_string()).collect();
        let mut args = vec!["backup".to_string()];
        args.extend(paths.iter().cloned());
        args.extend(["--host".to_string(), options.host.clone(), "--json".to_string()]);

        info!("Uploading {} path(s) to restic repository", paths.len());
        let output = self.runner.run(&self.command(&env, args)).await?;
        let snapshot = parse_backup_summary(&output.stdout, paths)?;
        info!(snapshot = %snapshot.id, "Snapshot stored");

        self.apply_retention(&env, &options.host, &options.retention).await?;

        let mut stats = HostStats::succeeded(&options.host);
        stats.snapshots.push(snapshot);
        stats.duration = Some(format_duration(started));
        Ok(SessionReport::new(Operation::Backup, target.clone(), stats))
    }

    async fn run_restore(&self, options: &RestoreOptions, target: &TargetRef) -> Result<SessionReport> {
        let started = Instant::now();
        let env = self.environment().await?;

        let snapshots = if options.snapshots.is_empty() {
            vec!["latest".to_string()]
        } else {
            options.snapshots.clone()
        };

        for snapshot in &snapshots {
            let mut args = vec![
                "restore".to_string(),
                snapshot.clone(),
                "--target".to_string(),
                "/".to_string(),
            ];
            if snapshot == "latest" {
                let host = options.source_host.as_deref().unwrap_or(&options.host);
                args.push("--host".to_string());
                args.push(host.to_string());
            }
            for path in &options.paths {
                args.push("--path".to_string());
                args.push(path.display().to_string());
            }
            info!(snapshot = %snapshot, "Restoring snapshot");
            self.runner.run(&self.command(&env, args)).await?;
        }

        let mut stats = HostStats::succeeded(&options.host);
        stats.duration = Some(format_duration(started));
        Ok(SessionReport::new(Operation::Restore, target.clone(), stats))
    }
}
