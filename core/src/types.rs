use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tokio::fs;

pub const DEFAULT_HOST: &str = "host-0";
pub const DEFAULT_OUTPUT_FILE_NAME: &str = "output.json";

/// Identity of the object a session backs up or restores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl TargetRef {
    pub fn app_binding(name: impl Into<String>, namespace: Option<String>) -> Self {
        Self {
            api_version: "appcatalog.appscode.com/v1alpha1".to_string(),
            kind: "AppBinding".to_string(),
            name: name.into(),
            namespace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Backup,
    Restore,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Backup => write!(f, "backup"),
            Operation::Restore => write!(f, "restore"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostPhase {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStats {
    pub id: String,
    pub paths: Vec<String>,
    pub files_new: u64,
    pub files_changed: u64,
    pub files_unmodified: u64,
    pub data_added: u64,
    pub total_bytes_processed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostStats {
    pub hostname: String,
    pub phase: HostPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snapshots: Vec<SnapshotStats>,
}

impl HostStats {
    pub fn succeeded(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            phase: HostPhase::Succeeded,
            error: None,
            duration: None,
            snapshots: Vec::new(),
        }
    }

    pub fn failed(hostname: impl Into<String>, error: &Error) -> Self {
        Self {
            hostname: hostname.into(),
            phase: HostPhase::Failed,
            error: Some(error.to_string()),
            duration: None,
            snapshots: Vec::new(),
        }
    }
}

/// Structured outcome of one backup or restore run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    pub operation: Operation,
    #[serde(rename = "ref")]
    pub target: TargetRef,
    pub stats: Vec<HostStats>,
}

impl SessionReport {
    pub fn new(operation: Operation, target: TargetRef, stats: HostStats) -> Self {
        Self {
            operation,
            target,
            stats: vec![stats],
        }
    }

    /// Report for a run that stopped at `error`; the host is the configured
    /// primary host, not whatever the failing step was talking to.
    pub fn failed(operation: Operation, target: TargetRef, host: &str, error: &Error) -> Self {
        Self::new(operation, target, HostStats::failed(host, error))
    }

    pub fn from_outcome(
        operation: Operation,
        target: TargetRef,
        host: &str,
        outcome: Result<SessionReport>,
    ) -> Self {
        match outcome {
            Ok(report) => report,
            Err(e) => Self::failed(operation, target, host, &e),
        }
    }

    pub fn is_success(&self) -> bool {
        self.stats.iter().all(|s| s.phase == HostPhase::Succeeded)
    }

    pub fn first_error(&self) -> Option<&str> {
        self.stats.iter().find_map(|s| s.error.as_deref())
    }

    pub async fn write_output(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).await?;
        Ok(())
    }
}
