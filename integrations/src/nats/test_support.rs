//! In-memory stand-ins for the object store, the process runner, the
//! stream tool and the snapshot engine.

use super::tool::StreamTool;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use streamsnap_backends::{
    BackupOptions, CommandOutput, CommandRunner, Invocation, ObjectKind, ObjectStore, RestoreOptions,
    SnapshotEngine,
};
use streamsnap_core::{
    Error, HostStats, Operation, Result, SessionReport, TargetRef, MANIFEST_FILE_NAME,
};

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<(String, String, String), Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, kind: ObjectKind, namespace: &str, name: &str, raw: &[u8]) {
        self.objects.lock().unwrap().insert(
            (kind.plural().to_string(), namespace.to_string(), name.to_string()),
            Bytes::copy_from_slice(raw),
        );
    }

    pub fn insert_secret(&self, namespace: &str, name: &str, entries: &[(&str, &str)]) {
        let data: BTreeMap<&str, String> = entries
            .iter()
            .map(|(k, v)| (*k, STANDARD.encode(v.as_bytes())))
            .collect();
        let raw = serde_json::json!({ "data": data }).to_string();
        self.insert(ObjectKind::Secret, namespace, name, raw.as_bytes());
    }

    pub fn insert_binding(&self, namespace: &str, name: &str, document: &str) {
        self.insert(ObjectKind::AppBinding, namespace, name, document.as_bytes());
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, kind: ObjectKind, namespace: &str, name: &str) -> Result<Bytes> {
        let key = (kind.plural().to_string(), namespace.to_string(), name.to_string());
        self.objects
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::ObjectNotFound {
                kind: kind.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}

fn scripted_failure(program: &str) -> Error {
    Error::CommandFailed {
        program: program.to_string(),
        code: "1".to_string(),
        stderr: "scripted failure".to_string(),
    }
}

/// Records every invocation and plays a tiny `nats` server: `stream ls`
/// prints the live streams and `stream rm` drops one.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<Invocation>>,
    streams: Mutex<Vec<String>>,
    fail_prefix: Vec<String>,
}

impl RecordingRunner {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn with_streams(streams: &[&str]) -> Self {
        Self {
            streams: Mutex::new(streams.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        }
    }

    /// Fails every invocation whose arguments start with `prefix`.
    pub fn failing_on(prefix: &[&str]) -> Self {
        Self::default().fail_when(prefix)
    }

    pub fn fail_when(mut self, prefix: &[&str]) -> Self {
        self.fail_prefix = prefix.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Argument vectors joined by spaces, for compact assertions.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.args.join(" ")).collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(invocation.clone());

        if !self.fail_prefix.is_empty() && invocation.args.starts_with(&self.fail_prefix) {
            return Err(scripted_failure(&invocation.program));
        }

        let args: Vec<&str> = invocation.args.iter().map(String::as_str).collect();
        let mut streams = self.streams.lock().unwrap();
        match args.as_slice() {
            ["stream", "ls", ..] => Ok(CommandOutput {
                stdout: Bytes::from(serde_json::to_vec(&*streams)?),
                stderr: Bytes::new(),
            }),
            ["stream", "rm", "-f", unit] => {
                streams.retain(|s| s != unit);
                Ok(CommandOutput::default())
            }
            _ => Ok(CommandOutput::default()),
        }
    }
}

/// Scriptable `StreamTool` that records calls as short strings, such as
/// `"probe 30s"`, `"list"`, `"export orders /staging/orders"`, `"delete b"`.
#[derive(Default)]
pub struct FakeTool {
    live: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
    probe_failures: Mutex<u32>,
    fail_listing: Mutex<bool>,
    fail_unit: Mutex<Option<String>>,
}

impl FakeTool {
    pub fn new(live: &[&str]) -> Self {
        Self {
            live: Mutex::new(live.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn fail_probes(&self, count: u32) {
        *self.probe_failures.lock().unwrap() = count;
    }

    pub fn fail_listing(&self) {
        *self.fail_listing.lock().unwrap() = true;
    }

    /// Export, import and delete of `unit` fail.
    pub fn fail_on_unit(&self, unit: &str) {
        *self.fail_unit.lock().unwrap() = Some(unit.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn live(&self) -> Vec<String> {
        self.live.lock().unwrap().clone()
    }

    /// What `list_raw` prints for the current live streams.
    pub fn listing(&self) -> Vec<u8> {
        serde_json::to_vec(&self.live()).unwrap()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_unit(&self, unit: &str) -> Result<()> {
        if self.fail_unit.lock().unwrap().as_deref() == Some(unit) {
            return Err(scripted_failure("nats"));
        }
        Ok(())
    }
}

#[async_trait]
impl StreamTool for FakeTool {
    async fn check_connection(&self, warning_threshold: &str) -> Result<()> {
        self.record(format!("probe {}", warning_threshold));
        let mut remaining = self.probe_failures.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(scripted_failure("nats"));
        }
        Ok(())
    }

    async fn list_raw(&self) -> Result<Bytes> {
        self.record("list".to_string());
        if *self.fail_listing.lock().unwrap() {
            return Err(scripted_failure("nats"));
        }
        Ok(Bytes::from(self.listing()))
    }

    async fn export(&self, unit: &str, dest: &Path) -> Result<()> {
        self.record(format!("export {} {}", unit, dest.display()));
        self.check_unit(unit)
    }

    async fn import(&self, unit: &str, src: &Path) -> Result<()> {
        self.record(format!("import {} {}", unit, src.display()));
        self.check_unit(unit)
    }

    async fn delete(&self, unit: &str) -> Result<()> {
        self.record(format!("delete {}", unit));
        self.check_unit(unit)?;
        self.live.lock().unwrap().retain(|s| s != unit);
        Ok(())
    }
}

/// Keeps the manifest of the last backup in memory and writes it back on
/// restore, standing in for a real snapshot repository.
#[derive(Default)]
pub struct FakeEngine {
    snapshot: Mutex<Option<Vec<u8>>>,
    calls: Mutex<Vec<String>>,
    fail: bool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn stored_manifest(&self) -> Option<Vec<u8>> {
        self.snapshot.lock().unwrap().clone()
    }
}

#[async_trait]
impl SnapshotEngine for FakeEngine {
    async fn run_backup(&self, options: &BackupOptions, target: &TargetRef) -> Result<SessionReport> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("backup {}", options.host));
        if self.fail {
            return Err(Error::Other("repository unreachable".to_string()));
        }
        let manifest = std::fs::read(options.paths[0].join(MANIFEST_FILE_NAME))?;
        *self.snapshot.lock().unwrap() = Some(manifest);
        Ok(SessionReport::new(
            Operation::Backup,
            target.clone(),
            HostStats::succeeded(options.host.as_str()),
        ))
    }

    async fn run_restore(&self, options: &RestoreOptions, target: &TargetRef) -> Result<SessionReport> {
        let source = options.source_host.as_deref().unwrap_or(&options.host);
        self.calls
            .lock()
            .unwrap()
            .push(format!("restore {}", source));
        if self.fail {
            return Err(Error::Other("repository unreachable".to_string()));
        }
        if let Some(manifest) = self.snapshot.lock().unwrap().as_ref() {
            std::fs::write(options.paths[0].join(MANIFEST_FILE_NAME), manifest)?;
        }
        Ok(SessionReport::new(
            Operation::Restore,
            target.clone(),
            HostStats::succeeded(options.host.as_str()),
        ))
    }
}
