//! The `nats` command line tool as the stream store's only access path.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use streamsnap_backends::{CommandRunner, Invocation};
use streamsnap_core::{Result, UnitManifest};
use tracing::debug;

pub const NATS_CMD: &str = "nats";

/// Operations the orchestration needs from the stream store.
#[async_trait]
pub trait StreamTool: Send + Sync {
    /// Connectivity check. Only the exit status matters.
    async fn check_connection(&self, warning_threshold: &str) -> Result<()>;

    /// Raw output of the stream listing, a JSON array of names.
    async fn list_raw(&self) -> Result<Bytes>;

    async fn export(&self, unit: &str, dest: &Path) -> Result<()>;

    async fn import(&self, unit: &str, src: &Path) -> Result<()>;

    /// Force-deletes a stream without prompting.
    async fn delete(&self, unit: &str) -> Result<()>;

    async fn list(&self) -> Result<Vec<String>> {
        let raw = self.list_raw().await?;
        Ok(UnitManifest::decode(&raw)?.into_units())
    }
}

/// Splits user supplied tool arguments on whitespace. Quoting is not
/// interpreted, so an argument cannot itself contain whitespace.
pub fn split_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

pub struct NatsCli {
    runner: Arc<dyn CommandRunner>,
    env: BTreeMap<String, String>,
    extra_args: Vec<String>,
}

impl NatsCli {
    /// `env` carries the server address and credentials; `extra_args` is
    /// appended to every export and import.
    pub fn new(runner: Arc<dyn CommandRunner>, env: BTreeMap<String, String>, extra_args: &str) -> Self {
        Self {
            runner,
            env,
            extra_args: split_args(extra_args),
        }
    }

    fn command<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation::new(NATS_CMD).args(args).envs(&self.env)
    }

    fn transfer_command(&self, verb: &str, unit: &str, path: &Path) -> Invocation {
        self.command(["stream", verb])
            .args(self.extra_args.iter().cloned())
            .arg(unit)
            .arg(path.display().to_string())
    }
}

#[async_trait]
impl StreamTool for NatsCli {
    async fn check_connection(&self, warning_threshold: &str) -> Result<()> {
        let mut args = vec!["server", "check", "connection"];
        if !warning_threshold.is_empty() {
            args.extend(["--connect-warning", warning_threshold]);
        }
        self.runner.run(&self.command(args)).await?;
        Ok(())
    }

    async fn list_raw(&self) -> Result<Bytes> {
        let output = self.runner.run(&self.command(["stream", "ls", "--json"])).await?;
        Ok(output.stdout)
    }

    async fn export(&self, unit: &str, dest: &Path) -> Result<()> {
        debug!(stream = unit, dest = %dest.display(), "Exporting stream");
        self.runner.run(&self.transfer_command("backup", unit, dest)).await?;
        Ok(())
    }

    async fn import(&self, unit: &str, src: &Path) -> Result<()> {
        debug!(stream = unit, src = %src.display(), "Importing stream");
        self.runner.run(&self.transfer_command("restore", unit, src)).await?;
        Ok(())
    }

    async fn delete(&self, unit: &str) -> Result<()> {
        debug!(stream = unit, "Deleting stream");
        self.runner.run(&self.command(["stream", "rm", "-f", unit])).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nats::test_support::RecordingRunner;
    use std::path::PathBuf;

    fn cli(runner: Arc<RecordingRunner>, extra: &str) -> NatsCli {
        let mut env = BTreeMap::new();
        env.insert("NATS_URL".to_string(), "nats://nats:4222".to_string());
        NatsCli::new(runner, env, extra)
    }

    #[test]
    fn test_split_args_ignores_repeated_whitespace() {
        assert_eq!(split_args("  --no-progress \t --chunk-size 64 "), ["--no-progress", "--chunk-size", "64"]);
        assert!(split_args("   ").is_empty());
    }

    #[tokio::test]
    async fn test_export_places_extra_args_before_unit_and_path() {
        let runner = Arc::new(RecordingRunner::succeeding());
        cli(runner.clone(), "--no-progress --check")
            .export("orders", &PathBuf::from("/interim/orders"))
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0].program, "nats");
        assert_eq!(
            calls[0].args,
            ["stream", "backup", "--no-progress", "--check", "orders", "/interim/orders"]
        );
        assert_eq!(calls[0].env["NATS_URL"], "nats://nats:4222");
    }

    #[tokio::test]
    async fn test_import_uses_restore_verb() {
        let runner = Arc::new(RecordingRunner::succeeding());
        cli(runner.clone(), "")
            .import("events", &PathBuf::from("/interim/events"))
            .await
            .unwrap();

        assert_eq!(runner.calls()[0].args, ["stream", "restore", "events", "/interim/events"]);
    }

    #[tokio::test]
    async fn test_probe_list_and_delete_arguments() {
        let runner = Arc::new(RecordingRunner::with_streams(&["a", "b"]));
        let tool = cli(runner.clone(), "--ignored-here");

        tool.check_connection("30s").await.unwrap();
        assert_eq!(tool.list().await.unwrap(), ["a", "b"]);
        tool.delete("a").await.unwrap();

        let args: Vec<Vec<String>> = runner.calls().into_iter().map(|c| c.args).collect();
        assert_eq!(args[0], ["server", "check", "connection", "--connect-warning", "30s"]);
        assert_eq!(args[1], ["stream", "ls", "--json"]);
        assert_eq!(args[2], ["stream", "rm", "-f", "a"]);
    }

    #[tokio::test]
    async fn test_failed_command_propagates() {
        let runner = Arc::new(RecordingRunner::failing_on(&["stream", "backup"]));
        let err = cli(runner, "")
            .export("orders", &PathBuf::from("/interim/orders"))
            .await
            .unwrap_err();
        assert!(matches!(err, streamsnap_core::Error::CommandFailed { .. }));
    }
}
