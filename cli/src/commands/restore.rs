use super::SessionArgs;
use anyhow::Result;
use clap::Args;
use streamsnap_integrations::nats::RestoreRequest;
use tracing::info;

#[derive(Args, Debug)]
pub struct RestoreCommand {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Host whose snapshots are restored, defaults to --hostname
    #[arg(long, env = "STREAMSNAP_SOURCE_HOSTNAME")]
    pub source_hostname: Option<String>,

    /// Snapshot to restore; repeat for several. Latest when omitted
    #[arg(long = "snapshot", env = "STREAMSNAP_SNAPSHOTS", value_delimiter = ',')]
    pub snapshots: Vec<String>,

    /// Delete streams that already exist before restoring them
    #[arg(long, env = "STREAMSNAP_OVERWRITE")]
    pub overwrite: bool,
}

impl RestoreCommand {
    pub fn request(&self) -> RestoreRequest {
        RestoreRequest {
            source_host: self.source_hostname.clone(),
            snapshots: self.snapshots.clone(),
            overwrite: self.overwrite,
        }
    }

    pub async fn run(&self) -> Result<()> {
        info!(
            appbinding = %self.session.appbinding,
            host = %self.session.hostname,
            overwrite = self.overwrite,
            "Starting NATS restore"
        );
        let report = self.session.build_session().restore(&self.request()).await;
        self.session.finish(&report).await
    }
}
