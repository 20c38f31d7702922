use super::SessionArgs;
use anyhow::Result;
use clap::Args;
use streamsnap_backends::RetentionPolicy;
use tracing::info;

#[derive(Args, Debug)]
pub struct BackupCommand {
    #[command(flatten)]
    pub session: SessionArgs,

    #[arg(long, env = "STREAMSNAP_RETENTION_KEEP_LAST", help = "Keep the last N snapshots")]
    pub retention_keep_last: Option<u32>,

    #[arg(long, env = "STREAMSNAP_RETENTION_KEEP_HOURLY", help = "Keep N hourly snapshots")]
    pub retention_keep_hourly: Option<u32>,

    #[arg(long, env = "STREAMSNAP_RETENTION_KEEP_DAILY", help = "Keep N daily snapshots")]
    pub retention_keep_daily: Option<u32>,

    #[arg(long, env = "STREAMSNAP_RETENTION_KEEP_WEEKLY", help = "Keep N weekly snapshots")]
    pub retention_keep_weekly: Option<u32>,

    #[arg(long, env = "STREAMSNAP_RETENTION_KEEP_MONTHLY", help = "Keep N monthly snapshots")]
    pub retention_keep_monthly: Option<u32>,

    #[arg(long, env = "STREAMSNAP_RETENTION_KEEP_YEARLY", help = "Keep N yearly snapshots")]
    pub retention_keep_yearly: Option<u32>,

    #[arg(long, env = "STREAMSNAP_RETENTION_KEEP_TAGS", value_delimiter = ',', help = "Keep snapshots with these tags")]
    pub retention_keep_tags: Vec<String>,

    #[arg(long, env = "STREAMSNAP_RETENTION_PRUNE", help = "Remove unreferenced data after forgetting")]
    pub retention_prune: bool,

    #[arg(long, env = "STREAMSNAP_RETENTION_DRY_RUN", help = "Only show what retention would remove")]
    pub retention_dry_run: bool,
}

impl BackupCommand {
    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            keep_last: self.retention_keep_last,
            keep_hourly: self.retention_keep_hourly,
            keep_daily: self.retention_keep_daily,
            keep_weekly: self.retention_keep_weekly,
            keep_monthly: self.retention_keep_monthly,
            keep_yearly: self.retention_keep_yearly,
            keep_tags: self.retention_keep_tags.clone(),
            prune: self.retention_prune,
            dry_run: self.retention_dry_run,
        }
    }

    pub async fn run(&self) -> Result<()> {
        info!(
            appbinding = %self.session.appbinding,
            host = %self.session.hostname,
            "Starting NATS backup"
        );
        let report = self.session.build_session().backup(&self.retention()).await;
        self.session.finish(&report).await
    }
}
