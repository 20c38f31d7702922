mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{backup::BackupCommand, restore::RestoreCommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(
    name = "streamsnap",
    version,
    about = "Backup and restore NATS JetStream streams",
    long_about = "Streamsnap exports NATS JetStream streams with the nats CLI and stores them as restic snapshots"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Export streams and store them as a snapshot")]
    Backup(BackupCommand),

    #[command(about = "Restore streams from a snapshot")]
    Restore(RestoreCommand),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet)?;

    match &cli.command {
        Commands::Backup(cmd) => cmd.run().await,
        Commands::Restore(cmd) => cmd.run().await,
    }
}

fn init_tracing(verbose: bool, quiet: bool) -> Result<()> {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "streamsnap={level},streamsnap_core={level},streamsnap_backends={level},streamsnap_integrations={level}"
        ))
    });

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
