mod operations;
mod reporting;

use app_state::{SettingsOverlay, load_settings, scrub_credential_env};
use clap::{Parser, Subcommand};
use color_eyre::Result;
use operations::Operation;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "icesync", version, about = "One-way mirror of an iCloud Photos library", long_about = None)]
struct Args {
    /// Path to a YAML settings file.
    #[clap(long)]
    config: Option<PathBuf>,
    /// Apple ID to sign in with.
    #[clap(long, env = "APPLE_ID_USER")]
    username: Option<String>,
    #[clap(long, env = "APPLE_ID_PWD", hide_env_values = true)]
    password: Option<String>,
    /// Trust token from an earlier sign-in; skips MFA while valid.
    #[clap(long, env = "TRUST_TOKEN", hide_env_values = true)]
    trust_token: Option<String>,
    /// Root of the mirrored library tree.
    #[clap(long)]
    data_dir: Option<PathBuf>,
    /// Port of the local MFA submission endpoint.
    #[clap(long)]
    port: Option<u16>,
    /// Cron expression for daemon mode.
    #[clap(long)]
    schedule: Option<String>,
    #[clap(long)]
    max_retries: Option<u32>,
    #[clap(long)]
    download_threads: Option<usize>,
    /// Take over an existing library lock.
    #[clap(long, default_value_t = false, action)]
    force: bool,
    /// Delete non-favorite remote originals when archiving.
    #[clap(long, default_value_t = false, action)]
    remote_delete: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mirror the remote library once.
    Sync,
    /// Refresh and print the trust token.
    Token,
    /// Freeze a local album so future syncs leave it untouched.
    Archive { path: PathBuf },
    /// Keep syncing on the configured schedule until signalled.
    Daemon,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    color_eyre::install()?;

    let overlay = SettingsOverlay {
        username: args.username,
        password: args.password,
        trust_token: args.trust_token,
        data_dir: args.data_dir,
        port: args.port,
        schedule: args.schedule,
        max_retries: args.max_retries,
        download_threads: args.download_threads,
        force: args.force,
        remote_delete: args.remote_delete,
    };
    let settings = load_settings(args.config.as_deref(), overlay)?;
    scrub_credential_env();

    let level: Level = settings.logging.level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let operation = match args.command {
        Command::Sync => Operation::Sync,
        Command::Token => Operation::Token,
        Command::Archive { path } => Operation::Archive { path },
        Command::Daemon => Operation::Daemon,
    };
    operations::run(operation, settings).await
}
