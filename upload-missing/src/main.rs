use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use upload_missing::config::SyncConfig;
use upload_missing::sync::engine::{SyncEngine, SyncReport};
use upload_missing_core::S3Store;

/// Upload local files that are missing from an S3 prefix.
#[derive(Debug, Parser)]
#[command(
    name = "s3-upload-missing",
    version,
    override_usage = "s3-upload-missing from-local-path remote-bucket-name remote-path [OPTIONS]"
)]
struct Cli {
    /// Local directory to mirror
    #[arg(value_name = "from-local-path")]
    local_root: PathBuf,

    /// Destination bucket
    #[arg(value_name = "remote-bucket-name")]
    bucket: String,

    /// Key prefix inside the bucket ("" or "/" for the bucket root)
    #[arg(value_name = "remote-path")]
    remote_path: String,

    /// Canned ACL applied to uploaded objects
    #[arg(long, default_value = "private")]
    acl: String,

    /// Delete remote objects that no longer exist locally
    #[arg(long)]
    delete: bool,

    /// Temporarily make unreadable files readable while uploading them
    #[arg(long)]
    chmod_if_needed: bool,

    /// Log progress to stderr
    #[arg(long, short)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> SyncConfig {
        let mut config = SyncConfig::new(self.local_root, self.bucket, self.remote_path);
        config.acl = self.acl;
        config.delete = self.delete;
        config.chmod_if_needed = self.chmod_if_needed;
        config
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "off" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(config: SyncConfig) -> anyhow::Result<SyncReport> {
    let target = format!("s3://{}/{}", config.bucket, config.key_prefix());
    let store = S3Store::connect(config.store_config()).await;
    let mut engine = SyncEngine::new(Arc::new(store), config.sync_options());
    engine
        .run()
        .await
        .with_context(|| format!("mirroring {:?} to {target}", config.local_root))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version land here too and are not failures.
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    dotenvy::dotenv().ok();
    init_tracing(cli.verbose);

    match run(cli.into_config().with_env()).await {
        Ok(report) => {
            info!(
                "uploaded {}, skipped {}, deleted {}",
                report.uploaded, report.skipped, report.deleted
            );
            info!("DONE.");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("s3-upload-missing: {err:#}");
            ExitCode::FAILURE
        }
    }
}
