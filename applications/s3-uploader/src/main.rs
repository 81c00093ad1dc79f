/// S3 Uploader - Mirror a local directory to an S3 bucket
use anyhow::Context;
use clap::Parser;
use s3_uploader::{run_s3, AppConfig, ConfigOverrides};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "s3-uploader")]
#[command(about = "Watch a directory and upload new or changed files to S3", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to watch for files to upload
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Check interval for file changes in seconds
    #[arg(short, long)]
    interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Maximum number of parallel uploads
    #[arg(long)]
    parallel_uploads: Option<u64>,

    /// Size of the upload queue; should be larger than the number of files
    /// expected to change per check cycle
    #[arg(long)]
    upload_queue_size: Option<u64>,

    /// S3 region
    #[arg(long)]
    s3_region: Option<String>,

    /// S3 bucket
    #[arg(long)]
    s3_bucket: Option<String>,

    /// Custom S3 endpoint URL
    #[arg(long)]
    s3_endpoint: Option<String>,

    /// S3 access key ID
    #[arg(long, alias = "s3-accesskeyid")]
    s3_access_key_id: Option<String>,

    /// S3 secret access key
    #[arg(long, alias = "s3-secretacceskey")]
    s3_secret_access_key: Option<String>,

    /// S3 session token
    #[arg(long, alias = "s3-sessiontoken")]
    s3_session_token: Option<String>,

    /// Use path-style bucket addressing
    #[arg(long)]
    s3_force_path_style: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            directory: self.directory.clone(),
            interval_secs: self.interval,
            log_level: self.log_level.clone(),
            parallel_uploads: self.parallel_uploads,
            queue_size: self.upload_queue_size,
            s3_region: self.s3_region.clone(),
            s3_bucket: self.s3_bucket.clone(),
            s3_endpoint: self.s3_endpoint.clone(),
            s3_access_key_id: self.s3_access_key_id.clone(),
            s3_secret_access_key: self.s3_secret_access_key.clone(),
            s3_session_token: self.s3_session_token.clone(),
            s3_force_path_style: self.s3_force_path_style.then_some(true),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref(), &cli.overrides())
        .context("Failed to load configuration")?;

    let level = config.log_filter()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("s3_uploader={level},s3u_watcher={level},s3u_uploader={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.validate()?;

    info!(
        directory = %config.watch.directory.display(),
        interval_secs = config.watch.interval_secs,
        parallel_uploads = config.upload.parallel_uploads,
        queue_size = config.upload.queue_size,
        bucket = %config.s3.bucket,
        "Starting S3 uploader"
    );

    let stats = run_s3(&config, shutdown_signal()).await?;

    info!(
        completed = stats.completed,
        superseded = stats.superseded,
        failed = stats.failed,
        discarded = stats.discarded,
        "S3 uploader stopped"
    );

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_original_flag_spellings_accepted() {
        let cli = Cli::try_parse_from([
            "s3-uploader",
            "--directory",
            "/data",
            "--s3-accesskeyid",
            "AKIA",
            "--s3-secretacceskey",
            "secret",
            "--s3-sessiontoken",
            "token",
        ])
        .unwrap();

        let overrides = cli.overrides();
        assert_eq!(overrides.directory, Some(PathBuf::from("/data")));
        assert_eq!(overrides.s3_access_key_id.as_deref(), Some("AKIA"));
        assert_eq!(overrides.s3_secret_access_key.as_deref(), Some("secret"));
        assert_eq!(overrides.s3_session_token.as_deref(), Some("token"));
        assert_eq!(overrides.s3_force_path_style, None);
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
