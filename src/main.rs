use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use upload_sentry::{SecurityConfig, SecurityManager};

#[derive(Parser, Debug)]
#[command(author, version, about = "Validate files through the upload security pipeline")]
struct Args {
    /// Files to validate
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Override the fail-open/fail-closed policy for inconclusive reputation
    #[arg(long)]
    fail_closed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "upload_sentry=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = SecurityConfig::from_env();
    if args.fail_closed {
        config.fail_closed = true;
    }
    info!(
        "Upload root: {}, max size: {} MB, scanner: {}, reputation: {}, policy: {}",
        config.upload_root.display(),
        config.max_file_size / 1024 / 1024,
        config.scanner_type,
        if config.reputation_api_key.is_some() {
            "remote"
        } else {
            "local-only"
        },
        if config.fail_closed { "fail-closed" } else { "fail-open" },
    );

    let manager = SecurityManager::from_config(config)?;
    let mut any_rejected = false;

    for path in &args.files {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload");
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();

        let verdict = manager.validate_upload(file, filename, size).await;
        any_rejected |= !verdict.accepted;
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    }

    if any_rejected {
        std::process::exit(1);
    }
    Ok(())
}
