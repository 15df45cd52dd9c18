use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use poppang_common::{load_config, AppConfig, FileConfig, Vocabulary};
use poppang_scout::scout::{RunOptions, Scout};
use poppang_scout::state::StateStore;

#[derive(Parser)]
#[command(name = "poppang-scout", about = "Popup-store discovery and alert pipeline")]
struct Cli {
    /// Path to config TOML file
    #[arg(long, global = true, default_value = "./config/poppang.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline once
    Run {
        /// Hashtag to scan (defaults to `[scout] hashtag`)
        #[arg(long)]
        tag: Option<String>,
        /// Continue from the last completed stage of an interrupted run
        #[arg(long)]
        resume: bool,
        /// Skip image downloads; moderation fetches remote images instead
        #[arg(long)]
        no_download: bool,
        /// Report keyword matches without recording alerts or sending pushes
        #[arg(long)]
        dry_run_notify: bool,
    },
    /// Show the last checkpoint for a tag
    Status {
        #[arg(long)]
        tag: Option<String>,
    },
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    if path.exists() {
        info!(path = %path.display(), "Loading config");
        load_config(path)
    } else {
        info!(path = %path.display(), "No config file, using defaults");
        Ok(FileConfig::default())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("poppang=info".parse()?))
        .init();

    let cli = Cli::parse();
    let file_config = load_file_config(&cli.config)?;

    match cli.command {
        Command::Run {
            tag,
            resume,
            no_download,
            dry_run_notify,
        } => {
            info!("Poppang scout starting...");
            let app = AppConfig::from_env()?;
            let vocab = match &file_config.vocabulary {
                Some(path) => Vocabulary::load(path)?,
                None => Vocabulary::embedded()?,
            };
            info!(
                version = vocab.version,
                categories = vocab.categories.len(),
                "Vocabulary loaded"
            );

            let scout = Scout::from_config(&app, file_config, vocab)?;
            let options = RunOptions {
                tag,
                resume,
                download: no_download.then_some(false),
                dry_run_notify,
            };
            let stats = scout.run(&options).await?;
            info!(
                persisted = stats.persisted,
                pushes = stats.pushes_sent,
                "Scout run complete"
            );
        }
        Command::Status { tag } => {
            dotenvy::dotenv().ok();
            let data_dir = std::env::var("DATA_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "data".to_string());
            let tag = tag.unwrap_or_else(|| file_config.scout.hashtag.clone());
            let store = StateStore::for_tag(Path::new(&data_dir), &tag);
            match store.checkpoint()? {
                Some(c) => println!(
                    "{tag}: run {} completed stage '{}' at {}",
                    c.run_id, c.stage, c.updated_at
                ),
                None => println!("{tag}: no checkpoint in {}", store.dir().display()),
            }
        }
    }

    Ok(())
}
