use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use songfetch::acquire::{AcquisitionPipeline, ClientContext, SongRequest};
use songfetch::cli::{Cli, Commands};
use songfetch::config::{Config, StorageBackend};
use songfetch::convert::Converter;
use songfetch::storage::{LocalStorage, S3Storage, StorageGateway};
use songfetch::utils;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_directive = if cli.verbose { "songfetch=debug" } else { "songfetch=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::load().await?;

    match cli.command {
        Commands::Acquire {
            id,
            artist,
            title,
            duration_ms,
            api_key,
            user,
        } => {
            if api_key.is_some() {
                config.search.api_key = api_key;
            }

            let storage = build_storage(&config).await;
            let pipeline = AcquisitionPipeline::new(&config, storage).await?;

            let ctx = match user {
                Some(user) => ClientContext::for_user(user),
                None => ClientContext::anonymous(),
            };
            let request = SongRequest {
                id,
                artist,
                title,
                target_duration_ms: duration_ms,
            };

            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg}")
                    .unwrap(),
            );
            spinner.set_message("Resolving and fetching audio...");
            spinner.enable_steady_tick(Duration::from_millis(120));

            let result = pipeline.provide(&request, &ctx).await;
            spinner.finish_and_clear();

            match result {
                Some(handle) => println!("Stored audio available at: {}", handle.location),
                None => {
                    println!("No audio could be acquired for this request.");
                    std::process::exit(1);
                }
            }
        }

        Commands::Locate {
            id,
            artist,
            title,
            duration_ms,
            api_key,
        } => {
            if api_key.is_some() {
                config.search.api_key = api_key;
            }

            let storage = build_storage(&config).await;
            let pipeline = AcquisitionPipeline::new(&config, storage).await?;

            let request = SongRequest {
                id,
                artist,
                title,
                target_duration_ms: duration_ms,
            };

            match pipeline.locate(&request, &ClientContext::anonymous()).await {
                Some(url) => println!("{}", url),
                None => {
                    println!("No candidate could be located for this request.");
                    std::process::exit(1);
                }
            }
        }

        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                println!("Edit the config file manually:");
                println!("  {}", Config::config_path()?.display());
            }
        }

        Commands::Doctor => {
            let command = config.audio.downloader_command();
            let program = command.first().cloned().unwrap_or_default();
            let downloader_ok = utils::command_available(&program).await;
            let converter_ok = Converter::new().installed().await;

            println!("Downloader command: {}", command.join(" "));
            println!(
                "  {} available: {}",
                program,
                if downloader_ok { "yes" } else { "NO" }
            );
            println!(
                "Converter (ffmpeg) installed: {}",
                if converter_ok { "yes" } else { "NO" }
            );
            println!(
                "Search API key: {}",
                if config.search.api_key.is_some() { "configured" } else { "NOT SET" }
            );

            if !downloader_ok || !converter_ok {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn build_storage(config: &Config) -> Arc<dyn StorageGateway> {
    match config.storage.backend {
        StorageBackend::Local => {
            let root = config
                .storage
                .local_root
                .clone()
                .unwrap_or_else(default_local_root);
            Arc::new(LocalStorage::new(root))
        }
        StorageBackend::S3 => Arc::new(
            S3Storage::new(
                config.storage.s3.region.clone(),
                config.storage.s3.bucket.clone(),
                config.storage.s3.key_prefix.clone(),
            )
            .await,
        ),
    }
}

fn default_local_root() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("songfetch"))
        .unwrap_or_else(|| PathBuf::from("songfetch-storage"))
}
