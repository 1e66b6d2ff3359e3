use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod app;
mod auth;
mod backend;
mod cli;
mod config;
mod embedding;
mod images;
mod search;
#[cfg(test)]
mod tests;
mod translation;
mod web;

use app::AppFactory;
use config::Config;

#[derive(Serialize)]
struct EncodedImage {
    file: PathBuf,
    embedding: embedding::Embedding,
}

fn apply_listen(config: &mut Config, listen: &str) -> anyhow::Result<()> {
    let (host, port) = listen
        .rsplit_once(':')
        .with_context(|| format!("listen address {listen:?} must be host:port"))?;
    config.server.host = host.trim_start_matches('[').trim_end_matches(']').to_string();
    config.server.port = port
        .parse()
        .with_context(|| format!("invalid port in listen address {listen:?}"))?;
    Ok(())
}

fn encode_images(
    config: &Config,
    files: &[PathBuf],
    batch_size: Option<usize>,
) -> anyhow::Result<()> {
    let images = files
        .iter()
        .map(|file| {
            std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let provider = embedding::create_provider(&config.embedding)?;
    let batch_size = batch_size.unwrap_or(config.embedding.batch_size);

    let embeddings = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(provider.encode_images_batch(&images, batch_size))?;

    let encoded: Vec<_> = files
        .iter()
        .cloned()
        .zip(embeddings)
        .map(|(file, embedding)| EncodedImage { file, embedding })
        .collect();

    println!("{}", serde_json::to_string_pretty(&encoded)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            eprintln!("failed to load .env: {err}");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();
    let mut config = Config::load(args.config.as_deref())?;

    match args.command.unwrap_or_default() {
        cli::Command::Serve { listen } => {
            if let Some(listen) = listen {
                apply_listen(&mut config, &listen)?;
            }

            let service = AppFactory::create_search_service(&config)?;
            web::start_daemon(service, config.server)
        }

        cli::Command::Models => {
            println!("{}", serde_json::to_string_pretty(&embedding::CATALOG)?);
            Ok(())
        }

        cli::Command::EncodeImages { files, batch_size } => {
            if batch_size == Some(0) {
                anyhow::bail!("--batch-size must be greater than 0");
            }
            encode_images(&config, &files, batch_size)
        }
    }
}
