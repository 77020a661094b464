use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

mod annotate;
mod cli;
mod config;
mod gallery;
mod scanner;
mod search;
mod semantic;
mod session;
mod store;
#[cfg(test)]
mod tests;
mod web;

use annotate::OllamaCaptioner;
use config::Config;
use semantic::{Embedder, EmbeddingModel};
use session::Session;

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    let base_path = config::base_path()?;
    let config = Config::load_with(&base_path);

    match args.command {
        cli::Command::Daemon {} => {
            web::start_daemon(config, base_path);
            Ok(())
        }

        cli::Command::Scan { folder } => {
            let embedder = build_embedder(&config, &base_path)?;
            let (session, snapshot) =
                Session::open(folder, embedder, config.semantic.distance_threshold)?;

            println!(
                "{} images tracked, {} indexed",
                snapshot.len(),
                session.indexed_count()
            );
            Ok(())
        }

        cli::Command::Annotate { folder, path } => {
            let embedder = build_embedder(&config, &base_path)?;
            let (mut session, _) =
                Session::open(folder, embedder, config.semantic.distance_threshold)?;

            let captioner = OllamaCaptioner::new(&config.captioner)?;
            let record = session.annotate_image(&path, &captioner)?;

            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }

        cli::Command::Search {
            folder,
            query,
            count,
        } => {
            let embedder = build_embedder(&config, &base_path)?;
            let (session, _) =
                Session::open(folder, embedder, config.semantic.distance_threshold)?;

            let hits = session.search(query.as_deref().unwrap_or(""))?;

            if count {
                println!("{} images found", hits.len());
                return Ok(());
            }

            println!("{}", serde_json::to_string_pretty(&hits)?);
            Ok(())
        }
    }
}

fn build_embedder(config: &Config, base_path: &str) -> anyhow::Result<Arc<dyn Embedder>> {
    let timeout = Duration::from_secs(config.semantic.download_timeout_secs);
    let model = EmbeddingModel::new(
        &config.semantic.model,
        PathBuf::from(base_path),
        Some(timeout),
    )?;
    Ok(Arc::new(model))
}
