use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

mod app;
mod catalog;
mod cli;
mod config;
mod interactions;
mod lock;
mod recommend;
mod semantic;
#[cfg(test)]
mod tests;
mod web;

use config::Config;
use interactions::Action;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let config = Config::load_with(&app::base_path()?)?;

    match args.command {
        cli::Command::Daemon {} => {
            let app = app::App::load(config)?;
            web::start_daemon(app)
        }

        cli::Command::Recommend {
            user,
            count,
            genres,
        } => {
            let app = app::App::load(config)?;
            let recs = app.recommend(&user, count, genres.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&recs)?);
            Ok(())
        }

        cli::Command::Like { user, book } => {
            let app = app::App::load(config)?;
            let interaction = app.record(&user, book, Action::Like)?;
            println!("{}", serde_json::to_string_pretty(&interaction)?);
            Ok(())
        }

        cli::Command::Pass { user, book } => {
            let app = app::App::load(config)?;
            let interaction = app.record(&user, book, Action::Pass)?;
            println!("{}", serde_json::to_string_pretty(&interaction)?);
            Ok(())
        }

        cli::Command::History { user } => {
            let app = app::App::load(config)?;
            let history = app.history(&user)?;
            println!("{}", serde_json::to_string_pretty(&history)?);
            Ok(())
        }

        cli::Command::BuildIndex { catalog, output } => build_index(&config, catalog, output),
    }
}

fn build_index(
    config: &Config,
    catalog_path: Option<std::path::PathBuf>,
    output: Option<std::path::PathBuf>,
) -> anyhow::Result<()> {
    let catalog_path = catalog_path.unwrap_or_else(|| config.catalog_path());
    let output = output.unwrap_or_else(|| config.vectors_path());

    let catalog = catalog::Catalog::load(&catalog_path)
        .with_context(|| format!("failed to load {}", catalog_path.display()))?;
    log::info!("Loaded {} books from {}", catalog.len(), catalog_path.display());

    let model = semantic::EmbeddingModel::new(&config.embedding.model, config.base_path().to_path_buf())?;
    log::info!(
        "Embedding with {} ({} dimensions)",
        model.name(),
        model.dimensions()
    );

    let progress = ProgressBar::new(catalog.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let (index, report) =
        semantic::build_index(&catalog, &model, config.embedding.batch_size, &progress)?;
    progress.finish_and_clear();

    semantic::VectorStorage::new(output.clone()).save(&index, &model.model_id_hash())?;

    log::info!(
        "Wrote {} vectors to {} ({} books skipped without text)",
        report.embedded,
        output.display(),
        report.skipped
    );

    Ok(())
}
