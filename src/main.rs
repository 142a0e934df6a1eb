use anyhow::Context;
use clap::Parser;
use love_embed::{Cli, Config, Pipeline};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

// builds embeddings for the configured model(s), then optionally exports
// and plots them. see `love-embed --help` for the parameters

fn main() -> anyhow::Result<()> {

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    info!("building parameters...");
    let params = Config::new(&cli).context("invalid parameters")?.get_params();

    let timer = Instant::now();
    let built = Pipeline::run(&params).context("building embeddings failed")?;
    for (method, embeddings) in &built {
        info!("{}: {} words x {} dimensions", method.label(), embeddings.vocabulary().len(), embeddings.dimensions());
    }
    info!("finished, took {} seconds", timer.elapsed().as_secs());
    Ok(())
}
