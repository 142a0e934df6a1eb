use anyhow::Context;
use clap::Parser;
use love_embed::plot::draw_projections;
use love_embed::{Embeddings, Params, Pipeline, Projector, SolverKind};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;


// projects words onto the axis between two reference words, e.g.
// love-project --axis love hate --words you me story --top 10 --plot axis.svg
// treated as binary executable so it can be ran independently from main

/// Projects words onto the direction between two reference words.
#[derive(Debug, Parser)]
#[command(name = "love-project", version, about)]
struct Args {
    /// the two words spanning the axis, the first one is the positive end
    #[arg(long, num_args = 2, value_names = ["WORD1", "WORD2"], required = true)]
    axis: Vec<String>,

    /// words to project, comma separated
    #[arg(long, value_delimiter = ',', required = true)]
    words: Vec<String>,

    /// also list the n vocabulary words leaning most towards each end
    #[arg(long)]
    top: Option<usize>,

    /// draw the projections to this svg file
    #[arg(long)]
    plot: Option<PathBuf>,

    /// read embeddings exported by love-embed instead of building them
    #[arg(long, conflicts_with_all = ["dataset", "samples", "dimensions"])]
    embeddings: Option<PathBuf>,

    #[arg(long)]
    dataset: Option<PathBuf>,

    #[arg(long, default_value = "cache")]
    cache_dir: PathBuf,

    /// number of posts to read, all of them when missing
    #[arg(long)]
    samples: Option<usize>,

    #[arg(short = 'k', long, default_value_t = 100)]
    dimensions: usize,

    #[arg(long, default_value_t = 4)]
    window: usize,

    #[arg(long, value_enum, default_value_t = SolverKind::Randomized)]
    solver: SolverKind,

    #[arg(long, default_value_t = 4)]
    threads: usize,
}

fn main() -> anyhow::Result<()> {

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let embeddings = load_embeddings(&args)?;
    info!("loaded {} words x {} dimensions", embeddings.vocabulary().len(), embeddings.dimensions());

    let mut projector = Projector::new(embeddings);
    let (word1, word2) = (&args.axis[0], &args.axis[1]);
    projector.set_axis(word1, word2).context("cannot set the projection axis")?;

    let projections = projector.project_words(&args.words, true).context("cannot project words")?;
    let (first_end, second_end) = projector.endpoints()?;
    println!("axis: {} ({}) <-> {} ({})", word1, first_end, word2, second_end);
    for (word, value) in args.words.iter().zip(projections.iter()) {
        println!("{} = {}", word, value);
    }

    if let Some(n) = args.top {
        let extremes = projector.extremes(n)?;
        println!("\ntowards {}:", word1);
        for (i, (token, score)) in extremes.toward_first.iter().enumerate() {
            println!("{} : {} = {}", i, token, score);
        }
        println!("\ntowards {}:", word2);
        for (i, (token, score)) in extremes.toward_second.iter().enumerate() {
            println!("{} : {} = {}", i, token, score);
        }
    }

    if let Some(path) = &args.plot {
        draw_projections(&projector, path).with_context(|| format!("cannot plot to {}", path.display()))?;
    }
    Ok(())
}

fn load_embeddings(args: &Args) -> anyhow::Result<Embeddings> {

    if let Some(path) = &args.embeddings {
        return Embeddings::from_export(path).with_context(|| format!("cannot load embeddings from {}", path.display()));
    }

    let defaults = Params::default();
    let params = Params {
        dataset_file: args.dataset.clone().unwrap_or(defaults.dataset_file.clone()),
        cache_dir: args.cache_dir.clone(),
        sample_count: args.samples,
        dimensions: args.dimensions,
        window_size: args.window,
        solver: args.solver,
        num_threads: args.threads,
        ..defaults
    };
    params.validate()?;
    Pipeline::co_occurrence(&params).context("cannot build co-occurrence embeddings")
}
