pub mod files_handling;

use crate::cache::CacheKeyPolicy;
use crate::corpus::{EmptyTokenPolicy, SentinelTokenizer, END_TOKEN, START_TOKEN};
use crate::cooccurrence::DEFAULT_WINDOW_SIZE;
use crate::error::{Error, Result};
use crate::plot::TwoDimProjection;
use crate::reduce::{DegeneratePolicy, SolverKind, SvdSolver, TruncatedSvd, DEFAULT_N_ITER};

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::PathBuf;

pub const DEFAULT_SAMPLE_COUNT: usize = 150;

/// Which embeddings a run produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    /// reduced co-occurrence counts of the dataset
    #[default]
    CoOccurrence,
    /// reduced pretrained GloVe vectors
    Glove,
    Both,
}

impl Method {
    pub fn label(&self) -> &'static str {
        match self {
            Method::CoOccurrence => "co-occurrence",
            Method::Glove => "glove",
            Method::Both => "both",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Params {
    pub dataset_file: PathBuf,
    pub cache_dir: PathBuf,
    pub model: Method,
    /// `None` reads every post of the dataset
    pub sample_count: Option<usize>,
    pub window_size: usize,
    pub dimensions: usize,
    pub solver: SolverKind,
    pub n_iter: usize,
    pub seed: u64,
    pub cache_key: CacheKeyPolicy,
    pub empty_tokens: EmptyTokenPolicy,
    pub start_token: String,
    pub end_token: String,
    pub degenerate: DegeneratePolicy,
    pub num_threads: usize,
    pub test_plot: bool,
    pub plot_dir: PathBuf,
    pub plot_projection: TwoDimProjection,
    pub save: bool,
    pub output_file: PathBuf,
    pub glove_file: Option<PathBuf>,
    pub glove_limit: Option<usize>,
    pub test_words: Vec<String>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            dataset_file: PathBuf::from("output.json"),
            cache_dir: PathBuf::from("cache"),
            model: Method::default(),
            sample_count: Some(DEFAULT_SAMPLE_COUNT),
            window_size: DEFAULT_WINDOW_SIZE,
            dimensions: 2,
            solver: SolverKind::default(),
            n_iter: DEFAULT_N_ITER,
            seed: 0,
            cache_key: CacheKeyPolicy::default(),
            empty_tokens: EmptyTokenPolicy::default(),
            start_token: START_TOKEN.to_string(),
            end_token: END_TOKEN.to_string(),
            degenerate: DegeneratePolicy::default(),
            num_threads: 4,
            test_plot: false,
            plot_dir: PathBuf::from("plots"),
            plot_projection: TwoDimProjection::default(),
            save: false,
            output_file: PathBuf::from("embeddings.json"),
            glove_file: None,
            glove_limit: None,
            test_words: ["movie", "book", "love", "story", "hate", "good", "interesting", "sorry", "silly", "bad"]
                .iter()
                .map(|w| w.to_string())
                .collect(),
        }
    }
}

impl Display for Params {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let samples = match self.sample_count {
            Some(n) => n.to_string(),
            None => "all".to_string(),
        };
        write!(f, "using hyper-params:
        dataset_file: {}
        cache_dir: {}
        model: {}
        sample_count: {}
        window_size: {}
        dimensions: {}
        solver: {:?} (n_iter {}, seed {})
        cache_key: {:?}
        empty_tokens: {:?}
        sentinels: {} {}
        degenerate: {:?}
        num_threads: {}
        test_plot: {} ({:?} to {})
        save: {} ({})
        glove_file: {:?} (limit {:?})
        test_words: {}",
        self.dataset_file.display(), self.cache_dir.display(), self.model.label(), samples, self.window_size,
        self.dimensions, self.solver, self.n_iter, self.seed, self.cache_key, self.empty_tokens,
        self.start_token, self.end_token, self.degenerate, self.num_threads,
        self.test_plot, self.plot_projection, self.plot_dir.display(), self.save, self.output_file.display(),
        self.glove_file, self.glove_limit, self.test_words.join(","))
    }
}

impl Params {

    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(Error::InvalidConfig("window_size must be at least 1".to_string()));
        }
        if self.dimensions == 0 {
            return Err(Error::InvalidConfig("dimensions must be at least 1".to_string()));
        }
        if self.num_threads == 0 {
            return Err(Error::InvalidConfig("num_threads must be at least 1".to_string()));
        }
        if self.sample_count == Some(0) {
            return Err(Error::InvalidConfig("sample_count must be at least 1, or unset for all posts".to_string()));
        }
        if self.start_token.is_empty() || self.end_token.is_empty() {
            return Err(Error::InvalidConfig("sentinel tokens cannot be empty".to_string()));
        }
        if matches!(self.model, Method::Glove | Method::Both) && self.glove_file.is_none() {
            return Err(Error::InvalidConfig(format!("model {} needs a glove_file", self.model.label())));
        }
        Ok(())
    }

    pub fn tokenizer(&self) -> SentinelTokenizer {
        SentinelTokenizer {
            start: self.start_token.clone(),
            end: self.end_token.clone(),
            empty_tokens: self.empty_tokens,
        }
    }

    pub fn reducer(&self) -> TruncatedSvd {
        let solver = match self.solver {
            SolverKind::Randomized => SvdSolver::Randomized { n_iter: self.n_iter },
            SolverKind::Exact => SvdSolver::Exact,
        };
        TruncatedSvd::new(self.dimensions).with_solver(solver).with_seed(self.seed)
    }
}

/// Builds word embeddings from a json dump of posts.
#[derive(Debug, Default, Parser)]
#[command(name = "love-embed", version, about)]
pub struct Cli {
    /// json file with any subset of the parameters, flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub dataset: Option<PathBuf>,

    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    #[arg(short, long, value_enum)]
    pub model: Option<Method>,

    /// number of posts to read, from the start of the dataset
    #[arg(long, conflicts_with = "all_samples")]
    pub samples: Option<usize>,

    #[arg(long)]
    pub all_samples: bool,

    #[arg(long)]
    pub window: Option<usize>,

    #[arg(short = 'k', long)]
    pub dimensions: Option<usize>,

    #[arg(long, value_enum)]
    pub solver: Option<SolverKind>,

    #[arg(long)]
    pub n_iter: Option<usize>,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, value_enum)]
    pub cache_key: Option<CacheKeyPolicy>,

    #[arg(long, value_enum)]
    pub empty_tokens: Option<EmptyTokenPolicy>,

    /// fail on zero-norm embeddings instead of flagging them
    #[arg(long)]
    pub strict_normalize: bool,

    #[arg(long)]
    pub threads: Option<usize>,

    /// plot the test words after building
    #[arg(long)]
    pub test_plot: bool,

    #[arg(long)]
    pub plot_dir: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub plot_projection: Option<TwoDimProjection>,

    /// export the embeddings as json
    #[arg(long)]
    pub save: bool,

    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// pretrained vectors in GloVe text format, optionally gzipped
    #[arg(long)]
    pub glove: Option<PathBuf>,

    #[arg(long)]
    pub glove_limit: Option<usize>,

    #[arg(long, value_delimiter = ',')]
    pub test_words: Option<Vec<String>>,
}

pub struct Config {
    params: Params,
}

impl Config {

    pub fn get_params(&self) -> Params {
        self.params.clone()
    }

    /// Defaults, then the `--config` json file, then the flags.
    pub fn new(cli: &Cli) -> Result<Config> {

        let mut params = match &cli.config {
            Some(path) => files_handling::read_json::<Params>(path)?,
            None => Params::default(),
        };

        if let Some(dataset) = &cli.dataset {
            params.dataset_file = dataset.clone();
        }
        if let Some(cache_dir) = &cli.cache_dir {
            params.cache_dir = cache_dir.clone();
        }
        if let Some(model) = cli.model {
            params.model = model;
        }
        if cli.all_samples {
            params.sample_count = None;
        } else if let Some(samples) = cli.samples {
            params.sample_count = Some(samples);
        }
        if let Some(window) = cli.window {
            params.window_size = window;
        }
        if let Some(dimensions) = cli.dimensions {
            params.dimensions = dimensions;
        }
        if let Some(solver) = cli.solver {
            params.solver = solver;
        }
        if let Some(n_iter) = cli.n_iter {
            params.n_iter = n_iter;
        }
        if let Some(seed) = cli.seed {
            params.seed = seed;
        }
        if let Some(cache_key) = cli.cache_key {
            params.cache_key = cache_key;
        }
        if let Some(empty_tokens) = cli.empty_tokens {
            params.empty_tokens = empty_tokens;
        }
        if cli.strict_normalize {
            params.degenerate = DegeneratePolicy::Fail;
        }
        if let Some(threads) = cli.threads {
            params.num_threads = threads;
        }
        if cli.test_plot {
            params.test_plot = true;
        }
        if let Some(plot_dir) = &cli.plot_dir {
            params.plot_dir = plot_dir.clone();
        }
        if let Some(plot_projection) = cli.plot_projection {
            params.plot_projection = plot_projection;
        }
        if cli.save {
            params.save = true;
        }
        if let Some(output) = &cli.output {
            params.output_file = output.clone();
        }
        if let Some(glove) = &cli.glove {
            params.glove_file = Some(glove.clone());
        }
        if let Some(limit) = cli.glove_limit {
            params.glove_limit = Some(limit);
        }
        if let Some(words) = &cli.test_words {
            params.test_words = words.clone();
        }

        params.validate()?;
        Ok(Self { params })
    }
}
