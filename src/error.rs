use std::path::PathBuf;

use ndarray_npy::{ReadNpyError, WriteNpyError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed json in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot read matrix from {}: {source}", path.display())]
    NpyRead {
        path: PathBuf,
        #[source]
        source: ReadNpyError,
    },

    #[error("cannot write matrix to {}: {source}", path.display())]
    NpyWrite {
        path: PathBuf,
        #[source]
        source: WriteNpyError,
    },

    /// The dataset parsed as json but does not look like `{"post": {id: {title, body}}}`.
    #[error("unexpected dataset shape: {0}")]
    DatasetShape(String),

    #[error("invalid vocabulary: {0}")]
    VocabularyShape(String),

    /// Cached artifacts exist but disagree with each other.
    #[error("cached artifacts do not match: {0}")]
    CacheMismatch(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot reduce a {rows}x{cols} matrix to rank {rank}")]
    InvalidRank { rows: usize, cols: usize, rank: usize },

    #[error("{0} did not converge")]
    NoConvergence(&'static str),

    #[error("token '{0}' is not in the vocabulary")]
    TokenNotFound(String),

    #[error("no projection axis set, call set_axis first")]
    AxisNotSet,

    #[error("embedding of '{token}' is degenerate (norm {norm:e})")]
    DegenerateVector { token: String, norm: f64 },

    #[error("invalid embeddings: {0}")]
    EmbeddingShape(String),

    #[error("glove file line {line}: {reason}")]
    GloveFormat { line: usize, reason: String },

    #[error("plotting failed: {0}")]
    Plot(String),

    #[error("cannot start counting threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Error::Json { path: path.into(), source }
    }
}
