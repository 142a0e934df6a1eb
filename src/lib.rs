pub mod cache;
pub mod config;
pub mod cooccurrence;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod pipeline;
pub mod plot;
pub mod projection;
pub mod reduce;
pub mod vocab;

pub use cache::{Cache, CacheKeyPolicy};
pub use config::{files_handling, Cli, Config, Method, Params};
pub use cooccurrence::CooccurrenceMatrix;
pub use corpus::{load_corpus, Corpus, Dataset, EmptyTokenPolicy, Post, SentinelTokenizer, Tokenizer};
pub use embedding::Embeddings;
pub use error::{Error, Result};
pub use pipeline::Pipeline;
pub use projection::{AxisExtremes, Projector};
pub use reduce::{normalize_rows, DegeneratePolicy, SolverKind, SvdSolver, TruncatedSvd};
pub use vocab::Vocabulary;
