
// imports
use crate::config::files_handling::{artifact_path, read_input, save_output};
use crate::cooccurrence::CooccurrenceMatrix;
use crate::corpus::{load_corpus, Corpus, Dataset, SentinelTokenizer};
use crate::error::{Error, Result};
use crate::vocab::Vocabulary;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};


/// Bumped whenever tokenization or counting changes meaning, so content keys
/// computed by older builds stop matching.
pub const ALGORITHM_VERSION: &str = "1";

const KEY_LEN: usize = 16;


#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CacheKeyPolicy {
    /// key artifacts by a hash of everything they were computed from
    #[default]
    Content,
    /// key artifacts by sample count only; a present artifact is trusted even
    /// if the dataset or the window size changed since it was written
    SampleCount,
}


/// Stored next to a cached matrix: the parameters the counts were built with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixMeta {
    pub window_size: usize,
}


/// File-backed memoization of the corpus and co-occurrence stages.
#[derive(Clone, Debug)]
pub struct Cache {
    dir: PathBuf,
    policy: CacheKeyPolicy,
}

impl Cache {

    pub fn new(dir: impl Into<PathBuf>, policy: CacheKeyPolicy) -> Cache {
        Self { dir: dir.into(), policy }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Tokenized corpus for the first `sample_count` posts of `dataset_file`,
    /// read from the cache when present.
    pub fn corpus(&self, dataset_file: &Path, sample_count: Option<usize>, tokenizer: &SentinelTokenizer) -> Result<Corpus> {

        let samples = sample_label(sample_count);
        let (name, bytes) = match self.policy {
            CacheKeyPolicy::SampleCount => (format!("corpus-{}", samples), None),
            CacheKeyPolicy::Content => {
                let bytes = fs::read(dataset_file).map_err(|e| Error::io(dataset_file, e))?;
                let key = content_key(&[
                    bytes.as_slice(),
                    samples.as_bytes(),
                    tokenizer.start.as_bytes(),
                    tokenizer.end.as_bytes(),
                    format!("{:?}", tokenizer.empty_tokens).as_bytes(),
                    ALGORITHM_VERSION.as_bytes(),
                ]);
                (format!("corpus-{}-{}", samples, key), Some(bytes))
            }
        };

        let path = artifact_path::<Corpus>(&self.dir, &name);
        if path.exists() {
            debug!("corpus cache hit {}", path.display());
            if self.policy == CacheKeyPolicy::SampleCount {
                warn!("using {} without checking it against {}", path.display(), dataset_file.display());
            }
            return read_input(&self.dir, &name);
        }

        debug!("corpus cache miss {}", path.display());
        let dataset = match bytes {
            Some(bytes) => Dataset::from_slice(&bytes).map_err(|e| match e {
                Error::Json { source, .. } => Error::json(dataset_file, source),
                other => other,
            })?,
            None => Dataset::from_file(dataset_file)?,
        };
        let corpus = load_corpus(&dataset, sample_count, tokenizer);
        save_output(&self.dir, &name, &corpus)?;
        info!("tokenized {} documents ({} tokens), saved {}", corpus.len(), corpus.total_tokens(), path.display());
        Ok(corpus)
    }

    /// Co-occurrence matrix of `corpus`, read from the cache when the matrix,
    /// its vocabulary and its window record are all present. A cached matrix
    /// keeps the window it was counted with, which can differ from
    /// `window_size` under sample-count keys.
    pub fn matrix(&self, corpus: &Corpus, sample_count: Option<usize>, window_size: usize, num_threads: usize) -> Result<CooccurrenceMatrix> {

        let key = match self.policy {
            CacheKeyPolicy::SampleCount => sample_label(sample_count),
            CacheKeyPolicy::Content => {
                let corpus_json = serde_json::to_vec(corpus).map_err(|e| Error::json(&self.dir, e))?;
                content_key(&[
                    corpus_json.as_slice(),
                    window_size.to_string().as_bytes(),
                    ALGORITHM_VERSION.as_bytes(),
                ])
            }
        };
        let cooc_name = format!("cooc-{}", key);
        let words_name = format!("words-{}", key);
        let meta_name = format!("meta-{}", key);

        let cooc_path = artifact_path::<Array2<f32>>(&self.dir, &cooc_name);
        let words_path = artifact_path::<Vocabulary>(&self.dir, &words_name);
        let meta_path = artifact_path::<MatrixMeta>(&self.dir, &meta_name);
        if cooc_path.exists() && words_path.exists() && meta_path.exists() {
            debug!("matrix cache hit {}", cooc_path.display());
            let meta: MatrixMeta = read_input(&self.dir, &meta_name)?;
            if meta.window_size != window_size {
                warn!(
                    "{} was counted with window {}, not the requested {}; using it as is",
                    cooc_path.display(), meta.window_size, window_size
                );
            }
            let counts: Array2<f32> = read_input(&self.dir, &cooc_name)?;
            let vocab: Vocabulary = read_input(&self.dir, &words_name)?;
            return CooccurrenceMatrix::from_parts(vocab, counts, meta.window_size);
        }
        if cooc_path.exists() && !meta_path.exists() {
            info!("{} has no window record, counting again", cooc_path.display());
        }

        debug!("matrix cache miss {}", cooc_path.display());
        let matrix = CooccurrenceMatrix::build(corpus, window_size, num_threads)?;
        // the matrix is written last: a crash in between leaves no usable set behind
        save_output(&self.dir, &words_name, matrix.vocabulary())?;
        save_output(&self.dir, &meta_name, &MatrixMeta { window_size: matrix.window_size() })?;
        save_output(&self.dir, &cooc_name, matrix.counts())?;
        info!("saved {} and {}", cooc_path.display(), words_path.display());
        Ok(matrix)
    }
}

fn sample_label(sample_count: Option<usize>) -> String {
    match sample_count {
        Some(n) => n.to_string(),
        None => "all".to_string(),
    }
}

/// Hex prefix of the sha-256 over the length-prefixed parts.
pub fn content_key(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    let mut key = format!("{:x}", hasher.finalize());
    key.truncate(KEY_LEN);
    key
}


#[cfg(test)]
mod tests {

    use super::*;
    use std::io::Write;

    const DATASET: &str = r#"{"post": {
        "1": {"title": "i love", "body": "you"},
        "2": {"title": "you love", "body": "me"}
    }}"#;

    fn write_dataset(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("output.json");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn content_keys_separate_parts() {
        assert_ne!(
            content_key(&[b"ab".as_slice(), b"c".as_slice()]),
            content_key(&[b"a".as_slice(), b"bc".as_slice()])
        );
        assert_eq!(content_key(&[b"x".as_slice()]).len(), KEY_LEN);
    }

    #[test]
    fn corpus_is_memoized() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_dataset(dir.path(), DATASET);
        let cache = Cache::new(dir.path().join("cache"), CacheKeyPolicy::Content);
        let tokenizer = SentinelTokenizer::default();

        let first = cache.corpus(&dataset, Some(2), &tokenizer).unwrap();
        assert_eq!(first.documents()[0], vec!["[START]", "i", "love", "you", "[END]"]);
        assert_eq!(fs::read_dir(cache.dir()).unwrap().count(), 1);

        let second = cache.corpus(&dataset, Some(2), &tokenizer).unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read_dir(cache.dir()).unwrap().count(), 1);
    }

    #[test]
    fn content_keys_follow_the_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_dataset(dir.path(), DATASET);
        let cache = Cache::new(dir.path().join("cache"), CacheKeyPolicy::Content);
        let tokenizer = SentinelTokenizer::default();

        cache.corpus(&dataset, None, &tokenizer).unwrap();
        write_dataset(dir.path(), r#"{"post": {"1": {"title": "changed", "body": "text"}}}"#);
        let fresh = cache.corpus(&dataset, None, &tokenizer).unwrap();

        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh.documents()[0][1], "changed");
    }

    #[test]
    fn sample_count_keys_trust_stale_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_dataset(dir.path(), DATASET);
        let cache = Cache::new(dir.path().join("cache"), CacheKeyPolicy::SampleCount);
        let tokenizer = SentinelTokenizer::default();

        let before = cache.corpus(&dataset, Some(1), &tokenizer).unwrap();
        write_dataset(dir.path(), r#"{"post": {"1": {"title": "changed", "body": "text"}}}"#);
        let after = cache.corpus(&dataset, Some(1), &tokenizer).unwrap();

        assert_eq!(before, after);
        assert!(cache.dir().join("corpus-1.json").exists());
    }

    #[test]
    fn matrix_round_trips_through_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_dataset(dir.path(), DATASET);
        let cache = Cache::new(dir.path().join("cache"), CacheKeyPolicy::Content);
        let corpus = cache.corpus(&dataset, None, &SentinelTokenizer::default()).unwrap();

        let built = cache.matrix(&corpus, None, 4, 2).unwrap();
        let loaded = cache.matrix(&corpus, None, 4, 2).unwrap();
        assert_eq!(built, loaded);
        assert_eq!(loaded.count_of("love", "you"), Some(2.0));

        // a different window is a different artifact
        let narrow = cache.matrix(&corpus, None, 1, 2).unwrap();
        assert_eq!(narrow.count_of("[START]", "[END]"), Some(0.0));
        assert_eq!(narrow.window_size(), 1);
    }

    #[test]
    fn sample_count_matrices_keep_their_window() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_dataset(dir.path(), DATASET);
        let cache = Cache::new(dir.path().join("cache"), CacheKeyPolicy::SampleCount);
        let corpus = cache.corpus(&dataset, None, &SentinelTokenizer::default()).unwrap();

        let built = cache.matrix(&corpus, None, 4, 2).unwrap();
        assert_eq!(built.count_of("[START]", "[END]"), Some(2.0));
        let meta: MatrixMeta = read_input(cache.dir(), "meta-all").unwrap();
        assert_eq!(meta, MatrixMeta { window_size: 4 });

        // the stale artifact is reused but labelled with the window it was counted with
        let reused = cache.matrix(&corpus, None, 1, 2).unwrap();
        assert_eq!(reused.window_size(), 4);
        assert_eq!(reused.count_of("[START]", "[END]"), Some(2.0));
        assert_eq!(reused, built);
    }

    #[test]
    fn matrices_without_a_window_record_are_recounted() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_dataset(dir.path(), DATASET);
        let cache = Cache::new(dir.path().join("cache"), CacheKeyPolicy::SampleCount);
        let corpus = cache.corpus(&dataset, None, &SentinelTokenizer::default()).unwrap();

        cache.matrix(&corpus, None, 4, 2).unwrap();
        fs::remove_file(artifact_path::<MatrixMeta>(cache.dir(), "meta-all")).unwrap();

        let recounted = cache.matrix(&corpus, None, 1, 2).unwrap();
        assert_eq!(recounted.window_size(), 1);
        assert_eq!(recounted.count_of("[START]", "[END]"), Some(0.0));
        assert!(cache.dir().join("meta-all.json").exists());
    }

    #[test]
    fn missing_dataset_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path().join("cache"), CacheKeyPolicy::Content);
        let result = cache.corpus(&dir.path().join("nope.json"), None, &SentinelTokenizer::default());
        assert!(matches!(result, Err(Error::Io { .. })));
    }
}
