
// imports
use crate::config::files_handling::{read_json, write_atomic};
use crate::cooccurrence::CooccurrenceMatrix;
use crate::error::{Error, Result};
use crate::reduce::{normalize_rows, DegeneratePolicy, TruncatedSvd};
use crate::vocab::Vocabulary;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{Array1, Array2, ArrayView1};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::time::Instant;
use tracing::info;


/// Unit-length word vectors, row `i` belongs to vocabulary token `i`.
#[derive(Clone, Debug, PartialEq)]
pub struct Embeddings {
    vocab: Vocabulary,
    vectors: Array2<f32>,
    degenerate: BTreeMap<usize, f64>,
}

impl Embeddings {

    /// Reduces the co-occurrence counts to `svd.rank` dimensions and rescales every row.
    pub fn from_cooccurrence(matrix: &CooccurrenceMatrix, svd: &TruncatedSvd, policy: DegeneratePolicy) -> Result<Embeddings> {
        let counts = matrix.counts().mapv(f64::from);
        Embeddings::reduce(matrix.vocabulary().clone(), &counts, svd, policy)
    }

    /// Reduces arbitrary row vectors (one row per vocabulary token) and rescales every row.
    pub fn reduce(vocab: Vocabulary, m: &Array2<f64>, svd: &TruncatedSvd, policy: DegeneratePolicy) -> Result<Embeddings> {

        let timer = Instant::now();
        info!("running truncated svd over {} words, rank {}", m.nrows(), svd.rank);
        let reduced = svd.fit_transform(m)?;
        let (vectors, degenerate) = normalize_rows(reduced.view(), policy, |i| {
            vocab.token(i).unwrap_or_default().to_string()
        })?;
        info!("finished reduction, took {} seconds", timer.elapsed().as_secs());

        Ok(Self { vocab, vectors, degenerate })
    }

    /// Reads pretrained GloVe vectors (`token v1 .. vd` per line, optionally
    /// gzipped), keeping the first `limit` lines plus any later line whose token
    /// is in `required`. Rows come back in vocabulary order.
    pub fn read_glove(path: &Path, limit: Option<usize>, required: &[String]) -> Result<(Vocabulary, Array2<f64>)> {

        let f = File::open(path).map_err(|e| Error::io(path, e))?;
        let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
            Box::new(GzDecoder::new(f))
        } else {
            Box::new(f)
        };

        let required: HashSet<&str> = required.iter().map(String::as_str).collect();
        let mut rows: HashMap<String, Vec<f64>> = HashMap::new();
        let mut dim: Option<usize> = None;

        for (i, line) in BufReader::new(reader).lines().enumerate() {
            let line = line.map_err(|e| Error::io(path, e))?;
            let mut fields = line.split_whitespace();
            let token = match fields.next() {
                Some(token) => token,
                None => continue,
            };
            let within_limit = limit.map_or(true, |limit| i < limit);
            if !within_limit && !required.contains(token) {
                continue;
            }
            if rows.contains_key(token) {
                continue;
            }

            let values = fields
                .map(|x| x.parse::<f64>())
                .collect::<std::result::Result<Vec<f64>, _>>()
                .map_err(|e| Error::GloveFormat { line: i + 1, reason: e.to_string() })?;
            match dim {
                None => dim = Some(values.len()),
                Some(d) if d != values.len() => {
                    return Err(Error::GloveFormat {
                        line: i + 1,
                        reason: format!("expected {} values, found {}", d, values.len()),
                    })
                }
                Some(_) => {}
            }
            rows.insert(token.to_string(), values);
        }

        let dim = dim.unwrap_or(0);
        let vocab = Vocabulary::from_tokens(rows.keys().map(String::as_str));
        let mut m: Array2<f64> = Array2::zeros((vocab.len(), dim));
        for (token, values) in rows {
            // keys of `rows` are exactly the vocabulary
            if let Some(i) = vocab.index_of(&token) {
                m.row_mut(i).assign(&Array1::from(values));
            }
        }
        info!("loaded {} glove vectors of dimension {}", vocab.len(), dim);
        Ok((vocab, m))
    }

    /// Loads an export written by [`Embeddings::export`]; rows are renormalized.
    pub fn from_export(path: &Path) -> Result<Embeddings> {

        let raw: HashMap<String, Vec<f32>> = if path.extension().is_some_and(|ext| ext == "gz") {
            let f = File::open(path).map_err(|e| Error::io(path, e))?;
            serde_json::from_reader(BufReader::new(GzDecoder::new(f))).map_err(|e| Error::json(path, e))?
        } else {
            read_json(path)?
        };

        let vocab = Vocabulary::from_tokens(raw.keys().map(String::as_str));
        let dim = raw.values().next().map_or(0, Vec::len);
        let mut m: Array2<f64> = Array2::zeros((vocab.len(), dim));
        for (token, values) in &raw {
            if values.len() != dim {
                return Err(Error::EmbeddingShape(format!(
                    "'{}' has {} values, expected {}",
                    token,
                    values.len(),
                    dim
                )));
            }
            if let Some(i) = vocab.index_of(token) {
                m.row_mut(i).assign(&Array1::from_iter(values.iter().map(|&x| f64::from(x))));
            }
        }

        let (vectors, degenerate) = normalize_rows(m.view(), DegeneratePolicy::Flag, |i| {
            vocab.token(i).unwrap_or_default().to_string()
        })?;
        Ok(Self { vocab, vectors, degenerate })
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn vectors(&self) -> &Array2<f32> {
        &self.vectors
    }

    pub fn dimensions(&self) -> usize {
        self.vectors.ncols()
    }

    /// Rows that were too close to zero to normalize, with their norm before normalization.
    pub fn degenerate(&self) -> &BTreeMap<usize, f64> {
        &self.degenerate
    }

    pub fn is_degenerate(&self, index: usize) -> bool {
        self.degenerate.contains_key(&index)
    }

    pub fn index_of(&self, token: &str) -> Result<usize> {
        let i = self.vocab.index_of(token).ok_or_else(|| Error::TokenNotFound(token.to_string()))?;
        if let Some(&norm) = self.degenerate.get(&i) {
            return Err(Error::DegenerateVector { token: token.to_string(), norm });
        }
        Ok(i)
    }

    pub fn vector(&self, token: &str) -> Result<ArrayView1<f32>> {
        let i = self.index_of(token)?;
        Ok(self.vectors.row(i))
    }

    /// The `k` tokens closest to `token` by cosine similarity, best first.
    pub fn most_similar(&self, token: &str, k: usize) -> Result<Vec<(String, f32)>> {

        let query = self.index_of(token)?;
        let scores = self.vectors.dot(&self.vectors.row(query));

        let mut indexed_scores: Vec<(usize, f32)> = scores
            .iter()
            .copied()
            .enumerate()
            .filter(|(i, _)| *i != query && !self.is_degenerate(*i))
            .collect();
        indexed_scores.sort_by(|(_, a), (_, b)| b.total_cmp(a));

        Ok(indexed_scores
            .into_iter()
            .take(k)
            .filter_map(|(i, score)| self.vocab.token(i).map(|t| (t.to_string(), score)))
            .collect())
    }

    /// Writes `{token: [f32; k]}` json, gzipped when the file name ends in `.gz`.
    /// Degenerate rows are left out.
    pub fn export(&self, path: &Path) -> Result<()> {

        let gzip = path.extension().is_some_and(|ext| ext == "gz");
        write_atomic(path, |writer| {
            let view = ExportView(self);
            if gzip {
                let mut encoder = GzEncoder::new(&mut *writer, Compression::default());
                serde_json::to_writer(&mut encoder, &view).map_err(|e| Error::json(path, e))?;
                encoder.finish().map_err(|e| Error::io(path, e))?.flush().map_err(|e| Error::io(path, e))
            } else {
                serde_json::to_writer(&mut *writer, &view).map_err(|e| Error::json(path, e))
            }
        })?;
        info!("exported {} embeddings to {}", self.vocab.len() - self.degenerate.len(), path.display());
        Ok(())
    }
}

struct ExportView<'a>(&'a Embeddings);

impl Serialize for ExportView<'_> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let embeddings = self.0;
        let mut map = serializer.serialize_map(Some(embeddings.vocab.len() - embeddings.degenerate.len()))?;
        for (i, token) in embeddings.vocab.iter() {
            if embeddings.is_degenerate(i) {
                continue;
            }
            let row: Vec<f32> = embeddings.vectors.row(i).to_vec();
            map.serialize_entry(token, &row)?;
        }
        map.end()
    }
}
