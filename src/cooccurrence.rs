
// imports
use crate::corpus::Corpus;
use crate::error::{Error, Result};
use crate::vocab::Vocabulary;

use ndarray::{s, Array2, Axis};
use rayon::{prelude::*, ThreadPoolBuilder};
use std::ops::Range;
use std::time::Instant;
use tracing::{debug, info};


pub const DEFAULT_WINDOW_SIZE: usize = 4;


/// Symmetric token co-occurrence counts together with the vocabulary that
/// indexes its rows and columns and the window they were counted with.
#[derive(Clone, Debug, PartialEq)]
pub struct CooccurrenceMatrix {
    vocab: Vocabulary,
    counts: Array2<f32>,
    window_size: usize,
}

impl CooccurrenceMatrix {

    /// Counts, for every token occurrence, the tokens up to `window_size`
    /// positions before and after it within the same document.
    ///
    /// Every occurrence is visited as a center, so a pair at distance `d <= w`
    /// is counted once from each side and the matrix comes out symmetric.
    pub fn build(corpus: &Corpus, window_size: usize, num_threads: usize) -> Result<CooccurrenceMatrix> {

        if window_size == 0 {
            return Err(Error::InvalidConfig("window size must be at least 1".to_string()));
        }

        let timer = Instant::now();
        let vocab = Vocabulary::from_corpus(corpus);
        let sequences = CooccurrenceMatrix::index_sequences(corpus, &vocab);
        let n = vocab.len();
        info!("counting co-occurrences of {} tokens over {} documents, window {}", n, corpus.len(), window_size);

        // counting is done in bands of center rows, each band owned by one worker.
        // every worker scans the whole corpus but only increments its own rows,
        // so the bands can be stitched back together without any merging.
        let num_threads = num_threads.max(1);
        let band_size = n.div_ceil(num_threads).max(1);
        let slices: Vec<Range<usize>> = (0..n).step_by(band_size).map(|i| i..(i + band_size).min(n)).collect();

        let pool = ThreadPoolBuilder::new().num_threads(num_threads).build()?;
        let bands: Vec<Array2<f32>> = pool.install(|| {
            slices
                .par_iter()
                .map(|slice| CooccurrenceMatrix::count(window_size, &sequences, slice, n))
                .collect()
        });

        let mut counts: Array2<f32> = Array2::zeros((n, n));
        for (slice, band) in slices.iter().zip(bands) {
            counts.slice_mut(s![slice.clone(), ..]).assign(&band);
        }

        info!("finished counting, took {} seconds", timer.elapsed().as_secs());
        Ok(Self { vocab, counts, window_size })
    }

    /// Bundles cached parts, checking that they describe the same vocabulary.
    pub fn from_parts(vocab: Vocabulary, counts: Array2<f32>, window_size: usize) -> Result<CooccurrenceMatrix> {
        let n = vocab.len();
        if counts.dim() != (n, n) {
            return Err(Error::CacheMismatch(format!(
                "matrix is {:?} but the vocabulary has {} tokens",
                counts.dim(),
                n
            )));
        }
        Ok(Self { vocab, counts, window_size })
    }

    fn index_sequences(corpus: &Corpus, vocab: &Vocabulary) -> Vec<Vec<usize>> {
        // every corpus token is in the vocabulary built from that corpus
        corpus
            .documents()
            .iter()
            .map(|doc| doc.iter().filter_map(|tok| vocab.index_of(tok)).collect())
            .collect()
    }

    /// Counts the rows in `slice`, returns a `(slice.len(), n)` band.
    fn count(window_size: usize, sequences: &[Vec<usize>], slice: &Range<usize>, n: usize) -> Array2<f32> {

        let mut band: Array2<f32> = Array2::zeros((slice.len(), n));

        for sequence in sequences {

            let len = sequence.len();
            for (i, &token_i) in sequence.iter().enumerate() {

                if !slice.contains(&token_i) {
                    continue;
                }

                // windows shrink at the document edges, they never wrap or pad
                let first = i.saturating_sub(window_size);
                let last = (i + window_size).min(len - 1);
                let mut row = band.row_mut(token_i - slice.start);
                for (j, &context_j) in sequence.iter().enumerate().take(last + 1).skip(first) {
                    if j != i {
                        row[context_j] += 1.0;
                    }
                }
            }
        }

        debug!("counted rows {:?}", slice);
        band
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn counts(&self) -> &Array2<f32> {
        &self.counts
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Count of `context` within the windows of `center`, `None` for unknown tokens.
    pub fn count_of(&self, center: &str, context: &str) -> Option<f32> {
        let i = self.vocab.index_of(center)?;
        let j = self.vocab.index_of(context)?;
        Some(self.counts[[i, j]])
    }

    pub fn is_symmetric(&self) -> bool {
        self.counts == self.counts.t()
    }

    /// Total number of counted (center, context) pairs.
    pub fn total(&self) -> f32 {
        self.counts.sum_axis(Axis(1)).sum()
    }

    pub fn into_parts(self) -> (Vocabulary, Array2<f32>) {
        (self.vocab, self.counts)
    }
}
