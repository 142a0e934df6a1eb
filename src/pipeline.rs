
// imports
use crate::cache::Cache;
use crate::config::{Method, Params};
use crate::embedding::Embeddings;
use crate::error::{Error, Result};
use crate::plot::draw_tokens_2d;

use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

const SIMILAR_WORDS: usize = 5;

pub struct Pipeline {}

impl Pipeline {

    // runs the main procedure -
    // -> tokenizing the dataset (cached)
    // -> co-occurrence counting (cached)
    // -> reduction and normalization
    // and the same reduction over pretrained GloVe vectors when asked for

    pub fn run(params: &Params) -> Result<Vec<(Method, Embeddings)>> {

        params.validate()?;
        info!("{}", params);

        let mut built = Vec::new();
        if matches!(params.model, Method::CoOccurrence | Method::Both) {
            built.push((Method::CoOccurrence, Pipeline::co_occurrence(params)?));
        }
        if matches!(params.model, Method::Glove | Method::Both) {
            built.push((Method::Glove, Pipeline::glove(params)?));
        }

        for (method, embeddings) in &built {
            Pipeline::report(params, *method, embeddings)?;
        }
        Ok(built)
    }

    pub fn co_occurrence(params: &Params) -> Result<Embeddings> {

        let cache = Cache::new(&params.cache_dir, params.cache_key);

        let timer = Instant::now();
        info!("loading corpus from {}...", params.dataset_file.display());
        let corpus = cache.corpus(&params.dataset_file, params.sample_count, &params.tokenizer())?;
        info!("corpus ready, {} documents, took {} seconds", corpus.len(), timer.elapsed().as_secs());

        let timer = Instant::now();
        info!("counting co-occurrences, window {}...", params.window_size);
        let matrix = cache.matrix(&corpus, params.sample_count, params.window_size, params.num_threads)?;
        info!("co-occurrence matrix ready, {} words, took {} seconds", matrix.vocabulary().len(), timer.elapsed().as_secs());

        let embeddings = Embeddings::from_cooccurrence(&matrix, &params.reducer(), params.degenerate)?;
        Pipeline::warn_degenerate(&embeddings);
        Ok(embeddings)
    }

    pub fn glove(params: &Params) -> Result<Embeddings> {

        let path = params
            .glove_file
            .as_deref()
            .ok_or_else(|| Error::InvalidConfig("no glove_file given".to_string()))?;

        let timer = Instant::now();
        info!("reading pretrained vectors from {}...", path.display());
        let (vocab, vectors) = Embeddings::read_glove(path, params.glove_limit, &params.test_words)?;
        info!("read {} vectors of {} dimensions, took {} seconds", vocab.len(), vectors.ncols(), timer.elapsed().as_secs());

        let embeddings = Embeddings::reduce(vocab, &vectors, &params.reducer(), params.degenerate)?;
        Pipeline::warn_degenerate(&embeddings);
        Ok(embeddings)
    }

    fn warn_degenerate(embeddings: &Embeddings) {
        if !embeddings.degenerate().is_empty() {
            let tokens: Vec<&str> = embeddings
                .degenerate()
                .keys()
                .filter_map(|i| embeddings.vocabulary().token(*i))
                .collect();
            warn!("{} words have (near) zero-norm embeddings and are excluded from lookups: {:?}", tokens.len(), tokens);
        }
    }

    fn report(params: &Params, method: Method, embeddings: &Embeddings) -> Result<()> {

        for word in &params.test_words {
            match embeddings.most_similar(word, SIMILAR_WORDS) {
                Ok(similar) => info!("[{}] closest to '{}': {:?}", method.label(), word, similar),
                Err(e) => info!("[{}] {}", method.label(), e),
            }
        }

        if params.save {
            let path = Pipeline::output_path(params, method);
            embeddings.export(&path)?;
        }

        if params.test_plot {
            let path = params.plot_dir.join(format!("{}-{}d.svg", method.label(), embeddings.dimensions()));
            std::fs::create_dir_all(&params.plot_dir).map_err(|e| Error::io(&params.plot_dir, e))?;
            draw_tokens_2d(embeddings, &params.test_words, params.plot_projection, &path)?;
        }
        Ok(())
    }

    /// `output_file` as given, glove exports of a run building both get a
    /// `glove-` file name prefix.
    pub fn output_path(params: &Params, method: Method) -> PathBuf {
        let output = &params.output_file;
        if params.model != Method::Both || method != Method::Glove {
            return output.clone();
        }
        let file_name = output
            .file_name()
            .map(|name| format!("glove-{}", name.to_string_lossy()))
            .unwrap_or_else(|| "glove-embeddings.json".to_string());
        output.parent().unwrap_or_else(|| Path::new("")).join(file_name)
    }
}
