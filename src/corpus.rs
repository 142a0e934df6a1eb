
// imports
use crate::error::{Error, Result};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::warn;


pub const START_TOKEN: &str = "[START]";
pub const END_TOKEN: &str = "[END]";

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w]").expect("static regex"));


#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub body: String,
}

/// Posts of the scraped dataset, in file order.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    posts: Vec<Post>,
}

impl Dataset {

    pub fn from_file(path: &Path) -> Result<Dataset> {
        let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
        Dataset::from_slice(&bytes).map_err(|e| match e {
            Error::Json { source, .. } => Error::json(path, source),
            other => other,
        })
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Dataset> {
        let json: Value = serde_json::from_slice(bytes).map_err(|e| Error::json("<dataset>", e))?;
        Dataset::from_value(json)
    }

    /// expects `{"post": {id: {"title": .., "body": ..}, ..}}`, extra fields are ignored
    pub fn from_value(json: Value) -> Result<Dataset> {

        let posts = json
            .get("post")
            .ok_or_else(|| Error::DatasetShape("missing top-level 'post' key".to_string()))?
            .as_object()
            .ok_or_else(|| Error::DatasetShape("'post' is not an object".to_string()))?;

        let field = |id: &str, post: &Value, name: &str| -> Result<String> {
            post.get(name)
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| Error::DatasetShape(format!("post '{}' has no string '{}' field", id, name)))
        };

        let posts = posts
            .iter()
            .map(|(id, post)| {
                Ok(Post {
                    id: id.to_owned(),
                    title: field(id, post, "title")?,
                    body: field(id, post, "body")?,
                })
            })
            .collect::<Result<Vec<Post>>>()?;

        Ok(Self { posts })
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}


/// What to do with words that normalise to nothing (e.g. "--" or "  ").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EmptyTokenPolicy {
    /// keep them as "" tokens
    #[default]
    Keep,
    Drop,
}


// defines the behavior needed for tokenizing a post
pub trait Tokenizer {
    fn tokenize(&self, post: &Post) -> Vec<String>;
}

/// Splits `title + " " + body` on single spaces, lowercases, strips non-word
/// characters and wraps the result in start/end sentinels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentinelTokenizer {
    pub start: String,
    pub end: String,
    pub empty_tokens: EmptyTokenPolicy,
}

impl Default for SentinelTokenizer {
    fn default() -> Self {
        Self {
            start: START_TOKEN.to_string(),
            end: END_TOKEN.to_string(),
            empty_tokens: EmptyTokenPolicy::Keep,
        }
    }
}

impl SentinelTokenizer {

    /// Lowercases `word` and strips every character outside `\w`. Unicode
    /// `\w` covers combining marks, so decomposed accents stay attached to
    /// their letter.
    pub fn normalize(word: &str) -> String {
        NON_WORD.replace_all(&word.to_lowercase(), "").into_owned()
    }

    pub fn tokenize_text(&self, text: &str) -> Vec<String> {

        let mut tokens = vec![self.start.clone()];
        for word in text.split(' ') {
            let token = SentinelTokenizer::normalize(word);
            if token.is_empty() && self.empty_tokens == EmptyTokenPolicy::Drop {
                continue;
            }
            tokens.push(token);
        }
        tokens.push(self.end.clone());
        tokens
    }
}

impl Tokenizer for SentinelTokenizer {

    fn tokenize(&self, post: &Post) -> Vec<String> {
        self.tokenize_text(&format!("{} {}", post.title, post.body))
    }
}


/// Tokenized documents, serialized as a json array of arrays of strings.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Corpus {
    documents: Vec<Vec<String>>,
}

impl Corpus {

    pub fn new(documents: Vec<Vec<String>>) -> Corpus {
        Self { documents }
    }

    /// every line becomes one document
    pub fn from_lines<'a, I: IntoIterator<Item = &'a str>>(lines: I, tokenizer: &SentinelTokenizer) -> Corpus {
        let documents = lines.into_iter().map(|line| tokenizer.tokenize_text(line)).collect();
        Self { documents }
    }

    pub fn documents(&self) -> &[Vec<String>] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn total_tokens(&self) -> usize {
        self.documents.iter().map(Vec::len).sum()
    }
}


/// Tokenizes the first `sample_count` posts (every post when `None`).
pub fn load_corpus<T: Tokenizer>(dataset: &Dataset, sample_count: Option<usize>, tokenizer: &T) -> Corpus {

    let n = match sample_count {
        Some(n) if n > dataset.len() => {
            warn!("asked for {} samples but the dataset only has {} posts", n, dataset.len());
            dataset.len()
        },
        Some(n) => n,
        None => dataset.len()
    };

    let documents = dataset.posts()[..n]
        .iter()
        .map(|post| tokenizer.tokenize(post))
        .collect();

    Corpus { documents }
}
