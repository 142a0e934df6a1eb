use ndarray::Array1;

use crate::embedding::Embeddings;
use crate::error::{Error, Result};

/// Projects word embeddings onto the direction between two reference words.
///
/// ```text
/// axis       = e(word1) - e(word2)
/// projection = [ axis . e(w) for w in words ]
/// ```
///
/// Words with a large positive projection lean towards `word1`, large
/// negative ones towards `word2`.
pub struct Projector {
    embeddings: Embeddings,
    axis: Option<Array1<f32>>,
    axis_labels: Option<(String, String)>,
    saved: Option<(Vec<String>, Array1<f32>)>,
}

/// Vocabulary words with the strongest lean towards either end of the axis.
#[derive(Clone, Debug, PartialEq)]
pub struct AxisExtremes {
    pub toward_first: Vec<(String, f32)>,
    pub toward_second: Vec<(String, f32)>,
}

impl Projector {
    pub fn new(embeddings: Embeddings) -> Projector {
        Self { embeddings, axis: None, axis_labels: None, saved: None }
    }

    pub fn embeddings(&self) -> &Embeddings {
        &self.embeddings
    }

    pub fn set_axis(&mut self, word1: &str, word2: &str) -> Result<&Array1<f32>> {
        let axis = &self.embeddings.vector(word1)? - &self.embeddings.vector(word2)?;
        self.axis_labels = Some((word1.to_string(), word2.to_string()));
        self.saved = None;
        Ok(self.axis.insert(axis))
    }

    pub fn axis(&self) -> Option<&Array1<f32>> {
        self.axis.as_ref()
    }

    pub fn axis_labels(&self) -> Option<(&str, &str)> {
        self.axis_labels.as_ref().map(|(a, b)| (a.as_str(), b.as_str()))
    }

    /// Dot product of every word's embedding with the axis, in input order.
    /// With `save` the words and values are kept for [`Projector::saved`].
    pub fn project_words<S: AsRef<str>>(&mut self, words: &[S], save: bool) -> Result<Array1<f32>> {
        let projections = self.project(words)?;
        if save {
            let words = words.iter().map(|w| w.as_ref().to_string()).collect();
            self.saved = Some((words, projections.clone()));
        }
        Ok(projections)
    }

    fn project<S: AsRef<str>>(&self, words: &[S]) -> Result<Array1<f32>> {
        let axis = self.axis.as_ref().ok_or(Error::AxisNotSet)?;
        words
            .iter()
            .map(|w| Ok(axis.dot(&self.embeddings.vector(w.as_ref())?)))
            .collect::<Result<Vec<f32>>>()
            .map(Array1::from)
    }

    /// Projections of the two axis words themselves.
    pub fn endpoints(&self) -> Result<(f32, f32)> {
        let (first, second) = self.axis_labels().ok_or(Error::AxisNotSet)?;
        let ends = self.project(&[first, second])?;
        Ok((ends[0], ends[1]))
    }

    pub fn saved(&self) -> Option<(&[String], &Array1<f32>)> {
        self.saved.as_ref().map(|(w, p)| (w.as_slice(), p))
    }

    /// The `n` vocabulary words projecting highest (towards the first axis
    /// word) and lowest (towards the second), axis words excluded. Each side
    /// holds at most half of the eligible words so the two lists never share
    /// a word.
    pub fn extremes(&self, n: usize) -> Result<AxisExtremes> {
        let axis = self.axis.as_ref().ok_or(Error::AxisNotSet)?;
        let (first, second) = self.axis_labels().ok_or(Error::AxisNotSet)?;
        let vocab = self.embeddings.vocabulary();

        let scores = self.embeddings.vectors().dot(axis);
        let mut ranked: Vec<(&str, f32)> = vocab
            .iter()
            .filter(|(i, t)| !self.embeddings.is_degenerate(*i) && *t != first && *t != second)
            .map(|(i, t)| (t, scores[i]))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let n = n.min(ranked.len() / 2);
        Ok(AxisExtremes {
            toward_first: ranked.iter().take(n).map(|(t, s)| (t.to_string(), *s)).collect(),
            toward_second: ranked.iter().rev().take(n).map(|(t, s)| (t.to_string(), *s)).collect(),
        })
    }
}
