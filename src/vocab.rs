use std::collections::{BTreeSet, HashMap};

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::corpus::Corpus;
use crate::error::{Error, Result};

/// Token <-> dense index mapping, indices follow lexicographic token order.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Vocabulary {
    tokens: Vec<String>,
    t2i: HashMap<String, usize>,
}

impl Vocabulary {
    pub fn from_corpus(corpus: &Corpus) -> Vocabulary {
        Vocabulary::from_tokens(corpus.documents().iter().flatten().map(String::as_str))
    }

    /// Distinct tokens sorted lexicographically, so the mapping does not
    /// depend on the order tokens are seen in.
    pub fn from_tokens<'a, I>(tokens: I) -> Vocabulary
    where
        I: IntoIterator<Item = &'a str>,
    {
        let distinct: BTreeSet<&str> = tokens.into_iter().collect();
        let tokens: Vec<String> = distinct.into_iter().map(str::to_owned).collect();
        let t2i = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_owned(), i))
            .collect();
        Self { tokens, t2i }
    }

    fn from_mapping(t2i: HashMap<String, usize>) -> Result<Vocabulary> {
        let n = t2i.len();
        let mut tokens: Vec<Option<String>> = vec![None; n];
        for (token, &i) in &t2i {
            let slot = tokens.get_mut(i).ok_or_else(|| {
                Error::VocabularyShape(format!(
                    "index {} of '{}' is out of range for {} tokens",
                    i, token, n
                ))
            })?;
            if let Some(other) = slot.as_ref() {
                return Err(Error::VocabularyShape(format!(
                    "index {} assigned to both '{}' and '{}'",
                    i, other, token
                )));
            }
            *slot = Some(token.to_owned());
        }

        // every slot is filled: n distinct indices, all below n
        let tokens: Vec<String> = tokens.into_iter().flatten().collect();
        if let Some(w) = tokens.windows(2).find(|w| w[0] >= w[1]) {
            return Err(Error::VocabularyShape(format!(
                "indices are not in lexicographic order ('{}' before '{}')",
                w[0], w[1]
            )));
        }

        Ok(Self { tokens, t2i })
    }

    pub fn index_of(&self, token: &str) -> Option<usize> {
        self.t2i.get(token).copied()
    }

    pub fn token(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(String::as_str)
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// `(index, token)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.tokens.iter().map(String::as_str).enumerate()
    }
}

impl Serialize for Vocabulary {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.tokens.len()))?;
        for (i, token) in self.iter() {
            map.serialize_entry(token, &i)?;
        }
        map.end()
    }
}

struct VocabularyVisitor;

impl<'de> Visitor<'de> for VocabularyVisitor {
    type Value = HashMap<String, usize>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a map of token to index")
    }

    fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut t2i = HashMap::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((token, index)) = access.next_entry::<String, usize>()? {
            t2i.insert(token, index);
        }
        Ok(t2i)
    }
}

impl<'de> Deserialize<'de> for Vocabulary {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let t2i = deserializer.deserialize_map(VocabularyVisitor)?;
        Vocabulary::from_mapping(t2i).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {

    use super::Vocabulary;

    #[test]
    fn indices_follow_lexicographic_order() {
        let vocab = Vocabulary::from_tokens(["you", "love", "[START]", "i", "love", "[END]"]);

        assert_eq!(vocab.len(), 5);
        assert_eq!(vocab.tokens(), &["[END]", "[START]", "i", "love", "you"]);
        for (i, token) in vocab.iter() {
            assert_eq!(vocab.index_of(token), Some(i));
        }

        let mut indices: Vec<usize> = vocab.tokens().iter().filter_map(|t| vocab.index_of(t)).collect();
        indices.sort();
        assert_eq!(indices, (0..vocab.len()).collect::<Vec<usize>>());
    }

    #[test]
    fn order_of_appearance_does_not_matter() {
        let a = Vocabulary::from_tokens(["b", "c", "a", "", "c"]);
        let b = Vocabulary::from_tokens(["", "a", "c", "b"]);
        assert_eq!(a, b);
        assert_eq!(a.index_of(""), Some(0));
    }

    #[test]
    fn json_round_trip() {
        let vocab = Vocabulary::from_tokens(["me", "love", "you"]);
        let json = serde_json::to_string(&vocab).unwrap();
        assert_eq!(json, r#"{"love":0,"me":1,"you":2}"#);

        let back: Vocabulary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vocab);
    }

    #[test]
    fn rejects_broken_mappings() {
        assert!(serde_json::from_str::<Vocabulary>(r#"{"a":0,"b":2}"#).is_err());
        assert!(serde_json::from_str::<Vocabulary>(r#"{"a":0,"b":0}"#).is_err());
        assert!(serde_json::from_str::<Vocabulary>(r#"{"a":1,"b":0}"#).is_err());
    }
}
