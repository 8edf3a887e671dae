use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::{RawHit, SearchBackend};

#[derive(Debug, Deserialize)]
struct CorpusRow {
    id: String,
    #[serde(alias = "text")]
    contents: String,
}

/// In-memory Okapi BM25 over a JSONL corpus of `{"id", "contents"}` rows.
#[derive(Debug, Clone)]
pub struct Bm25Backend {
    /// Document id -> (text, term frequencies, token count)
    documents: HashMap<String, (String, HashMap<String, usize>, usize)>,
    postings: HashMap<String, HashSet<String>>,
    avg_doc_length: f32,
    k1: f32,
    b: f32,
    top_k: usize,
}

impl Bm25Backend {
    pub fn new(top_k: usize) -> Self {
        Self {
            documents: HashMap::new(),
            postings: HashMap::new(),
            avg_doc_length: 0.0,
            k1: 1.2,
            b: 0.75,
            top_k,
        }
    }

    pub fn from_jsonl(path: impl AsRef<Path>, top_k: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open corpus {}", path.display()))?;
        let mut backend = Self::new(top_k);
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let row: CorpusRow = serde_json::from_str(&line).with_context(|| {
                format!("invalid corpus row {} in {}", line_no + 1, path.display())
            })?;
            backend.add_document(&row.id, &row.contents);
        }
        tracing::info!(documents = backend.len(), corpus = %path.display(), "bm25 corpus loaded");
        Ok(backend)
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.len() > 1)
            .map(String::from)
            .collect()
    }

    pub fn add_document(&mut self, id: &str, contents: &str) {
        let tokens = Self::tokenize(contents);
        let mut frequencies: HashMap<String, usize> = HashMap::new();
        for token in &tokens {
            *frequencies.entry(token.clone()).or_insert(0) += 1;
        }
        for term in frequencies.keys() {
            self.postings
                .entry(term.clone())
                .or_default()
                .insert(id.to_string());
        }
        self.documents.insert(
            id.to_string(),
            (contents.to_string(), frequencies, tokens.len()),
        );

        let total: usize = self.documents.values().map(|(_, _, len)| len).sum();
        self.avg_doc_length = total as f32 / self.documents.len() as f32;
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn idf(&self, term: &str) -> f32 {
        let df = self.postings.get(term).map(HashSet::len).unwrap_or(0) as f32;
        let n = self.documents.len() as f32;
        if df == 0.0 || n == 0.0 {
            return 0.0;
        }
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn score(&self, doc_id: &str, terms: &[String]) -> f32 {
        let Some((_, frequencies, len)) = self.documents.get(doc_id) else {
            return 0.0;
        };
        let doc_len = *len as f32;
        terms
            .iter()
            .map(|term| {
                let tf = frequencies.get(term).copied().unwrap_or(0) as f32;
                let norm = self.k1 * (1.0 - self.b + self.b * doc_len / self.avg_doc_length);
                self.idf(term) * tf * (self.k1 + 1.0) / (tf + norm)
            })
            .sum()
    }

    /// Ranked `(id, score)` pairs; ties break on id so rankings are stable.
    pub fn rank(&self, query: &str, top_k: usize) -> Vec<(String, f32)> {
        let terms = Self::tokenize(query);
        let candidates: HashSet<&String> = terms
            .iter()
            .filter_map(|term| self.postings.get(term))
            .flatten()
            .collect();

        let mut scored: Vec<(String, f32)> = candidates
            .into_iter()
            .map(|id| (id.clone(), self.score(id, &terms)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(top_k);
        scored
    }
}

#[async_trait]
impl SearchBackend for Bm25Backend {
    async fn search(&self, query: &str, top_k: usize) -> Option<Vec<RawHit>> {
        let hits = self
            .rank(query, top_k)
            .into_iter()
            .filter_map(|(id, _)| {
                self.documents
                    .get(&id)
                    .map(|(text, _, _)| RawHit::new(id.clone(), text.clone()))
            })
            .collect();
        Some(hits)
    }

    fn default_top_k(&self) -> usize {
        self.top_k
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn ranks_matching_documents_first() {
        let mut index = Bm25Backend::new(2);
        index.add_document("paris", "Paris is the capital of France");
        index.add_document("berlin", "Berlin is the capital of Germany");
        index.add_document("cats", "Cats sleep most of the day");

        let ranked = index.rank("capital of France", 10);
        assert_eq!(ranked[0].0, "paris");
        let position = |name: &str| ranked.iter().position(|(id, _)| id == name);
        assert!(position("berlin") < position("cats"));
    }

    #[tokio::test]
    async fn loads_jsonl_corpus() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id": "doc-1", "contents": "The Eiffel Tower is in Paris"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"id": "doc-2", "text": "Mount Fuji is in Japan"}}"#).unwrap();

        let index = Bm25Backend::from_jsonl(file.path(), 2).unwrap();
        assert_eq!(index.len(), 2);

        let hits = index.search("eiffel tower", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "doc-1");
        assert_eq!(index.default_top_k(), 2);
    }
}
