//! Retrieval collaborator: backends, the per-query cursor and session document ids.

mod bm25;
mod cursor;
mod identity;
mod sparse;

pub use bm25::Bm25Backend;
pub use cursor::CachedRetriever;
pub use identity::DocumentIdentityMap;
pub use sparse::SparseHttpBackend;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::MragentError;
use crate::config::{RetrieverConfig, RetrieverKind};

const SPARSE_TIMEOUT: Duration = Duration::from_secs(60);

/// A retrieved document as the rest of the system sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Session-local id, stable across every run sharing the identity map.
    pub id: String,
    /// Backend-native id, used for gold-document comparisons.
    pub original_id: String,
    pub text: String,
}

/// One ranked hit as returned by a backend, before session ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHit {
    #[serde(deserialize_with = "crate::structured::lenient_text")]
    pub id: String,
    pub text: String,
}

impl RawHit {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Ranked search over some index.
///
/// `None` means the backend could not answer (unreachable, bad payload); an
/// empty list means it answered with nothing. Implementations never panic or
/// return errors for transient failures.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Option<Vec<RawHit>>;

    /// Number of results the first page of a fresh query should cover.
    fn default_top_k(&self) -> usize;
}

/// Forward-only, per-query document cursor.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Next unseen document for `query`, or `None` once exhausted or unavailable.
    async fn search_next(&self, query: &str) -> Option<Document>;

    /// A retriever with no open cursors that keeps this one's session ids.
    /// The coordinator takes one per run.
    fn fresh_cursors(&self) -> DynRetriever;
}

pub type DynRetriever = Arc<dyn Retriever>;

/// Fixed ranked hits per query, for tests and offline runs.
pub struct InMemoryBackend {
    hits: DashMap<String, Vec<RawHit>>,
    fallback: Vec<RawHit>,
    top_k: usize,
    searches: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new(top_k: usize) -> Self {
        Self {
            hits: DashMap::new(),
            fallback: Vec::new(),
            top_k,
            searches: AtomicUsize::new(0),
        }
    }

    pub fn from_map(top_k: usize, hits: HashMap<String, Vec<RawHit>>) -> Self {
        let backend = Self::new(top_k);
        for (query, ranked) in hits {
            backend.hits.insert(query, ranked);
        }
        backend
    }

    /// Hits returned for any query without an explicit entry.
    pub fn with_fallback(mut self, ranked: Vec<RawHit>) -> Self {
        self.fallback = ranked;
        self
    }

    pub fn insert(&self, query: impl Into<String>, ranked: Vec<RawHit>) {
        self.hits.insert(query.into(), ranked);
    }

    /// Number of `search` calls served so far.
    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    async fn search(&self, query: &str, top_k: usize) -> Option<Vec<RawHit>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let ranked = self
            .hits
            .get(query)
            .map(|entry| entry.clone())
            .unwrap_or_else(|| self.fallback.clone());
        Some(ranked.into_iter().take(top_k).collect())
    }

    fn default_top_k(&self) -> usize {
        self.top_k
    }
}

#[async_trait]
impl<B: SearchBackend + ?Sized> SearchBackend for Arc<B> {
    async fn search(&self, query: &str, top_k: usize) -> Option<Vec<RawHit>> {
        (**self).search(query, top_k).await
    }

    fn default_top_k(&self) -> usize {
        (**self).default_top_k()
    }
}

/// Cached cursor over the backend selected by `config`.
pub fn build_retriever(config: &RetrieverConfig) -> Result<DynRetriever, MragentError> {
    let top_k = config.effective_top_k();
    match config.kind {
        RetrieverKind::Bm25 => {
            let corpus = config.corpus_path.as_ref().ok_or_else(|| {
                MragentError::InvalidConfiguration("bm25 retriever needs corpus_path".into())
            })?;
            let backend = Bm25Backend::from_jsonl(corpus, top_k)?;
            Ok(Arc::new(CachedRetriever::new(
                backend,
                config.cache_k,
                config.max_session_ids,
            )))
        }
        RetrieverKind::Sparse => {
            let backend =
                SparseHttpBackend::new(config.search_url()?, top_k, config.threshold, SPARSE_TIMEOUT)?;
            Ok(Arc::new(CachedRetriever::new(
                backend,
                config.cache_k,
                config.max_session_ids,
            )))
        }
    }
}
