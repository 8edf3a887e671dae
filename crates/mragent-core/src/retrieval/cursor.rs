use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{Document, DocumentIdentityMap, DynRetriever, Retriever, SearchBackend};

#[derive(Debug, Default)]
struct QueryCursor {
    pending: VecDeque<Document>,
    seen: HashSet<String>,
    fetched_top_k: usize,
    exhausted: bool,
}

/// Wraps a [`SearchBackend`] into the forward-only [`Retriever`] cursor.
///
/// Each refill asks the backend for `cache_k` more results than the previous
/// page and queues the ones this query has not served yet. Cursors belong to
/// one `CachedRetriever` value; [`Retriever::fresh_cursors`] hands out another
/// value over the same backend and identity map with no cursors open, so
/// session ids stay stable while every run starts each query at rank one.
pub struct CachedRetriever<B> {
    backend: Arc<B>,
    cache_k: usize,
    cursors: Mutex<HashMap<String, QueryCursor>>,
    ids: Arc<Mutex<DocumentIdentityMap>>,
}

impl<B: SearchBackend> CachedRetriever<B> {
    pub fn new(backend: B, cache_k: usize, max_session_ids: usize) -> Self {
        Self {
            backend: Arc::new(backend),
            cache_k: cache_k.max(1),
            cursors: Mutex::new(HashMap::new()),
            ids: Arc::new(Mutex::new(DocumentIdentityMap::new(max_session_ids))),
        }
    }

    /// Same backend and identity map, no cursors.
    pub fn reopen(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            cache_k: self.cache_k,
            cursors: Mutex::new(HashMap::new()),
            ids: Arc::clone(&self.ids),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn original_id(&self, session_id: &str) -> Option<String> {
        let ids = self.ids.lock().await;
        ids.original_id(session_id).map(str::to_string)
    }

    pub async fn session_id(&self, original_id: &str) -> Option<String> {
        let ids = self.ids.lock().await;
        ids.session_id(original_id).map(str::to_string)
    }

    pub async fn known_documents(&self) -> usize {
        self.ids.lock().await.len()
    }

    pub async fn open_cursors(&self) -> usize {
        self.cursors.lock().await.len()
    }
}

#[async_trait]
impl<B: SearchBackend + 'static> Retriever for CachedRetriever<B> {
    async fn search_next(&self, query: &str) -> Option<Document> {
        let mut cursors = self.cursors.lock().await;
        let default_top_k = self.backend.default_top_k();

        let cursor = cursors
            .entry(query.to_string())
            .or_insert_with(|| QueryCursor {
                fetched_top_k: default_top_k,
                ..QueryCursor::default()
            });
        if let Some(document) = cursor.pending.pop_front() {
            return Some(document);
        }
        if cursor.exhausted {
            return None;
        }

        let requested = cursor.fetched_top_k + self.cache_k;
        debug!(%query, requested, "refilling retrieval cursor");
        let hits = match self.backend.search(query, requested).await {
            Some(hits) if !hits.is_empty() => hits,
            // Unavailable backends and empty pages leave the cursor retryable.
            _ => return None,
        };
        let short_page = hits.len() < requested;

        let mut ids = self.ids.lock().await;
        for hit in hits {
            if cursor.seen.contains(&hit.id) {
                continue;
            }
            let Some(session_id) = ids.assign(&hit.id) else {
                warn!(
                    original_id = %hit.id,
                    capacity = ids.capacity(),
                    "session id space exhausted; skipping document"
                );
                continue;
            };
            cursor.seen.insert(hit.id.clone());
            cursor.pending.push_back(Document {
                id: session_id,
                original_id: hit.id,
                text: hit.text,
            });
        }
        drop(ids);
        cursor.fetched_top_k = requested;
        if short_page {
            cursor.exhausted = true;
        }

        cursor.pending.pop_front()
    }

    fn fresh_cursors(&self) -> DynRetriever {
        Arc::new(self.reopen())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{InMemoryBackend, RawHit};
    use async_trait::async_trait;

    fn ranked(prefix: &str, count: usize) -> Vec<RawHit> {
        (0..count)
            .map(|idx| RawHit::new(format!("{prefix}{idx}"), format!("text of {prefix}{idx}")))
            .collect()
    }

    #[tokio::test]
    async fn cursor_serves_distinct_documents_in_rank_order() {
        let backend = InMemoryBackend::new(2);
        backend.insert("moon landing", ranked("d", 30));
        let retriever = CachedRetriever::new(backend, 3, 100);

        let mut served = Vec::new();
        while let Some(doc) = retriever.search_next("moon landing").await {
            served.push(doc.original_id);
        }

        let expected: Vec<String> = (0..30).map(|idx| format!("d{idx}")).collect();
        assert_eq!(served, expected);
        assert!(retriever.search_next("moon landing").await.is_none());
    }

    #[tokio::test]
    async fn same_backend_document_keeps_its_session_id_across_queries() {
        let backend = InMemoryBackend::new(2);
        backend.insert(
            "first",
            vec![RawHit::new("shared", "s"), RawHit::new("only-first", "f")],
        );
        backend.insert(
            "second",
            vec![RawHit::new("only-second", "o"), RawHit::new("shared", "s")],
        );
        let retriever = CachedRetriever::new(backend, 20, 100);

        let a = retriever.search_next("first").await.unwrap();
        let _ = retriever.search_next("second").await.unwrap();
        let b = retriever.search_next("second").await.unwrap();

        assert_eq!(a.original_id, "shared");
        assert_eq!(b.original_id, "shared");
        assert_eq!(a.id, b.id);
        assert_eq!(
            retriever.original_id(&a.id).await.as_deref(),
            Some("shared")
        );
    }

    #[tokio::test]
    async fn exhausted_id_space_skips_new_documents() {
        let backend = InMemoryBackend::new(2);
        backend.insert("q", ranked("d", 4));
        let retriever = CachedRetriever::new(backend, 20, 2);

        assert!(retriever.search_next("q").await.is_some());
        assert!(retriever.search_next("q").await.is_some());
        assert!(retriever.search_next("q").await.is_none());
        assert_eq!(retriever.known_documents().await, 2);
    }

    struct Offline;

    #[async_trait]
    impl SearchBackend for Offline {
        async fn search(&self, _query: &str, _top_k: usize) -> Option<Vec<RawHit>> {
            None
        }

        fn default_top_k(&self) -> usize {
            10
        }
    }

    #[tokio::test]
    async fn unavailable_backend_yields_no_document() {
        let retriever = CachedRetriever::new(Offline, 20, 10);
        assert!(retriever.search_next("anything").await.is_none());
    }

    #[tokio::test]
    async fn fresh_cursors_restart_at_rank_one_with_stable_ids() {
        let backend = InMemoryBackend::new(2);
        backend.insert("eiffel tower", ranked("wiki-", 12));
        let retriever = CachedRetriever::new(backend, 3, 100);

        let mut first_run = Vec::new();
        for _ in 0..5 {
            first_run.push(retriever.search_next("eiffel tower").await.unwrap());
        }
        let next_run = retriever.reopen();
        let top = next_run.search_next("eiffel tower").await.unwrap();

        assert_eq!(top.original_id, "wiki-0");
        assert_eq!(top.id, first_run[0].id);
        assert_eq!(
            retriever.search_next("eiffel tower").await.unwrap().original_id,
            "wiki-5"
        );
        assert_eq!(next_run.open_cursors().await, 1);
        assert_eq!(retriever.known_documents().await, next_run.known_documents().await);
    }

    #[tokio::test]
    async fn exhausted_cursor_does_not_leak_into_fresh_cursors() {
        let backend = InMemoryBackend::new(2);
        backend.insert("q", ranked("d", 2));
        let retriever = CachedRetriever::new(backend, 20, 100);

        while retriever.search_next("q").await.is_some() {}
        let fresh = retriever.fresh_cursors();
        assert_eq!(fresh.search_next("q").await.unwrap().original_id, "d0");
    }
}
