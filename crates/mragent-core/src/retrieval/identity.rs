use std::collections::HashMap;

/// Bidirectional backend-id ↔ session-id map owned by one retriever instance.
///
/// Session ids come from a monotonic counter bounded by `capacity`, so the
/// same corpus queried in the same order always yields the same ids.
#[derive(Debug, Clone)]
pub struct DocumentIdentityMap {
    to_session: HashMap<String, String>,
    to_original: HashMap<String, String>,
    next_id: usize,
    capacity: usize,
}

impl DocumentIdentityMap {
    pub fn new(capacity: usize) -> Self {
        Self {
            to_session: HashMap::new(),
            to_original: HashMap::new(),
            next_id: 0,
            capacity,
        }
    }

    /// Session id for `original_id`, assigning the next free one on first sight.
    ///
    /// Returns `None` once every id in the space is taken.
    pub fn assign(&mut self, original_id: &str) -> Option<String> {
        if let Some(existing) = self.to_session.get(original_id) {
            return Some(existing.clone());
        }
        if self.next_id >= self.capacity {
            return None;
        }
        let session_id = self.next_id.to_string();
        self.next_id += 1;
        self.to_session
            .insert(original_id.to_string(), session_id.clone());
        self.to_original
            .insert(session_id.clone(), original_id.to_string());
        Some(session_id)
    }

    pub fn session_id(&self, original_id: &str) -> Option<&str> {
        self.to_session.get(original_id).map(String::as_str)
    }

    pub fn original_id(&self, session_id: &str) -> Option<&str> {
        self.to_original.get(session_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.to_session.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_session.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_is_idempotent_and_bidirectional() {
        let mut ids = DocumentIdentityMap::new(10);
        let first = ids.assign("wiki:Paris").unwrap();
        let other = ids.assign("wiki:Lyon").unwrap();

        assert_eq!(ids.assign("wiki:Paris").unwrap(), first);
        assert_ne!(first, other);
        assert_eq!(ids.original_id(&other), Some("wiki:Lyon"));
        assert_eq!(ids.session_id("wiki:Paris"), Some(first.as_str()));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn exhausted_space_refuses_new_documents_only() {
        let mut ids = DocumentIdentityMap::new(1);
        let only = ids.assign("a").unwrap();

        assert!(ids.assign("b").is_none());
        assert_eq!(ids.assign("a"), Some(only));
    }
}
