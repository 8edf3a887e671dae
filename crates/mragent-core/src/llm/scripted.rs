use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{LanguageModel, Message, SamplingOptions};
use crate::MragentError;

/// Replays canned completions in order, for tests and offline dry runs.
///
/// Every call is counted and the conversation it received is kept, so callers
/// can assert on how many model turns a run consumed.
pub struct ScriptedLlm {
    name: String,
    replies: Mutex<VecDeque<String>>,
    seen: Mutex<Vec<Vec<Message>>>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: "scripted".to_string(),
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            seen: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|queue| queue.len()).unwrap_or(0)
    }

    /// Conversations received so far, oldest first.
    pub fn conversations(&self) -> Vec<Vec<Message>> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn generate(
        &self,
        conversation: &[Message],
        _options: &SamplingOptions,
    ) -> Result<String, MragentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(conversation.to_vec());
        }
        let mut replies = self
            .replies
            .lock()
            .map_err(|_| MragentError::Llm("scripted reply queue poisoned".into()))?;
        replies
            .pop_front()
            .ok_or_else(|| MragentError::Llm(format!("{} script exhausted", self.name)))
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> SamplingOptions {
        SamplingOptions {
            temperature: 0.1,
            top_p: 0.95,
            max_tokens: 32,
            stop: Vec::new(),
        }
    }

    #[tokio::test]
    async fn replays_in_order_then_fails() {
        let llm = ScriptedLlm::new(["first", "second"]);
        let turn = [Message::user("hi")];

        assert_eq!(llm.generate(&turn, &options()).await.unwrap(), "first");
        assert_eq!(llm.generate(&turn, &options()).await.unwrap(), "second");
        let err = llm.generate(&turn, &options()).await.unwrap_err();

        assert!(matches!(err, MragentError::Llm(_)));
        assert_eq!(llm.calls(), 3);
        assert_eq!(llm.conversations().len(), 3);
    }
}
