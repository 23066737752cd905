//! Conversation-scoped image memory
//!
//! Follow-up questions often say "use the image I uploaded" without
//! re-attaching it. Images are remembered per conversation id, never
//! process-wide, so concurrent users cannot see each other's uploads.
//! Last write wins within a conversation; the oldest conversation is
//! evicted once the cap is reached.

use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

pub struct ConversationStore {
    cap: usize,
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    images: HashMap<String, Vec<String>>,
    /// Insertion order for eviction
    order: VecDeque<String>,
}

impl ConversationStore {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Record the latest images for a conversation, replacing any earlier set.
    pub async fn remember(&self, conversation_id: &str, image_urls: Vec<String>) {
        if image_urls.is_empty() {
            return;
        }
        let mut inner = self.inner.write().await;

        if !inner.images.contains_key(conversation_id) {
            inner.order.push_back(conversation_id.to_string());
            while inner.order.len() > self.cap {
                if let Some(evicted) = inner.order.pop_front() {
                    inner.images.remove(&evicted);
                    tracing::debug!(conversation = %evicted, "evicted conversation images");
                }
            }
        }
        inner.images.insert(conversation_id.to_string(), image_urls);
    }

    /// The most recent images for a conversation, empty if none stored.
    pub async fn recall(&self, conversation_id: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .images
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recall_unknown_conversation_is_empty() {
        let store = ConversationStore::new(4);
        assert!(store.recall("nope").await.is_empty());
    }

    #[tokio::test]
    async fn test_last_write_wins_per_conversation() {
        let store = ConversationStore::new(4);
        store.remember("a", vec!["first.png".into()]).await;
        store.remember("a", vec!["second.png".into()]).await;

        assert_eq!(store.recall("a").await, vec!["second.png".to_string()]);
    }

    #[tokio::test]
    async fn test_conversations_are_isolated() {
        let store = ConversationStore::new(4);
        store.remember("a", vec!["alice.png".into()]).await;
        store.remember("b", vec!["bob.png".into()]).await;

        assert_eq!(store.recall("a").await, vec!["alice.png".to_string()]);
        assert_eq!(store.recall("b").await, vec!["bob.png".to_string()]);
    }

    #[tokio::test]
    async fn test_oldest_conversation_evicted_at_cap() {
        let store = ConversationStore::new(2);
        store.remember("a", vec!["a.png".into()]).await;
        store.remember("b", vec!["b.png".into()]).await;
        store.remember("c", vec!["c.png".into()]).await;

        assert!(store.recall("a").await.is_empty(), "oldest should be evicted");
        assert!(!store.recall("b").await.is_empty());
        assert!(!store.recall("c").await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_upload_does_not_clobber() {
        let store = ConversationStore::new(4);
        store.remember("a", vec!["kept.png".into()]).await;
        store.remember("a", vec![]).await;

        assert_eq!(store.recall("a").await, vec!["kept.png".to_string()]);
    }
}
