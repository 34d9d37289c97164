//! Typed `message` index: text-message bodies searchable per chat session.

use super::{EsClient, IndexMapping, SearchError, SearchQuery};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const INDEX: &str = "message";

/// Indexed text message; the document id is `message_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDoc {
    pub message_id: String,
    pub user_id: String,
    pub chat_session_id: String,
    /// Seconds since the epoch; stored but not indexed.
    pub create_time: i64,
    pub content: String,
}

/// Operations the storage service needs from the message index.
#[async_trait]
pub trait MessageIndexOps: Send + Sync {
    async fn upsert(&self, doc: &MessageDoc) -> Result<(), SearchError>;
    async fn remove(&self, message_id: &str) -> Result<(), SearchError>;
    async fn search(
        &self,
        chat_session_id: &str,
        key: &str,
    ) -> Result<Vec<MessageDoc>, SearchError>;
}

pub struct EsMessageIndex {
    es: EsClient,
}

impl EsMessageIndex {
    pub fn new(es: EsClient) -> Self {
        Self { es }
    }

    /// Create the index; idempotent. Failure here is fatal at startup.
    pub async fn ensure(&self) -> Result<(), SearchError> {
        let mapping = IndexMapping::new()
            .field("message_id", "keyword", "standard", true)
            .field("user_id", "keyword", "standard", false)
            .field("chat_session_id", "keyword", "standard", true)
            .field("create_time", "long", "standard", false)
            .field("content", "text", "ik_max_word", true);
        self.es.ensure_index(INDEX, &mapping).await
    }
}

#[async_trait]
impl MessageIndexOps for EsMessageIndex {
    async fn upsert(&self, doc: &MessageDoc) -> Result<(), SearchError> {
        let body = serde_json::to_value(doc)
            .map_err(|e| SearchError::Backend(e.to_string()))?;
        self.es.upsert(INDEX, &doc.message_id, &body).await
    }

    async fn remove(&self, message_id: &str) -> Result<(), SearchError> {
        self.es.delete(INDEX, message_id).await
    }

    async fn search(
        &self,
        chat_session_id: &str,
        key: &str,
    ) -> Result<Vec<MessageDoc>, SearchError> {
        let query = SearchQuery::new()
            .must_term("chat_session_id", chat_session_id)
            .must_match("content", key);
        let hits = self.es.search(INDEX, &query).await?;
        Ok(hits
            .into_iter()
            .filter_map(|source| serde_json::from_value(source).ok())
            .collect())
    }
}
