//! Typed `user` index: profile documents searchable by nickname, email and
//! user id.

use super::{EsClient, IndexMapping, SearchError, SearchQuery};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const INDEX: &str = "user";

/// Profile document; the document id is `user_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserDoc {
    pub user_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub avatar_id: String,
}

/// Operations the user core needs from the profile index.
#[async_trait]
pub trait UserIndexOps: Send + Sync {
    async fn upsert(&self, doc: &UserDoc) -> Result<(), SearchError>;
    async fn remove(&self, user_id: &str) -> Result<(), SearchError>;
    async fn search(&self, key: &str, exclude_uids: &[String]) -> Result<Vec<UserDoc>, SearchError>;
}

pub struct EsUserIndex {
    es: EsClient,
}

impl EsUserIndex {
    pub fn new(es: EsClient) -> Self {
        Self { es }
    }

    /// Create the index; idempotent. Failure here is fatal at startup.
    pub async fn ensure(&self) -> Result<(), SearchError> {
        let mapping = IndexMapping::new()
            .field("user_id", "keyword", "standard", true)
            .field("email", "keyword", "standard", true)
            .field("nickname", "text", "ik_max_word", true)
            .field("description", "text", "standard", false)
            .field("avatar_id", "keyword", "standard", false);
        self.es.ensure_index(INDEX, &mapping).await
    }
}

#[async_trait]
impl UserIndexOps for EsUserIndex {
    async fn upsert(&self, doc: &UserDoc) -> Result<(), SearchError> {
        let body = serde_json::to_value(doc)
            .map_err(|e| SearchError::Backend(e.to_string()))?;
        self.es.upsert(INDEX, &doc.user_id, &body).await
    }

    async fn remove(&self, user_id: &str) -> Result<(), SearchError> {
        self.es.delete(INDEX, user_id).await
    }

    async fn search(&self, key: &str, exclude_uids: &[String]) -> Result<Vec<UserDoc>, SearchError> {
        let mut query = SearchQuery::new()
            .should_match("email.keyword", key)
            .should_match("user_id.keyword", key)
            .should_match("nickname", key);
        if !exclude_uids.is_empty() {
            query = query.must_not_terms("user_id.keyword", exclude_uids);
        }
        let hits = self.es.search(INDEX, &query).await?;
        Ok(hits
            .into_iter()
            .filter_map(|source| serde_json::from_value(source).ok())
            .collect())
    }
}
