//! Search-index port: a thin Elasticsearch-compatible REST client plus the
//! typed `user` and `message` indices built on it.
//!
//! Index creation is idempotent and performed once at service startup;
//! a create failure there is fatal. Documents are PUT by id (overwrite
//! semantics) and queried with a bool composition of must / should /
//! must_not term and match clauses.

mod message_index;
mod user_index;

pub use message_index::{EsMessageIndex, MessageDoc, MessageIndexOps};
pub use user_index::{EsUserIndex, UserDoc, UserIndexOps};

use serde_json::{Value, json};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("index {index} answered status {status}: {body}")]
    Status {
        index: String,
        status: u16,
        body: String,
    },
    #[error("malformed search response for {0}")]
    Malformed(String),
    #[error("search backend error: {0}")]
    Backend(String),
}

/// Field schema for index creation.
#[derive(Debug, Default)]
pub struct IndexMapping {
    properties: serde_json::Map<String, Value>,
}

impl IndexMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field. `enabled = false` stores without indexing.
    pub fn field(mut self, name: &str, ty: &str, analyzer: &str, enabled: bool) -> Self {
        let mut props = serde_json::Map::new();
        props.insert("type".into(), json!(ty));
        if ty == "text" {
            props.insert("analyzer".into(), json!(analyzer));
        }
        if !enabled {
            props.insert("enabled".into(), json!(false));
        }
        self.properties.insert(name.to_string(), Value::Object(props));
        self
    }

    fn to_body(&self) -> Value {
        json!({
            "settings": {
                "analysis": {
                    "analyzer": {
                        "ik": { "tokenizer": "ik_max_word" }
                    }
                }
            },
            "mappings": {
                "dynamic": true,
                "properties": self.properties,
            }
        })
    }
}

/// Bool query builder: must / should / must_not of term and match clauses.
#[derive(Debug, Default)]
pub struct SearchQuery {
    must: Vec<Value>,
    should: Vec<Value>,
    must_not: Vec<Value>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must_term(mut self, field: &str, value: &str) -> Self {
        self.must.push(clause("term", field, json!(value)));
        self
    }

    pub fn must_match(mut self, field: &str, value: &str) -> Self {
        self.must.push(clause("match", field, json!(value)));
        self
    }

    pub fn should_match(mut self, field: &str, value: &str) -> Self {
        self.should.push(clause("match", field, json!(value)));
        self
    }

    pub fn must_not_terms(mut self, field: &str, values: &[String]) -> Self {
        self.must_not.push(clause("terms", field, json!(values)));
        self
    }

    fn to_body(&self) -> Value {
        let mut bool_clause = serde_json::Map::new();
        if !self.must.is_empty() {
            bool_clause.insert("must".into(), json!(self.must));
        }
        if !self.should.is_empty() {
            bool_clause.insert("should".into(), json!(self.should));
            if self.must.is_empty() {
                bool_clause.insert("minimum_should_match".into(), json!(1));
            }
        }
        if !self.must_not.is_empty() {
            bool_clause.insert("must_not".into(), json!(self.must_not));
        }
        json!({ "query": { "bool": bool_clause } })
    }
}

/// `{ kind: { field: value } }` with a runtime field name.
fn clause(kind: &str, field: &str, value: Value) -> Value {
    let mut inner = serde_json::Map::new();
    inner.insert(field.to_string(), value);
    let mut outer = serde_json::Map::new();
    outer.insert(kind.to_string(), Value::Object(inner));
    Value::Object(outer)
}

/// Thread-safe REST client for one search cluster.
#[derive(Clone)]
pub struct EsClient {
    http: reqwest::Client,
    base: String,
}

impl EsClient {
    pub fn new(url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: url.trim_end_matches('/').to_string(),
        }
    }

    /// Create `name` with `mapping`; an index that already exists is fine.
    pub async fn ensure_index(&self, name: &str, mapping: &IndexMapping) -> Result<(), SearchError> {
        let url = format!("{}/{}", self.base, name);
        let resp = self.http.put(&url).json(&mapping.to_body()).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        if body.contains("resource_already_exists_exception") {
            return Ok(());
        }
        error!(index = name, status = status.as_u16(), body, "index create failed");
        Err(SearchError::Status {
            index: name.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    /// PUT a document by id; overwrites any previous version.
    pub async fn upsert(&self, name: &str, id: &str, doc: &Value) -> Result<(), SearchError> {
        let url = format!("{}/{}/_doc/{}", self.base, name, id);
        let resp = self.http.put(&url).json(doc).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(SearchError::Status {
            index: name.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    /// Delete a document by id; a document already gone counts as deleted.
    pub async fn delete(&self, name: &str, id: &str) -> Result<(), SearchError> {
        let url = format!("{}/{}/_doc/{}", self.base, name, id);
        let resp = self.http.delete(&url).send().await?;
        let status = resp.status();
        if status.is_success() || status.as_u16() == 404 {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(SearchError::Status {
            index: name.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    /// Execute a bool query, returning `_source` objects in hit order.
    pub async fn search(&self, name: &str, query: &SearchQuery) -> Result<Vec<Value>, SearchError> {
        let url = format!("{}/{}/_search", self.base, name);
        let resp = self.http.post(&url).json(&query.to_body()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                index: name.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        let body: Value = resp.json().await?;
        let hits = body
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .ok_or_else(|| SearchError::Malformed(name.to_string()))?;
        Ok(hits
            .iter()
            .filter_map(|hit| hit.get("_source").cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_body_shape() {
        let mapping = IndexMapping::new()
            .field("user_id", "keyword", "standard", true)
            .field("nickname", "text", "ik_max_word", true)
            .field("description", "text", "standard", false);
        let body = mapping.to_body();
        assert_eq!(body.pointer("/mappings/dynamic"), Some(&json!(true)));
        assert_eq!(
            body.pointer("/mappings/properties/user_id/type"),
            Some(&json!("keyword"))
        );
        assert_eq!(
            body.pointer("/mappings/properties/nickname/analyzer"),
            Some(&json!("ik_max_word"))
        );
        assert_eq!(
            body.pointer("/mappings/properties/description/enabled"),
            Some(&json!(false))
        );
        // keyword fields carry no analyzer
        assert!(body.pointer("/mappings/properties/user_id/analyzer").is_none());
    }

    #[test]
    fn query_body_combines_clauses() {
        let query = SearchQuery::new()
            .must_term("chat_session_id", "s1")
            .must_match("content", "盖浇")
            .must_not_terms("user_id", &["u9".to_string()]);
        let body = query.to_body();
        let must = body.pointer("/query/bool/must").unwrap().as_array().unwrap();
        assert_eq!(must.len(), 2);
        assert_eq!(
            body.pointer("/query/bool/must_not/0/terms/user_id/0"),
            Some(&json!("u9"))
        );
        assert!(body.pointer("/query/bool/minimum_should_match").is_none());
    }

    #[test]
    fn should_only_query_requires_one_match() {
        let query = SearchQuery::new()
            .should_match("nickname", "alice")
            .should_match("email", "alice");
        let body = query.to_body();
        assert_eq!(
            body.pointer("/query/bool/minimum_should_match"),
            Some(&json!(1))
        );
    }
}
