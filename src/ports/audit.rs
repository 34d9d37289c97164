//! Text moderation through the classifier side service.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("classifier request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("classifier answered status {0}")]
    Status(u16),
}

/// Classifier verdict over a piece of user text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Compliant,
    NonCompliant,
}

#[async_trait]
pub trait TextAudit: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Verdict, AuditError>;
}

/// HTTP binding: POST `{"text": …}`, read `{"classification": …}`, where the
/// literal `不合规` marks non-compliant text.
pub struct LlmClassifier {
    http: reqwest::Client,
    url: String,
}

impl LlmClassifier {
    pub fn new(base_url: &str, route: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: format!(
                "{}/{}",
                base_url.trim_end_matches('/'),
                route.trim_start_matches('/')
            ),
        }
    }
}

#[derive(Deserialize)]
struct ClassifyRsp {
    #[serde(default)]
    classification: String,
}

#[async_trait]
impl TextAudit for LlmClassifier {
    async fn classify(&self, text: &str) -> Result<Verdict, AuditError> {
        let resp = self
            .http
            .post(&self.url)
            .json(&json!({ "text": text }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AuditError::Status(status.as_u16()));
        }
        let body: ClassifyRsp = resp.json().await?;
        if body.classification == "不合规" {
            Ok(Verdict::NonCompliant)
        } else {
            Ok(Verdict::Compliant)
        }
    }
}
