//! Speech recognition through the ASR side service.
//!
//! The ASR service shares a filesystem with its callers: requests carry the
//! path of an audio file, not the audio itself.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AsrError {
    #[error("asr request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("语音文件不存在")]
    MissingAudio,
    #[error("ASR服务内部错误")]
    Backend,
    #[error("asr answered status {0}")]
    Status(u16),
}

#[async_trait]
pub trait AsrPort: Send + Sync {
    async fn recognize(&self, audio_path: &Path) -> Result<String, AsrError>;
}

/// HTTP binding: POST `{"path": …}`, read `{"text": …}`. 400 means the
/// audio file was not found, 500 is a backend failure.
pub struct HttpAsr {
    http: reqwest::Client,
    url: String,
}

impl HttpAsr {
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
struct RecognizeRsp {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl AsrPort for HttpAsr {
    async fn recognize(&self, audio_path: &Path) -> Result<String, AsrError> {
        let resp = self
            .http
            .post(&self.url)
            .json(&json!({ "path": audio_path.to_string_lossy() }))
            .send()
            .await?;
        match resp.status().as_u16() {
            200 => {
                let body: RecognizeRsp = resp.json().await?;
                Ok(body.text)
            }
            400 => Err(AsrError::MissingAudio),
            500 => Err(AsrError::Backend),
            other => Err(AsrError::Status(other)),
        }
    }
}
