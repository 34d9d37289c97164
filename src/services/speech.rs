//! Speech core: spill the audio payload to disk and hand its path to the
//! ASR side service.

use crate::metrics;
use crate::ports::AsrPort;
use crate::rpc::{SpeechRecognitionReq, SpeechRecognitionRsp};
use crate::util::uuid16;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, warn};

pub struct SpeechService {
    asr: Arc<dyn AsrPort>,
    tmp_dir: PathBuf,
}

impl SpeechService {
    pub fn new(asr: Arc<dyn AsrPort>, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            asr,
            tmp_dir: tmp_dir.into(),
        }
    }

    pub async fn recognize(&self, req: SpeechRecognitionReq) -> SpeechRecognitionRsp {
        if let Err(e) = tokio::fs::create_dir_all(&self.tmp_dir).await {
            error!(request_id = %req.request_id, error = %e, "tmp dir create failed");
            return SpeechRecognitionRsp {
                request_id: req.request_id,
                success: false,
                errmsg: "语音识别失败".to_string(),
                ..Default::default()
            };
        }

        let audio_path = self.tmp_dir.join(format!("{}.wav", uuid16()));
        if let Err(e) = tokio::fs::write(&audio_path, &req.speech_content).await {
            error!(request_id = %req.request_id, error = %e, "audio spill failed");
            return SpeechRecognitionRsp {
                request_id: req.request_id,
                success: false,
                errmsg: "语音识别失败".to_string(),
                ..Default::default()
            };
        }

        match self.asr.recognize(&audio_path).await {
            Ok(text) => {
                if let Err(e) = tokio::fs::remove_file(&audio_path).await {
                    warn!(path = %audio_path.display(), error = %e, "audio cleanup failed");
                }
                SpeechRecognitionRsp {
                    request_id: req.request_id,
                    success: true,
                    recognition_result: text,
                    ..Default::default()
                }
            }
            Err(e) => {
                // The audio file is left in place to ease debugging.
                error!(request_id = %req.request_id, error = %e, "speech recognition failed");
                SpeechRecognitionRsp {
                    request_id: req.request_id,
                    success: false,
                    errmsg: e.to_string(),
                    ..Default::default()
                }
            }
        }
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/SpeechRecognition", post(recognize))
            .with_state(self)
    }
}

async fn recognize(
    State(svc): State<Arc<SpeechService>>,
    Json(req): Json<SpeechRecognitionReq>,
) -> Json<SpeechRecognitionRsp> {
    metrics::RPC_REQUESTS.inc();
    let rsp = svc.recognize(req).await;
    if !rsp.success {
        metrics::RPC_FAILURES.inc();
    }
    Json(rsp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::AsrError;
    use async_trait::async_trait;
    use std::path::Path;

    struct EchoAsr;

    #[async_trait]
    impl AsrPort for EchoAsr {
        async fn recognize(&self, audio_path: &Path) -> Result<String, AsrError> {
            let bytes = tokio::fs::read(audio_path)
                .await
                .map_err(|_| AsrError::MissingAudio)?;
            Ok(format!("len={}", bytes.len()))
        }
    }

    struct FailingAsr;

    #[async_trait]
    impl AsrPort for FailingAsr {
        async fn recognize(&self, _audio_path: &Path) -> Result<String, AsrError> {
            Err(AsrError::Backend)
        }
    }

    #[tokio::test]
    async fn audio_is_spilled_recognized_and_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let svc = SpeechService::new(Arc::new(EchoAsr), dir.path());

        let rsp = svc
            .recognize(SpeechRecognitionReq {
                request_id: "r1".to_string(),
                speech_content: vec![1, 2, 3, 4],
            })
            .await;
        assert!(rsp.success);
        assert_eq!(rsp.recognition_result, "len=4");
        assert_eq!(rsp.request_id, "r1");

        // The temp audio file is gone after success.
        let leftover = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftover, 0);
    }

    #[tokio::test]
    async fn failure_keeps_audio_for_debugging() {
        let dir = tempfile::tempdir().unwrap();
        let svc = SpeechService::new(Arc::new(FailingAsr), dir.path());

        let rsp = svc
            .recognize(SpeechRecognitionReq {
                request_id: "r2".to_string(),
                speech_content: vec![9; 8],
            })
            .await;
        assert!(!rsp.success);
        assert_eq!(rsp.errmsg, "ASR服务内部错误");

        let leftover = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftover, 1);
    }
}
