//! Transmit core: resolve the sender, compose the canonical envelope,
//! publish it for durable storage and return the fan-out target list.
//!
//! The bytes put on the broker are exactly the bytes returned to the
//! caller, so the push path and the storage consumer see one identical
//! envelope. The core performs no deduplication: identical requests get
//! distinct message ids.

use crate::broker::MessagePublisher;
use crate::db::Database;
use crate::metrics;
use crate::rpc::{GetTransmitTargetRsp, MessageInfo, NewMessageReq, UserDirectory};
use crate::util::{now_seconds, uuid16};
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;
use tracing::error;

pub struct TransmitService {
    db: Database,
    users: Arc<dyn UserDirectory>,
    publisher: Arc<dyn MessagePublisher>,
}

impl TransmitService {
    pub fn new(
        db: Database,
        users: Arc<dyn UserDirectory>,
        publisher: Arc<dyn MessagePublisher>,
    ) -> Self {
        Self {
            db,
            users,
            publisher,
        }
    }

    pub async fn get_transmit_target(&self, req: NewMessageReq) -> GetTransmitTargetRsp {
        let fail = |request_id: String, errmsg: &str| GetTransmitTargetRsp {
            request_id,
            success: false,
            errmsg: errmsg.to_string(),
            ..Default::default()
        };

        let sender = match self.users.user_info(&req.request_id, &req.user_id).await {
            Ok(sender) => sender,
            Err(e) => {
                e.observe(&req.request_id);
                return fail(req.request_id, e.errmsg());
            }
        };

        let envelope = MessageInfo {
            message_id: uuid16(),
            chat_session_id: req.chat_session_id.clone(),
            timestamp: now_seconds(),
            sender,
            message: req.message,
        };

        let targets = match self.db.members().member_ids(&req.chat_session_id).await {
            Ok(targets) => targets,
            Err(e) => {
                error!(
                    request_id = %req.request_id,
                    session = %req.chat_session_id,
                    error = %e,
                    "member enumeration failed"
                );
                return fail(req.request_id, "获取会话成员失败");
            }
        };

        if !self.publisher.publish(&envelope.to_bytes()).await {
            error!(
                request_id = %req.request_id,
                message_id = %envelope.message_id,
                "envelope publish failed"
            );
            return fail(req.request_id, "消息持久化失败");
        }

        GetTransmitTargetRsp {
            request_id: req.request_id,
            success: true,
            message: Some(envelope),
            target_id_list: targets,
            ..Default::default()
        }
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/GetTransmitTarget", post(get_transmit_target))
            .with_state(self)
    }
}

async fn get_transmit_target(
    State(svc): State<Arc<TransmitService>>,
    Json(req): Json<NewMessageReq>,
) -> Json<GetTransmitTargetRsp> {
    metrics::RPC_REQUESTS.inc();
    let rsp = svc.get_transmit_target(req).await;
    if !rsp.success {
        metrics::RPC_FAILURES.inc();
    }
    Json(rsp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ServiceError, ServiceResult};
    use crate::rpc::{MessageContent, UserInfo};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    struct FakeDirectory;

    #[async_trait]
    impl UserDirectory for FakeDirectory {
        async fn user_info(&self, _request_id: &str, user_id: &str) -> ServiceResult<UserInfo> {
            if user_id == "uA" {
                Ok(UserInfo {
                    user_id: "uA".to_string(),
                    nickname: "alice".to_string(),
                    ..Default::default()
                })
            } else {
                Err(ServiceError::Dependency("获取user服务失败".to_string()))
            }
        }

        async fn multi_user_info(
            &self,
            _request_id: &str,
            _user_ids: &[String],
        ) -> ServiceResult<HashMap<String, UserInfo>> {
            unimplemented!("not used by the transmit core")
        }
    }

    struct CapturingPublisher {
        accept: bool,
        payloads: Mutex<Vec<Vec<u8>>>,
    }

    impl CapturingPublisher {
        fn new(accept: bool) -> Self {
            Self {
                accept,
                payloads: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MessagePublisher for CapturingPublisher {
        async fn publish(&self, payload: &[u8]) -> bool {
            if self.accept {
                self.payloads.lock().push(payload.to_vec());
            }
            self.accept
        }
    }

    async fn service_with(
        publisher: Arc<CapturingPublisher>,
    ) -> (Database, TransmitService) {
        let db = Database::new(":memory:", 2).await.unwrap();
        db.members().append("s1", "uA").await.unwrap();
        db.members().append("s1", "uB").await.unwrap();
        let svc = TransmitService::new(db.clone(), Arc::new(FakeDirectory), publisher);
        (db, svc)
    }

    fn text_request(user_id: &str) -> NewMessageReq {
        NewMessageReq {
            request_id: "r2".to_string(),
            user_id: user_id.to_string(),
            chat_session_id: "s1".to_string(),
            message: MessageContent::Text {
                content: "hi".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn fan_out_publishes_envelope_and_lists_members() {
        let publisher = Arc::new(CapturingPublisher::new(true));
        let (_db, svc) = service_with(publisher.clone()).await;

        let rsp = svc.get_transmit_target(text_request("uA")).await;
        assert!(rsp.success);
        assert_eq!(rsp.request_id, "r2");

        let mut targets = rsp.target_id_list.clone();
        targets.sort();
        assert_eq!(targets, vec!["uA", "uB"]);

        let envelope = rsp.message.expect("envelope returned");
        assert_eq!(envelope.message_id.len(), 16);
        assert!(envelope.message_id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!((envelope.timestamp - now_seconds()).abs() <= 2);
        assert_eq!(envelope.sender.nickname, "alice");

        // Exactly one payload, byte-identical to the returned envelope.
        let payloads = publisher.payloads.lock();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0], envelope.to_bytes());
    }

    #[tokio::test]
    async fn unknown_sender_fails_with_user_service_error() {
        let publisher = Arc::new(CapturingPublisher::new(true));
        let (_db, svc) = service_with(publisher.clone()).await;

        let rsp = svc.get_transmit_target(text_request("ghost")).await;
        assert!(!rsp.success);
        assert_eq!(rsp.errmsg, "获取user服务失败");
        assert!(publisher.payloads.lock().is_empty());
    }

    #[tokio::test]
    async fn rejected_publish_fails_the_request() {
        let publisher = Arc::new(CapturingPublisher::new(false));
        let (_db, svc) = service_with(publisher).await;

        let rsp = svc.get_transmit_target(text_request("uA")).await;
        assert!(!rsp.success);
        assert_eq!(rsp.errmsg, "消息持久化失败");
    }

    #[tokio::test]
    async fn identical_requests_get_distinct_message_ids() {
        let publisher = Arc::new(CapturingPublisher::new(true));
        let (_db, svc) = service_with(publisher).await;

        let first = svc.get_transmit_target(text_request("uA")).await;
        let second = svc.get_transmit_target(text_request("uA")).await;
        assert_ne!(
            first.message.unwrap().message_id,
            second.message.unwrap().message_id
        );
    }
}
