//! Storage core: the broker consumer that makes messages durable, plus the
//! history and search query surface.
//!
//! The consumer runs single-threaded in broker-delivered order. Per
//! delivery: parse (poison messages are acked and dropped), offload blob
//! payloads to the file service, index text bodies, insert the relational
//! row, and acknowledge only on full success. A relational failure after an
//! index write triggers a compensating index delete; the `message_id`
//! unique index makes the inevitable redeliveries insert at most once.

use crate::broker::BrokerConsumer;
use crate::db::{Database, DbError, MessageRecord};
use crate::error::{ServiceError, ServiceResult};
use crate::metrics;
use crate::rpc::{
    BlobPort, GetHistoryMsgReq, GetHistoryMsgRsp, GetRecentMsgReq, GetRecentMsgRsp, MessageContent,
    MessageInfo, MessageKind, MsgSearchReq, MsgSearchRsp, UserDirectory,
};
use crate::search::{MessageDoc, MessageIndexOps};
use crate::util::uuid16;
use async_trait::async_trait;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{error, info};

pub struct StorageService {
    db: Database,
    index: Arc<dyn MessageIndexOps>,
    users: Arc<dyn UserDirectory>,
    blobs: Arc<dyn BlobPort>,
}

impl StorageService {
    pub fn new(
        db: Database,
        index: Arc<dyn MessageIndexOps>,
        users: Arc<dyn UserDirectory>,
        blobs: Arc<dyn BlobPort>,
    ) -> Self {
        Self {
            db,
            index,
            users,
            blobs,
        }
    }

    // ------------------------------------------------------------------
    // Consumer side
    // ------------------------------------------------------------------

    /// Persist one envelope. `Err(())` means "do not ack": the broker will
    /// redeliver and the operation retries from the top.
    async fn persist_envelope(&self, envelope: &MessageInfo) -> Result<(), ()> {
        let mut record = MessageRecord {
            message_id: envelope.message_id.clone(),
            user_id: envelope.sender.user_id.clone(),
            session_id: envelope.chat_session_id.clone(),
            message_type: envelope.message.kind().as_i64(),
            create_time: envelope.timestamp,
            ..Default::default()
        };

        let mut indexed = false;
        match &envelope.message {
            MessageContent::Text { content } => {
                let doc = MessageDoc {
                    message_id: envelope.message_id.clone(),
                    user_id: envelope.sender.user_id.clone(),
                    chat_session_id: envelope.chat_session_id.clone(),
                    create_time: envelope.timestamp,
                    content: content.clone(),
                };
                if let Err(e) = self.index.upsert(&doc).await {
                    error!(
                        message_id = %envelope.message_id,
                        error = %e,
                        "message index write failed"
                    );
                    return Err(());
                }
                indexed = true;
                record.content = Some(content.clone());
            }
            MessageContent::File {
                file_name,
                file_size,
                content,
                ..
            } => {
                let info = self.put_blob(file_name, content).await?;
                record.file_id = Some(info);
                record.file_name = Some(file_name.clone());
                record.file_size = Some(*file_size as i64);
            }
            MessageContent::Image { content, .. } | MessageContent::Speech { content, .. } => {
                let info = self.put_blob("", content).await?;
                record.file_id = Some(info);
            }
        }

        match self.db.messages().insert(&record).await {
            Ok(()) => Ok(()),
            Err(DbError::Duplicate(_)) => {
                // A redelivered envelope that already made it to the store.
                info!(message_id = %envelope.message_id, "duplicate delivery already persisted");
                Ok(())
            }
            Err(e) => {
                error!(
                    message_id = %envelope.message_id,
                    error = %e,
                    "message row insert failed"
                );
                if indexed {
                    if let Err(e) = self.index.remove(&envelope.message_id).await {
                        error!(
                            critical = true,
                            message_id = %envelope.message_id,
                            error = %e,
                            "index compensation failed; stores are inconsistent"
                        );
                    }
                }
                Err(())
            }
        }
    }

    /// Offload a payload to the file service. A failed put leaves the
    /// delivery unacked; the envelope still carries the bytes, so the
    /// redelivered attempt retries the offload.
    async fn put_blob(&self, file_name: &str, content: &[u8]) -> Result<String, ()> {
        match self
            .blobs
            .put(&uuid16(), file_name, content.to_vec())
            .await
        {
            Ok(info) => Ok(info.file_id),
            Err(e) => {
                e.observe("consumer");
                Err(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Query side
    // ------------------------------------------------------------------

    /// Resolve records into full envelopes: batch-fetch the referenced blobs
    /// and the sender profiles, failing the whole call when either batch
    /// comes back incomplete.
    async fn assemble(
        &self,
        request_id: &str,
        records: Vec<MessageRecord>,
    ) -> ServiceResult<Vec<MessageInfo>> {
        let file_ids: Vec<String> = records
            .iter()
            .filter_map(|r| r.file_id.clone())
            .collect();
        let file_data = self
            .blobs
            .get_multi(request_id, &file_ids)
            .await
            .map_err(|e| {
                e.observe(request_id);
                ServiceError::Dependency("获取文件内容失败".to_string())
            })?;

        let user_ids: Vec<String> = records.iter().map(|r| r.user_id.clone()).collect();
        let users = self
            .users
            .multi_user_info(request_id, &user_ids)
            .await
            .map_err(|e| {
                e.observe(request_id);
                ServiceError::Dependency("获取用户信息失败".to_string())
            })?;

        let mut envelopes = Vec::with_capacity(records.len());
        for record in records {
            let Some(kind) = MessageKind::from_i64(record.message_type) else {
                // A discriminator outside the enum means corrupted storage.
                error!(
                    message_id = %record.message_id,
                    message_type = record.message_type,
                    "unknown message type in store"
                );
                std::process::exit(1);
            };
            let sender = users
                .get(&record.user_id)
                .cloned()
                .ok_or_else(|| ServiceError::Dependency("获取用户信息失败".to_string()))?;

            let blob = |file_id: &Option<String>| -> Vec<u8> {
                file_id
                    .as_deref()
                    .and_then(|id| file_data.get(id))
                    .cloned()
                    .unwrap_or_default()
            };

            let message = match kind {
                MessageKind::Text => MessageContent::Text {
                    content: record.content.clone().unwrap_or_default(),
                },
                MessageKind::File => MessageContent::File {
                    content: blob(&record.file_id),
                    file_id: record.file_id.clone().unwrap_or_default(),
                    file_name: record.file_name.clone().unwrap_or_default(),
                    file_size: record.file_size.unwrap_or(0) as u64,
                },
                MessageKind::Image => MessageContent::Image {
                    content: blob(&record.file_id),
                    file_id: record.file_id.clone().unwrap_or_default(),
                },
                MessageKind::Speech => MessageContent::Speech {
                    content: blob(&record.file_id),
                    file_id: record.file_id.clone().unwrap_or_default(),
                },
            };

            envelopes.push(MessageInfo {
                message_id: record.message_id,
                chat_session_id: record.session_id,
                timestamp: record.create_time,
                sender,
                message,
            });
        }
        Ok(envelopes)
    }

    pub async fn get_history(&self, req: GetHistoryMsgReq) -> GetHistoryMsgRsp {
        let records = match self
            .db
            .messages()
            .range(&req.chat_session_id, req.start_time, req.over_time)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                error!(request_id = %req.request_id, error = %e, "history query failed");
                return GetHistoryMsgRsp {
                    request_id: req.request_id,
                    success: false,
                    errmsg: "获取历史消息失败".to_string(),
                    ..Default::default()
                };
            }
        };
        match self.assemble(&req.request_id, records).await {
            Ok(msg_list) => GetHistoryMsgRsp {
                request_id: req.request_id,
                success: true,
                msg_list,
                ..Default::default()
            },
            Err(e) => GetHistoryMsgRsp {
                request_id: req.request_id,
                success: false,
                errmsg: e.errmsg().to_string(),
                ..Default::default()
            },
        }
    }

    pub async fn get_recent(&self, req: GetRecentMsgReq) -> GetRecentMsgRsp {
        let messages = self.db.messages();
        let result = if req.cur_time > 0 {
            messages
                .recent_before(&req.chat_session_id, req.msg_count, req.cur_time)
                .await
        } else {
            messages.recent(&req.chat_session_id, req.msg_count).await
        };
        let records = match result {
            Ok(records) => records,
            Err(e) => {
                error!(request_id = %req.request_id, error = %e, "recent query failed");
                return GetRecentMsgRsp {
                    request_id: req.request_id,
                    success: false,
                    errmsg: "获取最近消息失败".to_string(),
                    ..Default::default()
                };
            }
        };
        match self.assemble(&req.request_id, records).await {
            Ok(msg_list) => GetRecentMsgRsp {
                request_id: req.request_id,
                success: true,
                msg_list,
                ..Default::default()
            },
            Err(e) => GetRecentMsgRsp {
                request_id: req.request_id,
                success: false,
                errmsg: e.errmsg().to_string(),
                ..Default::default()
            },
        }
    }

    /// Full-text search over a session's text messages. Hits come back from
    /// the index; sender profiles are resolved through the user service.
    pub async fn search(&self, req: MsgSearchReq) -> MsgSearchRsp {
        let docs = match self
            .index
            .search(&req.chat_session_id, &req.search_key)
            .await
        {
            Ok(docs) => docs,
            Err(e) => {
                error!(request_id = %req.request_id, error = %e, "message search failed");
                return MsgSearchRsp {
                    request_id: req.request_id,
                    success: false,
                    errmsg: "消息搜索失败".to_string(),
                    ..Default::default()
                };
            }
        };

        let user_ids: Vec<String> = docs.iter().map(|d| d.user_id.clone()).collect();
        let users = match self.users.multi_user_info(&req.request_id, &user_ids).await {
            Ok(users) => users,
            Err(e) => {
                e.observe(&req.request_id);
                return MsgSearchRsp {
                    request_id: req.request_id,
                    success: false,
                    errmsg: "获取用户信息失败".to_string(),
                    ..Default::default()
                };
            }
        };

        let mut msg_list = Vec::with_capacity(docs.len());
        for doc in docs {
            let Some(sender) = users.get(&doc.user_id).cloned() else {
                return MsgSearchRsp {
                    request_id: req.request_id,
                    success: false,
                    errmsg: "获取用户信息失败".to_string(),
                    ..Default::default()
                };
            };
            msg_list.push(MessageInfo {
                message_id: doc.message_id,
                chat_session_id: doc.chat_session_id,
                timestamp: doc.create_time,
                sender,
                message: MessageContent::Text {
                    content: doc.content,
                },
            });
        }

        MsgSearchRsp {
            request_id: req.request_id,
            success: true,
            msg_list,
            ..Default::default()
        }
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/GetHistoryMsg", post(get_history))
            .route("/GetRecentMsg", post(get_recent))
            .route("/MsgSearch", post(msg_search))
            .with_state(self)
    }
}

#[async_trait]
impl BrokerConsumer for StorageService {
    async fn handle(&self, payload: &[u8]) -> Result<(), ()> {
        metrics::CONSUMER_MESSAGES.inc();
        let envelope = match MessageInfo::from_bytes(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                // Poison containment: ack and drop, or the queue wedges.
                error!(error = %e, "envelope parse failed; dropping delivery");
                return Ok(());
            }
        };
        match self.persist_envelope(&envelope).await {
            Ok(()) => Ok(()),
            Err(()) => {
                metrics::CONSUMER_FAILURES.inc();
                Err(())
            }
        }
    }
}

async fn get_history(
    State(svc): State<Arc<StorageService>>,
    Json(req): Json<GetHistoryMsgReq>,
) -> Json<GetHistoryMsgRsp> {
    metrics::RPC_REQUESTS.inc();
    let rsp = svc.get_history(req).await;
    if !rsp.success {
        metrics::RPC_FAILURES.inc();
    }
    Json(rsp)
}

async fn get_recent(
    State(svc): State<Arc<StorageService>>,
    Json(req): Json<GetRecentMsgReq>,
) -> Json<GetRecentMsgRsp> {
    metrics::RPC_REQUESTS.inc();
    let rsp = svc.get_recent(req).await;
    if !rsp.success {
        metrics::RPC_FAILURES.inc();
    }
    Json(rsp)
}

async fn msg_search(
    State(svc): State<Arc<StorageService>>,
    Json(req): Json<MsgSearchReq>,
) -> Json<MsgSearchRsp> {
    metrics::RPC_REQUESTS.inc();
    let rsp = svc.search(req).await;
    if !rsp.success {
        metrics::RPC_FAILURES.inc();
    }
    Json(rsp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{FileInfo, UserInfo};
    use crate::search::SearchError;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    // ------------------------------------------------------------------
    // Fakes
    // ------------------------------------------------------------------

    #[derive(Default)]
    struct MemIndex {
        fail_upserts: bool,
        docs: Mutex<HashMap<String, MessageDoc>>,
        removed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MessageIndexOps for MemIndex {
        async fn upsert(&self, doc: &MessageDoc) -> Result<(), SearchError> {
            if self.fail_upserts {
                return Err(SearchError::Backend("index down".to_string()));
            }
            self.docs.lock().insert(doc.message_id.clone(), doc.clone());
            Ok(())
        }

        async fn remove(&self, message_id: &str) -> Result<(), SearchError> {
            self.docs.lock().remove(message_id);
            self.removed.lock().push(message_id.to_string());
            Ok(())
        }

        async fn search(
            &self,
            chat_session_id: &str,
            key: &str,
        ) -> Result<Vec<MessageDoc>, SearchError> {
            Ok(self
                .docs
                .lock()
                .values()
                .filter(|d| d.chat_session_id == chat_session_id && d.content.contains(key))
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct MemBlobs {
        fail_puts: bool,
        blobs: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl BlobPort for MemBlobs {
        async fn put(
            &self,
            _request_id: &str,
            file_name: &str,
            content: Vec<u8>,
        ) -> ServiceResult<FileInfo> {
            if self.fail_puts {
                return Err(ServiceError::Dependency("文件上传失败".to_string()));
            }
            let file_id = uuid16();
            let file_size = content.len() as u64;
            self.blobs.lock().insert(file_id.clone(), content);
            Ok(FileInfo {
                file_id,
                file_name: file_name.to_string(),
                file_size,
            })
        }

        async fn get(&self, _request_id: &str, file_id: &str) -> ServiceResult<Vec<u8>> {
            self.blobs
                .lock()
                .get(file_id)
                .cloned()
                .ok_or_else(|| ServiceError::Dependency("获取文件内容失败".to_string()))
        }

        async fn get_multi(
            &self,
            _request_id: &str,
            file_ids: &[String],
        ) -> ServiceResult<HashMap<String, Vec<u8>>> {
            let blobs = self.blobs.lock();
            let mut out = HashMap::new();
            for id in file_ids {
                let content = blobs
                    .get(id)
                    .cloned()
                    .ok_or_else(|| ServiceError::Dependency("获取文件内容失败".to_string()))?;
                out.insert(id.clone(), content);
            }
            Ok(out)
        }
    }

    struct MemDirectory;

    #[async_trait]
    impl UserDirectory for MemDirectory {
        async fn user_info(&self, _request_id: &str, user_id: &str) -> ServiceResult<UserInfo> {
            Ok(UserInfo {
                user_id: user_id.to_string(),
                nickname: format!("nick-{user_id}"),
                ..Default::default()
            })
        }

        async fn multi_user_info(
            &self,
            _request_id: &str,
            user_ids: &[String],
        ) -> ServiceResult<HashMap<String, UserInfo>> {
            Ok(user_ids
                .iter()
                .map(|id| {
                    (
                        id.clone(),
                        UserInfo {
                            user_id: id.clone(),
                            nickname: format!("nick-{id}"),
                            ..Default::default()
                        },
                    )
                })
                .collect())
        }
    }

    async fn service(
        index: Arc<MemIndex>,
        blobs: Arc<MemBlobs>,
    ) -> (Database, StorageService) {
        let db = Database::new(":memory:", 2).await.unwrap();
        let svc = StorageService::new(db.clone(), index, Arc::new(MemDirectory), blobs);
        (db, svc)
    }

    fn text_envelope(message_id: &str, content: &str) -> MessageInfo {
        MessageInfo {
            message_id: message_id.to_string(),
            chat_session_id: "s1".to_string(),
            timestamp: 1_700_000_000,
            sender: UserInfo {
                user_id: "uA".to_string(),
                ..Default::default()
            },
            message: MessageContent::Text {
                content: content.to_string(),
            },
        }
    }

    // ------------------------------------------------------------------
    // Consumer
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn text_message_lands_in_index_and_store() {
        let index = Arc::new(MemIndex::default());
        let blobs = Arc::new(MemBlobs::default());
        let (db, svc) = service(index.clone(), blobs).await;

        let envelope = text_envelope("m1", "吃的盖浇饭！");
        assert!(svc.handle(&envelope.to_bytes()).await.is_ok());

        assert!(index.docs.lock().contains_key("m1"));
        let rows = db.messages().recent("s1", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message_id, "m1");
        assert_eq!(rows[0].content.as_deref(), Some("吃的盖浇饭！"));

        // S5: the indexed body is findable by substring within the session.
        let rsp = svc
            .search(MsgSearchReq {
                request_id: "r3".to_string(),
                chat_session_id: "s1".to_string(),
                search_key: "盖浇".to_string(),
            })
            .await;
        assert!(rsp.success);
        assert_eq!(rsp.msg_list.len(), 1);
        assert_eq!(rsp.msg_list[0].message_id, "m1");
    }

    #[tokio::test]
    async fn poison_payload_is_acked_and_dropped() {
        let index = Arc::new(MemIndex::default());
        let blobs = Arc::new(MemBlobs::default());
        let (db, svc) = service(index, blobs).await;

        assert!(svc.handle(b"definitely not an envelope").await.is_ok());
        assert!(db.messages().recent("s1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn index_failure_leaves_delivery_unacked() {
        let index = Arc::new(MemIndex {
            fail_upserts: true,
            ..Default::default()
        });
        let blobs = Arc::new(MemBlobs::default());
        let (db, svc) = service(index, blobs).await;

        let envelope = text_envelope("m1", "hi");
        assert!(svc.handle(&envelope.to_bytes()).await.is_err());
        assert!(db.messages().recent("s1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn image_payload_is_offloaded_to_blob_store() {
        let index = Arc::new(MemIndex::default());
        let blobs = Arc::new(MemBlobs::default());
        let (db, svc) = service(index.clone(), blobs.clone()).await;

        let envelope = MessageInfo {
            message: MessageContent::Image {
                file_id: String::new(),
                content: vec![0xff, 0xd8, 0xff],
            },
            ..text_envelope("m2", "")
        };
        assert!(svc.handle(&envelope.to_bytes()).await.is_ok());

        let rows = db.messages().recent("s1", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        let file_id = rows[0].file_id.clone().expect("image row carries a file id");
        assert_eq!(blobs.blobs.lock()[&file_id], vec![0xff, 0xd8, 0xff]);
        // Images are not indexed.
        assert!(index.docs.lock().is_empty());
    }

    #[tokio::test]
    async fn blob_put_failure_leaves_delivery_unacked() {
        let index = Arc::new(MemIndex::default());
        let blobs = Arc::new(MemBlobs {
            fail_puts: true,
            ..Default::default()
        });
        let (db, svc) = service(index, blobs).await;

        let envelope = MessageInfo {
            message: MessageContent::Speech {
                file_id: String::new(),
                content: vec![1, 2, 3],
            },
            ..text_envelope("m3", "")
        };
        assert!(svc.handle(&envelope.to_bytes()).await.is_err());
        assert!(db.messages().recent("s1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn insert_failure_compensates_the_index_write() {
        let index = Arc::new(MemIndex::default());
        let blobs = Arc::new(MemBlobs::default());
        let (db, svc) = service(index.clone(), blobs).await;

        // Break the relational store after the index write path is set up.
        sqlx::query("DROP TABLE message")
            .execute(db.pool())
            .await
            .unwrap();

        let envelope = text_envelope("m4", "hello");
        assert!(svc.handle(&envelope.to_bytes()).await.is_err());

        // The compensating delete removed the document written in step one.
        assert!(!index.docs.lock().contains_key("m4"));
        assert_eq!(index.removed.lock().as_slice(), ["m4"]);
    }

    #[tokio::test]
    async fn redelivered_envelope_inserts_at_most_once() {
        let index = Arc::new(MemIndex::default());
        let blobs = Arc::new(MemBlobs::default());
        let (db, svc) = service(index, blobs).await;

        let envelope = text_envelope("m5", "hello");
        assert!(svc.handle(&envelope.to_bytes()).await.is_ok());
        // Second delivery of the same payload acks without a second row.
        assert!(svc.handle(&envelope.to_bytes()).await.is_ok());

        let rows = db.messages().recent("s1", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    // ------------------------------------------------------------------
    // Query surface
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn recent_and_history_resolve_senders_and_blobs() {
        let index = Arc::new(MemIndex::default());
        let blobs = Arc::new(MemBlobs::default());
        let (_db, svc) = service(index, blobs).await;

        for (id, t, text) in [("m1", 100, "one"), ("m2", 200, "two"), ("m3", 300, "three")] {
            let envelope = MessageInfo {
                timestamp: t,
                ..text_envelope(id, text)
            };
            svc.handle(&envelope.to_bytes()).await.unwrap();
        }
        let image = MessageInfo {
            timestamp: 400,
            message: MessageContent::Image {
                file_id: String::new(),
                content: vec![7, 7],
            },
            ..text_envelope("m4", "")
        };
        svc.handle(&image.to_bytes()).await.unwrap();

        let recent = svc
            .get_recent(GetRecentMsgReq {
                request_id: "r1".to_string(),
                chat_session_id: "s1".to_string(),
                msg_count: 2,
                cur_time: 0,
            })
            .await;
        assert!(recent.success);
        assert_eq!(recent.msg_list.len(), 2);
        assert_eq!(recent.msg_list[1].message_id, "m4");
        assert_eq!(recent.msg_list[1].sender.nickname, "nick-uA");
        match &recent.msg_list[1].message {
            MessageContent::Image { content, file_id } => {
                assert_eq!(content, &vec![7, 7]);
                assert!(!file_id.is_empty());
            }
            other => panic!("expected image, got {other:?}"),
        }

        let history = svc
            .get_history(GetHistoryMsgReq {
                request_id: "r2".to_string(),
                chat_session_id: "s1".to_string(),
                start_time: 150,
                over_time: 300,
            })
            .await;
        assert!(history.success);
        let ids: Vec<&str> = history.msg_list.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["m2", "m3"]);
    }

    #[tokio::test]
    async fn recent_honors_cur_time_bound() {
        let index = Arc::new(MemIndex::default());
        let blobs = Arc::new(MemBlobs::default());
        let (_db, svc) = service(index, blobs).await;

        for (id, t) in [("m1", 100), ("m2", 200), ("m3", 300)] {
            let envelope = MessageInfo {
                timestamp: t,
                ..text_envelope(id, "x")
            };
            svc.handle(&envelope.to_bytes()).await.unwrap();
        }

        let rsp = svc
            .get_recent(GetRecentMsgReq {
                request_id: "r1".to_string(),
                chat_session_id: "s1".to_string(),
                msg_count: 5,
                cur_time: 250,
            })
            .await;
        assert!(rsp.success);
        let ids: Vec<&str> = rsp.msg_list.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }
}
