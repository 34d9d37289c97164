//! Integration test common infrastructure.
//!
//! Spawns in-process service routers on ephemeral ports and provides
//! in-memory stand-ins for the externally hosted stores (search index,
//! broker, email, classifier).

// Each integration test binary compiles this module and uses a subset.
#![allow(dead_code)]

use async_trait::async_trait;
use breezechatd::broker::MessagePublisher;
use breezechatd::fabric::{ChannelOptions, ServiceManager};
use breezechatd::ports::{AuditError, EmailError, EmailPort, TextAudit, Verdict};
use breezechatd::search::{MessageDoc, MessageIndexOps, SearchError, UserDoc, UserIndexOps};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

/// Serve a router on an ephemeral local port; returns the bound address.
pub async fn spawn_router(router: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve router");
    });
    addr
}

/// A manager already focused on `service` with one online replica.
pub fn manager_with_replica(service: &str, addr: SocketAddr) -> Arc<ServiceManager> {
    let manager = Arc::new(ServiceManager::new(ChannelOptions::default()));
    manager.declare(service);
    manager.online(&format!("{service}/i1"), &addr.to_string());
    manager
}

#[derive(Default)]
pub struct MemUserIndex {
    pub docs: Mutex<HashMap<String, UserDoc>>,
}

#[async_trait]
impl UserIndexOps for MemUserIndex {
    async fn upsert(&self, doc: &UserDoc) -> Result<(), SearchError> {
        self.docs.lock().insert(doc.user_id.clone(), doc.clone());
        Ok(())
    }

    async fn remove(&self, user_id: &str) -> Result<(), SearchError> {
        self.docs.lock().remove(user_id);
        Ok(())
    }

    async fn search(
        &self,
        key: &str,
        exclude_uids: &[String],
    ) -> Result<Vec<UserDoc>, SearchError> {
        Ok(self
            .docs
            .lock()
            .values()
            .filter(|d| d.nickname.contains(key) && !exclude_uids.contains(&d.user_id))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemMessageIndex {
    pub docs: Mutex<HashMap<String, MessageDoc>>,
}

#[async_trait]
impl MessageIndexOps for MemMessageIndex {
    async fn upsert(&self, doc: &MessageDoc) -> Result<(), SearchError> {
        self.docs.lock().insert(doc.message_id.clone(), doc.clone());
        Ok(())
    }

    async fn remove(&self, message_id: &str) -> Result<(), SearchError> {
        self.docs.lock().remove(message_id);
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

/// Records verification emails instead of sending them.
#[derive(Default)]
pub struct MemEmail {
    pub sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl EmailPort for MemEmail {
    async fn send_verify_code(&self, to: &str, code: &str) -> Result<(), EmailError> {
        self.sent.lock().push((to.to_string(), code.to_string()));
        Ok(())
    }
}

/// Approves everything.
pub struct OpenAudit;

#[async_trait]
impl TextAudit for OpenAudit {
    async fn classify(&self, _text: &str) -> Result<Verdict, AuditError> {
        Ok(Verdict::Compliant)
    }
}

/// Captures published payloads in memory.
#[derive(Default)]
pub struct CapturingPublisher {
    pub payloads: Mutex<Vec<Vec<u8>>>,
}

#[async_trait]
impl MessagePublisher for CapturingPublisher {
    async fn publish(&self, payload: &[u8]) -> bool {
        self.payloads.lock().push(payload.to_vec());
        true
    }
}
