//! Typed facade over the coordination store (etcd).
//!
//! Wraps `etcd-client` with the four operations the fabric needs: put under
//! a lease, prefix list at a revision, lease grant with background
//! keepalive, and prefix watch with previous values.

use etcd_client::{Client, EventType, GetOptions, PutOptions, WatchOptions, Watcher, WatchStream};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Errors surfaced by the coordination client.
#[derive(Debug, Error)]
pub enum CoordError {
    #[error("coordination store error: {0}")]
    Store(#[from] etcd_client::Error),
    #[error("non-utf8 key or value under {0}")]
    NonUtf8(String),
}

/// One watch-delivered change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordEvent {
    Put {
        key: String,
        value: String,
    },
    /// `prev_value` carries the value the key held before deletion; the
    /// watch is opened with previous KVs so it is always present.
    Delete {
        key: String,
        prev_value: String,
    },
    /// Sentinel: the watch stream broke and is being reopened. Observers
    /// must re-reconcile idempotently on the events that follow.
    Restarted,
}

/// A granted lease plus its background keepalive task.
///
/// Dropping the handle aborts the keepalive; the store then deletes every
/// key attached to the lease once the TTL lapses. [`CoordClient::revoke`]
/// releases the keys promptly instead.
pub struct LeaseHandle {
    lease_id: i64,
    keepalive: JoinHandle<()>,
}

impl LeaseHandle {
    pub fn lease_id(&self) -> i64 {
        self.lease_id
    }

    pub fn cancel(&self) {
        self.keepalive.abort();
    }
}

impl Drop for LeaseHandle {
    fn drop(&mut self) {
        self.keepalive.abort();
    }
}

/// Cheap-clone handle on the coordination store.
#[derive(Clone)]
pub struct CoordClient {
    client: Client,
}

impl CoordClient {
    pub async fn connect(endpoints: &[String]) -> Result<Self, CoordError> {
        let client = Client::connect(endpoints, None).await?;
        Ok(Self { client })
    }

    /// Put `key -> value` attached to `lease_id` (0 = no lease).
    pub async fn put(&self, key: &str, value: &str, lease_id: i64) -> Result<(), CoordError> {
        let options = if lease_id != 0 {
            Some(PutOptions::new().with_lease(lease_id))
        } else {
            None
        };
        self.client.clone().put(key, value, options).await?;
        Ok(())
    }

    /// Snapshot every `key -> value` under `prefix`, plus the store revision
    /// the snapshot was taken at.
    pub async fn list(&self, prefix: &str) -> Result<(Vec<(String, String)>, i64), CoordError> {
        let resp = self
            .client
            .clone()
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await?;
        let revision = resp.header().map(|h| h.revision()).unwrap_or(0);
        let mut entries = Vec::with_capacity(resp.kvs().len());
        for kv in resp.kvs() {
            let key = kv
                .key_str()
                .map_err(|_| CoordError::NonUtf8(prefix.to_string()))?;
            let value = kv
                .value_str()
                .map_err(|_| CoordError::NonUtf8(key.to_string()))?;
            entries.push((key.to_string(), value.to_string()));
        }
        Ok((entries, revision))
    }

    /// Grant a lease of `ttl` seconds and keep it alive until the handle is
    /// dropped or cancelled. The refresh interval stays well under ttl/2.
    pub async fn grant_lease(&self, ttl: i64) -> Result<LeaseHandle, CoordError> {
        let grant = self.client.clone().lease_grant(ttl, None).await?;
        let lease_id = grant.id();

        let (mut keeper, mut responses) = self.client.clone().lease_keep_alive(lease_id).await?;
        let interval = std::time::Duration::from_secs((ttl as u64 / 3).max(1));
        let keepalive = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if let Err(e) = keeper.keep_alive().await {
                    warn!(lease_id, error = %e, "lease keepalive send failed");
                    continue;
                }
                match responses.message().await {
                    Ok(Some(resp)) => {
                        debug!(lease_id, ttl = resp.ttl(), "lease refreshed");
                    }
                    Ok(None) => {
                        warn!(lease_id, "lease keepalive stream closed");
                        break;
                    }
                    Err(e) => {
                        warn!(lease_id, error = %e, "lease keepalive receive failed");
                    }
                }
            }
        });

        Ok(LeaseHandle { lease_id, keepalive })
    }

    /// Revoke a lease, deleting its keys promptly.
    pub async fn revoke(&self, lease_id: i64) -> Result<(), CoordError> {
        self.client.clone().lease_revoke(lease_id).await?;
        Ok(())
    }

    /// Open a raw prefix watch starting at `start_revision` (0 = now),
    /// delivering previous KVs on DELETE.
    async fn watch_raw(
        &self,
        prefix: &str,
        start_revision: i64,
    ) -> Result<(Watcher, WatchStream), CoordError> {
        let mut options = WatchOptions::new().with_prefix().with_prev_key();
        if start_revision > 0 {
            options = options.with_start_revision(start_revision);
        }
        let pair = self.client.clone().watch(prefix, Some(options)).await?;
        Ok(pair)
    }

    /// Watch `prefix` from `start_revision`, dispatching ordered events to
    /// `callback` on a dedicated task until the returned handle is dropped.
    ///
    /// When the underlying stream breaks, a [`CoordEvent::Restarted`]
    /// sentinel is delivered and the watch is reopened from the last seen
    /// revision + 1; observers must re-reconcile idempotently.
    pub fn watch(
        &self,
        prefix: &str,
        start_revision: i64,
        callback: WatchCallback,
    ) -> JoinHandle<()> {
        let coord = self.clone();
        let prefix = prefix.to_string();
        tokio::spawn(async move {
            let mut next_revision = start_revision;
            loop {
                let (_watcher, mut stream) = match coord.watch_raw(&prefix, next_revision).await {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(prefix, error = %e, "watch open failed; retrying");
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                        continue;
                    }
                };

                loop {
                    match stream.message().await {
                        Ok(Some(resp)) => {
                            if let Some(rev) = resp.header().map(|h| h.revision())
                                && rev >= next_revision
                            {
                                next_revision = rev + 1;
                            }
                            for event in resp.events() {
                                if let Some(ev) = decode_event(event) {
                                    callback(ev);
                                }
                            }
                        }
                        Ok(None) => {
                            warn!(prefix, "watch stream ended; reopening");
                            break;
                        }
                        Err(e) => {
                            warn!(prefix, error = %e, "watch stream error; reopening");
                            break;
                        }
                    }
                }

                callback(CoordEvent::Restarted);
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            }
        })
    }
}

/// Ordered event sink for [`CoordClient::watch`].
pub type WatchCallback = std::sync::Arc<dyn Fn(CoordEvent) + Send + Sync>;

/// Decode one etcd watch event into a [`CoordEvent`].
///
/// Returns `None` for events with undecodable payloads (logged and skipped)
/// so one bad key cannot wedge the watch loop.
fn decode_event(event: &etcd_client::Event) -> Option<CoordEvent> {
    let kv = event.kv()?;
    let key = match kv.key_str() {
        Ok(k) => k.to_string(),
        Err(_) => {
            warn!("skipping watch event with non-utf8 key");
            return None;
        }
    };
    match event.event_type() {
        EventType::Put => {
            let value = match kv.value_str() {
                Ok(v) => v.to_string(),
                Err(_) => {
                    warn!(key, "skipping PUT event with non-utf8 value");
                    return None;
                }
            };
            Some(CoordEvent::Put { key, value })
        }
        EventType::Delete => {
            let prev_value = match event.prev_kv().map(|p| p.value_str()) {
                Some(Ok(v)) => v.to_string(),
                _ => {
                    warn!(key, "DELETE event without previous value");
                    return None;
                }
            };
            Some(CoordEvent::Delete { key, prev_value })
        }
        #[allow(unreachable_patterns)]
        _ => None,
    }
}
