//! Per-service connection pool ordered by in-flight load.
//!
//! A [`ServiceChannel`] keeps a min-heap of connections keyed by how many
//! calls are currently outstanding on each. `pick` pops the global minimum
//! and re-inserts it one busier; `complete` undoes that. Pools are small
//! (tens of replicas), so `remove` and `complete` scan the heap linearly.

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use thiserror::Error;
use tracing::{error, warn};

/// Errors from building or calling a connection.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("invalid endpoint address: {0}")]
    BadAddress(String),
    #[error("failed to build http client: {0}")]
    Build(reqwest::Error),
    #[error("transport error calling {0}: {1}")]
    Transport(String, reqwest::Error),
    #[error("{0} answered status {1}")]
    Status(String, u16),
}

/// Per-call behavior shared by every connection in a pool.
#[derive(Debug, Clone, Copy)]
pub struct ChannelOptions {
    /// Per-call deadline; `None` means no timeout (long-lived calls).
    pub timeout: Option<std::time::Duration>,
    /// Additional attempts after the first failed one.
    pub max_retry: u32,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            max_retry: 3,
        }
    }
}

impl ChannelOptions {
    /// Build from the config surface: `rpc_timeout_ms == 0` disables the
    /// deadline.
    pub fn from_config(rpc_timeout_ms: u64, max_retry: u32) -> Self {
        Self {
            timeout: (rpc_timeout_ms > 0).then(|| std::time::Duration::from_millis(rpc_timeout_ms)),
            max_retry,
        }
    }
}

/// A cheap-clone JSON-RPC connection to one replica.
///
/// Identity is the `host:port` endpoint; clones share the underlying HTTP
/// client and connection pool.
#[derive(Clone)]
pub struct RpcChannel {
    endpoint: String,
    base: String,
    http: reqwest::Client,
    max_retry: u32,
}

impl RpcChannel {
    /// Build a connection for `host:port`. No I/O happens here; the address
    /// is validated and the client configured.
    pub fn connect(addr: &str, opts: &ChannelOptions) -> Result<Self, ChannelError> {
        let base = format!("http://{addr}");
        reqwest::Url::parse(&base).map_err(|_| ChannelError::BadAddress(addr.to_string()))?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = opts.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ChannelError::Build)?;

        Ok(Self {
            endpoint: addr.to_string(),
            base,
            http,
            max_retry: opts.max_retry,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST a JSON request to `method`, retrying transport failures up to
    /// the configured budget.
    pub async fn post_json<Req, Rsp>(&self, method: &str, req: &Req) -> Result<Rsp, ChannelError>
    where
        Req: Serialize,
        Rsp: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base, method.trim_start_matches('/'));
        let mut last_err = None;
        for _ in 0..=self.max_retry {
            match self.http.post(&url).json(req).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<Rsp>()
                        .await
                        .map_err(|e| ChannelError::Transport(self.endpoint.clone(), e));
                }
                Ok(resp) => {
                    return Err(ChannelError::Status(
                        self.endpoint.clone(),
                        resp.status().as_u16(),
                    ));
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(ChannelError::Transport(
            self.endpoint.clone(),
            last_err.expect("at least one attempt was made"),
        ))
    }
}

impl std::fmt::Debug for RpcChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChannel")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Heap entry: a connection and its outstanding-call count.
#[derive(Clone)]
struct ChannelStatus {
    busy_level: u32,
    conn: RpcChannel,
}

impl PartialEq for ChannelStatus {
    fn eq(&self, other: &Self) -> bool {
        self.busy_level == other.busy_level && self.conn.endpoint == other.conn.endpoint
    }
}

impl Eq for ChannelStatus {}

impl PartialOrd for ChannelStatus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChannelStatus {
    fn cmp(&self, other: &Self) -> Ordering {
        // Busy level first; endpoint keeps ties deterministic within a pick.
        self.busy_level
            .cmp(&other.busy_level)
            .then_with(|| self.conn.endpoint.cmp(&other.conn.endpoint))
    }
}

struct ChannelSet {
    heap: BinaryHeap<Reverse<ChannelStatus>>,
    endpoints: HashMap<String, RpcChannel>,
}

/// Pool of connections for one service, always handing out a current
/// global minimum by busy level.
pub struct ServiceChannel {
    service_name: String,
    opts: ChannelOptions,
    inner: Mutex<ChannelSet>,
}

impl ServiceChannel {
    pub fn new(service_name: &str, opts: ChannelOptions) -> Self {
        Self {
            service_name: service_name.to_string(),
            opts,
            inner: Mutex::new(ChannelSet {
                heap: BinaryHeap::new(),
                endpoints: HashMap::new(),
            }),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Add a replica. A connection that fails to build is logged and the
    /// address treated as unusable; re-adding a known endpoint resets it to
    /// idle.
    pub fn append(&self, addr: &str) {
        let conn = match RpcChannel::connect(addr, &self.opts) {
            Ok(conn) => conn,
            Err(e) => {
                error!(
                    service = %self.service_name,
                    addr,
                    error = %e,
                    "failed to initialize channel"
                );
                return;
            }
        };

        let mut inner = self.inner.lock();
        if inner.endpoints.contains_key(addr) {
            // Replaced, e.g. a replica that bounced within one watch window.
            let kept: BinaryHeap<_> = inner
                .heap
                .drain()
                .filter(|Reverse(s)| s.conn.endpoint != addr)
                .collect();
            inner.heap = kept;
        }
        inner.endpoints.insert(addr.to_string(), conn.clone());
        inner.heap.push(Reverse(ChannelStatus {
            busy_level: 0,
            conn,
        }));
    }

    /// Drop a replica that went offline.
    pub fn remove(&self, addr: &str) {
        let mut inner = self.inner.lock();
        if inner.endpoints.remove(addr).is_none() {
            warn!(service = %self.service_name, addr, "remove of unknown channel");
            return;
        }
        let kept: BinaryHeap<_> = inner
            .heap
            .drain()
            .filter(|Reverse(s)| s.conn.endpoint != addr)
            .collect();
        inner.heap = kept;
    }

    /// Hand out the least-busy connection, counting the call against it.
    pub fn pick(&self) -> Option<RpcChannel> {
        let mut inner = self.inner.lock();
        let Reverse(mut status) = match inner.heap.pop() {
            Some(entry) => entry,
            None => {
                warn!(service = %self.service_name, "no replica available");
                return None;
            }
        };
        let conn = status.conn.clone();
        status.busy_level += 1;
        inner.heap.push(Reverse(status));
        Some(conn)
    }

    /// Mark a call on `conn` finished, making the replica less busy.
    pub fn complete(&self, conn: &RpcChannel) {
        let mut inner = self.inner.lock();
        let mut entries: Vec<ChannelStatus> =
            inner.heap.drain().map(|Reverse(s)| s).collect();
        for status in &mut entries {
            if status.conn.endpoint == conn.endpoint && status.busy_level > 0 {
                status.busy_level -= 1;
                break;
            }
        }
        inner.heap = entries.into_iter().map(Reverse).collect();
    }

    pub fn size(&self) -> usize {
        self.inner.lock().heap.len()
    }

    /// `(endpoint, busy_level)` snapshot, for logs and assertions.
    pub fn levels(&self) -> Vec<(String, u32)> {
        let inner = self.inner.lock();
        let mut levels: Vec<(String, u32)> = inner
            .heap
            .iter()
            .map(|Reverse(s)| (s.conn.endpoint.clone(), s.busy_level))
            .collect();
        levels.sort();
        levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn pool_with(addrs: &[&str]) -> ServiceChannel {
        let pool = ServiceChannel::new("echo", ChannelOptions::default());
        for addr in addrs {
            pool.append(addr);
        }
        pool
    }

    #[test]
    fn single_append_pick_returns_that_addr() {
        let pool = pool_with(&["1.1.1.1:9000"]);
        let conn = pool.pick().expect("one replica");
        assert_eq!(conn.endpoint(), "1.1.1.1:9000");
    }

    #[test]
    fn empty_pool_picks_none() {
        let pool = pool_with(&[]);
        assert!(pool.pick().is_none());
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn bad_address_is_discarded() {
        let pool = pool_with(&["not a host"]);
        assert_eq!(pool.size(), 0);
        assert!(pool.pick().is_none());
    }

    #[test]
    fn picks_cycle_through_all_replicas_before_reuse() {
        let pool = pool_with(&["a:1", "b:1", "c:1"]);

        let mut seen = HashSet::new();
        for _ in 0..3 {
            seen.insert(pool.pick().unwrap().endpoint().to_string());
        }
        assert_eq!(seen.len(), 3, "three picks hit three distinct replicas");

        // Fourth pick reuses one of them; everything now sits at level 1.
        let fourth = pool.pick().unwrap();
        assert!(seen.contains(fourth.endpoint()));
    }

    #[test]
    fn complete_makes_replica_preferred_again() {
        let pool = pool_with(&["a:1", "b:1", "c:1"]);

        let mut picked = Vec::new();
        for _ in 0..3 {
            picked.push(pool.pick().unwrap());
        }
        let a = picked
            .iter()
            .find(|c| c.endpoint() == "a:1")
            .expect("a was picked");

        pool.complete(a);
        assert_eq!(pool.pick().unwrap().endpoint(), "a:1");
    }

    #[test]
    fn busy_level_tracks_picks_minus_completes() {
        let pool = pool_with(&["a:1"]);
        let conn = pool.pick().unwrap();
        let _ = pool.pick().unwrap();
        let _ = pool.pick().unwrap();
        assert_eq!(pool.levels(), vec![("a:1".to_string(), 3)]);

        pool.complete(&conn);
        pool.complete(&conn);
        assert_eq!(pool.levels(), vec![("a:1".to_string(), 1)]);

        // Never below zero, even on spurious completes.
        pool.complete(&conn);
        pool.complete(&conn);
        assert_eq!(pool.levels(), vec![("a:1".to_string(), 0)]);
    }

    #[test]
    fn remove_drops_replica_from_rotation() {
        let pool = pool_with(&["a:1", "b:1"]);
        pool.remove("a:1");
        assert_eq!(pool.size(), 1);
        for _ in 0..4 {
            assert_eq!(pool.pick().unwrap().endpoint(), "b:1");
        }

        // Removing an unknown endpoint is a no-op.
        pool.remove("ghost:1");
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn reappend_resets_to_idle() {
        let pool = pool_with(&["a:1", "b:1"]);
        for _ in 0..4 {
            pool.pick().unwrap();
        }
        pool.append("a:1");
        assert_eq!(pool.size(), 2);
        // The re-added replica starts idle, so it is the global minimum.
        assert_eq!(pool.pick().unwrap().endpoint(), "a:1");
    }
}
