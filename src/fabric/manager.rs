//! Routing of discovery events into per-service connection pools.
//!
//! The manager tracks an explicit focus set of service names; events for
//! anything else are dropped silently. Its mutex guards only the focus set
//! and the pool map - it is released before any channel call, so a slow
//! append can never head-of-line-block discovery dispatch or a concurrent
//! `pick`.

use super::channel::{ChannelOptions, RpcChannel, ServiceChannel};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

struct ManagerState {
    focus: HashSet<String>,
    pools: HashMap<String, Arc<ServiceChannel>>,
}

pub struct ServiceManager {
    opts: ChannelOptions,
    state: Mutex<ManagerState>,
}

impl ServiceManager {
    pub fn new(opts: ChannelOptions) -> Self {
        Self {
            opts,
            state: Mutex::new(ManagerState {
                focus: HashSet::new(),
                pools: HashMap::new(),
            }),
        }
    }

    /// Declare interest in a service; only focused services get pools.
    pub fn declare(&self, service_name: &str) {
        self.state.lock().focus.insert(service_name.to_string());
    }

    pub fn undeclare(&self, service_name: &str) {
        self.state.lock().focus.remove(service_name);
    }

    /// Discovery PUT: a replica of some service came online.
    ///
    /// `key` is the full instance key `<service>/<instance>`; the service
    /// name is everything up to the last `/` (the whole key if there is
    /// none).
    pub fn online(&self, key: &str, addr: &str) {
        let service_name = service_name_of(key);
        let pool = {
            let mut state = self.state.lock();
            if !state.focus.contains(service_name) {
                debug!(key, service = service_name, "ignoring unfocused service online");
                return;
            }
            state
                .pools
                .entry(service_name.to_string())
                .or_insert_with(|| {
                    Arc::new(ServiceChannel::new(service_name, self.opts))
                })
                .clone()
        };
        // Lock released: connection construction happens outside it.
        pool.append(addr);
    }

    /// Discovery DELETE: a replica went offline.
    pub fn offline(&self, key: &str, addr: &str) {
        let service_name = service_name_of(key);
        let pool = {
            let state = self.state.lock();
            if !state.focus.contains(service_name) {
                debug!(key, service = service_name, "ignoring unfocused service offline");
                return;
            }
            match state.pools.get(service_name) {
                Some(pool) => pool.clone(),
                None => {
                    warn!(key, service = service_name, "offline for service without a pool");
                    return;
                }
            }
        };
        pool.remove(addr);
    }

    /// Least-busy connection for `service_name`, or `None` when no replica
    /// is known. Callers dispatch the RPC with no manager lock held and
    /// report back through [`Self::complete`].
    pub fn pick(&self, service_name: &str) -> Option<RpcChannel> {
        let pool = self.state.lock().pools.get(service_name).cloned();
        match pool {
            Some(pool) => pool.pick(),
            None => {
                warn!(service = service_name, "no pool for service");
                None
            }
        }
    }

    /// Report a finished call on a connection handed out by [`Self::pick`].
    pub fn complete(&self, service_name: &str, conn: &RpcChannel) {
        let pool = self.state.lock().pools.get(service_name).cloned();
        if let Some(pool) = pool {
            pool.complete(conn);
        }
    }

    /// The pool itself, when a caller wants pick/complete pairing on one
    /// handle.
    pub fn pool(&self, service_name: &str) -> Option<Arc<ServiceChannel>> {
        self.state.lock().pools.get(service_name).cloned()
    }
}

/// Service name of an instance key: the prefix up to the last `/`, or the
/// whole key when there is no separator.
fn service_name_of(key: &str) -> &str {
    match key.rfind('/') {
        Some(idx) => &key[..idx],
        None => key,
    }
}
