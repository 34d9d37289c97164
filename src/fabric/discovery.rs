//! Service discovery: snapshot seed plus ordered watch.
//!
//! On start, every key under the prefix is delivered to `on_put` from a
//! single list snapshot; the watch then begins at the snapshot revision + 1,
//! so no pre-existing key is ever re-delivered as a second PUT. Watch events
//! are dispatched synchronously, in store order, on the watch task -
//! callbacks forward into the ServiceManager and must return promptly.

use super::coord::{CoordClient, CoordError, CoordEvent};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// `(key, address)` callback used for both PUT and DELETE notifications.
pub type DiscoveryCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

pub struct Discovery {
    watcher: JoinHandle<()>,
}

impl Discovery {
    /// Seed the member set from a snapshot, then stream changes.
    ///
    /// A failed initial list is fatal: without the seed the caller would
    /// load-balance over an empty pool forever.
    pub async fn start(
        prefix: &str,
        coord: CoordClient,
        on_put: DiscoveryCallback,
        on_delete: DiscoveryCallback,
    ) -> Result<Self, CoordError> {
        let (entries, revision) = coord.list(prefix).await.inspect_err(
            |e| error!(prefix, error = %e, "discovery seed list failed"),
        )?;
        for (key, value) in &entries {
            on_put(key, value);
        }
        debug!(prefix, seeded = entries.len(), revision, "discovery seeded");

        let owned_prefix = prefix.to_string();
        let watcher = coord.watch(
            prefix,
            revision + 1,
            Arc::new(move |event| match event {
                CoordEvent::Put { key, value } => {
                    debug!(key, value, "discovery PUT");
                    on_put(&key, &value);
                }
                CoordEvent::Delete { key, prev_value } => {
                    debug!(key, prev_value, "discovery DELETE");
                    on_delete(&key, &prev_value);
                }
                // Membership reconciliation is idempotent (append replaces,
                // remove of an unknown endpoint warns), so a restart needs
                // no resync pass here.
                CoordEvent::Restarted => {
                    info!(prefix = %owned_prefix, "discovery watch restarted");
                }
            }),
        );
        Ok(Self { watcher })
    }
}

impl Drop for Discovery {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}
