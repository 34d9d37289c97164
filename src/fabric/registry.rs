//! Instance registration under a refreshed lease.
//!
//! Each running replica owns one lease and publishes
//! `<service_name>/<instance_name> -> host:port` with it. While the process
//! lives, the keepalive refreshes the lease; on shutdown the lease is
//! revoked, the store deletes the key, and subscribers see a DELETE within
//! one watch round-trip.

use super::coord::{CoordClient, CoordError, LeaseHandle};
use tracing::{error, info};

pub struct Registry {
    service_name: String,
    coord: CoordClient,
    lease: LeaseHandle,
}

impl Registry {
    /// Grant the lease and start its keepalive.
    pub async fn new(
        service_name: &str,
        coord: CoordClient,
        ttl: i64,
    ) -> Result<Self, CoordError> {
        let lease = coord.grant_lease(ttl).await?;
        info!(
            service = service_name,
            lease_id = lease.lease_id(),
            ttl,
            "registry lease granted"
        );
        Ok(Self {
            service_name: service_name.to_string(),
            coord,
            lease,
        })
    }

    /// Publish this instance's address under the lease.
    pub async fn register(&self, instance: &str, addr: &str) -> Result<(), CoordError> {
        let key = format!("{}/{}", self.service_name, instance);
        self.coord
            .put(&key, addr, self.lease.lease_id())
            .await
            .inspect_err(|e| error!(key, addr, error = %e, "instance registration failed"))?;
        info!(key, addr, "instance registered");
        Ok(())
    }

    /// Cancel the keepalive and revoke the lease, releasing the instance key
    /// promptly. Dropping the registry without calling this still releases
    /// the key, but only after the lease TTL lapses.
    pub async fn shutdown(self) {
        self.lease.cancel();
        if let Err(e) = self.coord.revoke(self.lease.lease_id()).await {
            error!(
                service = %self.service_name,
                error = %e,
                "lease revoke failed; key will lapse with the TTL"
            );
        } else {
            info!(service = %self.service_name, "registry lease revoked");
        }
    }
}
