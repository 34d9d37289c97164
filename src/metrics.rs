//! Prometheus metrics for the BreezeChat services.
//!
//! One process-wide registry; each binary calls [`init`] once at startup
//! when its metrics port is enabled and serves [`gather_metrics`] over HTTP.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

lazy_static! {
    /// Global Prometheus registry for all metrics.
    pub static ref REGISTRY: Registry = Registry::new();

    /// Total RPC requests handled by this instance.
    pub static ref RPC_REQUESTS: IntCounter = IntCounter::new(
        "breeze_rpc_requests_total",
        "RPC requests handled"
    ).unwrap();

    /// Total RPC requests answered with `success = false`.
    pub static ref RPC_FAILURES: IntCounter = IntCounter::new(
        "breeze_rpc_failures_total",
        "RPC requests answered with failure"
    ).unwrap();

    /// Total broker deliveries consumed by the storage pipeline.
    pub static ref CONSUMER_MESSAGES: IntCounter = IntCounter::new(
        "breeze_consumer_messages_total",
        "Broker deliveries consumed"
    ).unwrap();

    /// Total broker deliveries left unacked for redelivery.
    pub static ref CONSUMER_FAILURES: IntCounter = IntCounter::new(
        "breeze_consumer_failures_total",
        "Broker deliveries left for redelivery"
    ).unwrap();

    /// Users currently holding a login status entry.
    pub static ref ONLINE_USERS: IntGauge = IntGauge::new(
        "breeze_online_users",
        "Users currently online"
    ).unwrap();
}

/// Register every metric. Must be called once at startup before any metric
/// is recorded.
pub fn init() {
    REGISTRY.register(Box::new(RPC_REQUESTS.clone())).unwrap();
    REGISTRY.register(Box::new(RPC_FAILURES.clone())).unwrap();
    REGISTRY
        .register(Box::new(CONSUMER_MESSAGES.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(CONSUMER_FAILURES.clone()))
        .unwrap();
    REGISTRY.register(Box::new(ONLINE_USERS.clone())).unwrap();
}

/// Render every registered metric in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
