//! The logical RPC surface: request/response DTOs shared by servers and
//! clients, plus the typed clients that call through the load-balancer
//! fabric.

mod client;
mod types;

pub use client::{BlobPort, FileClient, UserClient, UserDirectory};
pub use types::*;
