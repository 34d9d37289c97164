//! Opaque request/response ports to side services: outbound email, the
//! text-classifier moderation model and speech recognition.
//!
//! The cores depend on the traits; the HTTP/command implementations here
//! are the production bindings.

mod asr;
mod audit;
mod email;

pub use asr::{AsrError, AsrPort, HttpAsr};
pub use audit::{AuditError, LlmClassifier, TextAudit, Verdict};
pub use email::{EmailError, EmailPort, SendEmailCommand};
