//! Small shared helpers: id generation and password digests.

use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU16, Ordering};

/// Salt appended to passwords before hashing.
const PASSWORD_SALT: &str = "BreezeChat";

/// Generate a 16-hex-character id, unique within a process.
///
/// Six random bytes followed by a 16-bit wrapping process counter, so two
/// ids generated back-to-back can never collide even if the RNG repeats.
pub fn uuid16() -> String {
    static COUNTER: AtomicU16 = AtomicU16::new(0);

    let mut random = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut random);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);

    format!("{}{:04x}", hex::encode(random), seq)
}

/// Digest a password as `SHA-256(password || salt)`, rendered as 64 hex chars.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(PASSWORD_SALT.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current wall-clock time in whole seconds.
pub fn now_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}
