//! Device identifier minting for exported sessions.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generates a fresh device identifier for a completed login.
///
/// The identifier is a random UUID joined with a 16-hex-digit digest of the
/// attempt's user agent: unique per login, stable in shape.
#[must_use]
pub fn generate_device_id(user_agent: &str) -> String {
    let digest = Sha256::digest(user_agent.as_bytes());
    let suffix: String = digest
        .iter()
        .take(8)
        .map(|byte| format!("{byte:02x}"))
        .collect();
    format!("{}-{suffix}", Uuid::new_v4())
}
