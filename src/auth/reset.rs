use rand::RngCore;
use sha2::{Digest, Sha256};
use time::Duration;

/// Reset tokens are short-lived: minutes, not hours.
pub const RESET_TOKEN_TTL: Duration = Duration::minutes(10);

/// A freshly generated reset token. `raw` goes to the user out of band and is
/// never persisted; only `hash` is stored.
#[derive(Debug)]
pub struct ResetToken {
    pub raw: String,
    pub hash: String,
}

/// 256 bits from the OS RNG, hex-encoded for transport. The stored side is a
/// plain SHA-256 digest: the value is high-entropy and short-lived, so a fast
/// hash is the right tool here, not the adaptive password hasher.
pub fn generate() -> ResetToken {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let raw = hex::encode(bytes);
    let hash = hash_token(&raw);
    ResetToken { raw, hash }
}

/// Digest of a submitted raw value, for comparison against the stored hash.
pub fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}
