use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::{error, warn};

// Fixed work factor: ~19 MiB, two passes. Verification stays comfortably
// sub-second while remaining expensive enough for offline attacks.
const M_COST_KIB: u32 = 19 * 1024;
const T_COST: u32 = 2;
const P_COST: u32 = 1;

fn hasher() -> Argon2<'static> {
    let params =
        Params::new(M_COST_KIB, T_COST, P_COST, None).expect("fixed argon2 params are valid");
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Constant-time verification. A corrupted stored hash counts as a mismatch
/// rather than an error: login must not behave differently for a record with
/// a mangled hash than for a wrong password.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "stored password hash is malformed");
            return false;
        }
    };
    hasher().verify_password(plain.as_bytes(), &parsed).is_ok()
}

/// Hashing is deliberately slow; run it off the async scheduler threads.
pub async fn hash_password_blocking(plain: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&plain)).await?
}

/// See [`hash_password_blocking`]; a cancelled worker counts as a mismatch.
pub async fn verify_password_blocking(plain: String, hash: String) -> bool {
    tokio::task::spawn_blocking(move || verify_password(&plain, &hash))
        .await
        .unwrap_or(false)
}
