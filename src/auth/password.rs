use rand::RngCore;
use sha2::{Digest, Sha256};

use super::AuthError;

const RESET_TOKEN_BYTES: usize = 32;

/// bcrypt runs on the blocking pool; a cost-12 hash takes long enough to
/// stall a runtime worker.
pub async fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))?
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

pub async fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let password = password.to_owned();
    let hash = hash.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))?
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// A fresh reset token: the plain value goes to the user, only the digest is stored.
pub struct GeneratedResetToken {
    pub plain: String,
    pub digest: String,
}

pub fn generate_reset_token() -> GeneratedResetToken {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let plain = hex::encode(bytes);
    let digest = digest_reset_token(&plain);
    GeneratedResetToken { plain, digest }
}

pub fn digest_reset_token(plain: &str) -> String {
    hex::encode(Sha256::digest(plain.as_bytes()))
}
