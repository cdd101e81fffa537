use sha2::{Digest, Sha256};

/// Digest stored in `user_sessions.token_hash`. Raw tokens are never persisted.
pub fn hash_session_token(token: &str) -> Vec<u8> {
    Sha256::digest(token.as_bytes()).to_vec()
}
