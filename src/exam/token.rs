//! Session tokens and the cache keys derived from them.

/// Random bytes per session token.
pub const SESSION_TOKEN_BYTES: usize = 16;

/// Mints an opaque token: 16 random bytes, hex-encoded.
pub fn generate_session_token() -> String {
    let bytes: [u8; SESSION_TOKEN_BYTES] = rand::random();
    hex::encode(bytes)
}

/// Cache key holding a session's answer buffer.
pub fn answer_buffer_key(token: &str) -> String {
    format!("exam_session:{}:answers", token)
}
