//! Per-code secret derivation and verification.
//!
//! The server holds no per-provider state: a secret is `HMAC-SHA-256(master_key,
//! code)`, so anyone presenting a valid `(code, secret)` pair proves knowledge
//! of a value only this server's master key could have produced. Reconnects
//! bind to the same identity without a database.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Required length of the master key, in bytes.
pub const MASTER_KEY_LEN: usize = 32;

/// Derive the raw 32-byte secret for `code` under `master_key`.
pub fn derive_secret(master_key: &[u8; MASTER_KEY_LEN], code: &str) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(master_key).expect("HMAC accepts any key length");
    mac.update(code.as_bytes());
    mac.finalize().into_bytes().into()
}

/// Encode a derived secret as unpadded standard base64.
pub fn encode_secret(bytes: &[u8; 32]) -> String {
    STANDARD_NO_PAD.encode(bytes)
}

/// Verify that `presented` is the correct base64-encoded secret for `code`
/// under `master_key`. Decode failures and length mismatches are treated as
/// verification failure, not an error — callers don't need to distinguish.
pub fn verify_secret(master_key: &[u8; MASTER_KEY_LEN], code: &str, presented: &str) -> bool {
    let Ok(presented_bytes) = STANDARD_NO_PAD.decode(presented) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(master_key).expect("HMAC accepts any key length");
    mac.update(code.as_bytes());
    mac.verify_slice(&presented_bytes).is_ok()
}
