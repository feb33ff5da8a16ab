//! Message-ID generation and normalization.
//!
//! Ids are stored and compared without angle brackets; the brackets are only
//! added when the id is written into a header.

use sha2::{Digest, Sha256};

use super::error::{EmailError, Result};

/// Domain used when the sender address has none.
pub const FALLBACK_DOMAIN: &str = "replyroll.local";

/// Generates `<unix-timestamp>.<16 hex chars>@<domain>` (normalized form).
/// The hex part is 64 bits from the OS random source.
pub fn generate_message_id(sender_address: &str) -> Result<String> {
    let mut bytes = [0u8; 8];
    getrandom::fill(&mut bytes)
        .map_err(|e| EmailError::ComposeError(format!("random source unavailable: {}", e)))?;
    let random: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();

    Ok(format!(
        "{}.{}@{}",
        chrono::Utc::now().timestamp(),
        random,
        sender_domain(sender_address)
    ))
}

/// The part after `@` of an address, or [`FALLBACK_DOMAIN`].
pub fn sender_domain(address: &str) -> &str {
    match address.trim().trim_end_matches('>').rsplit_once('@') {
        Some((_, domain)) if !domain.trim().is_empty() => domain.trim(),
        _ => FALLBACK_DOMAIN,
    }
}

/// Strips surrounding whitespace and angle brackets.
pub fn normalize_message_id(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_string()
}

/// Stable id for a message that arrived without a Message-ID, derived from
/// its bytes so that re-fetching it yields the same id.
/// The first 128 bits of the SHA-256 digest are used, so the id does not
/// depend on the toolchain or platform.
pub fn fallback_message_id(raw: &[u8]) -> String {
    let digest = Sha256::digest(raw);
    let hex: String = digest[..16].iter().map(|b| format!("{:02x}", b)).collect();
    format!("missing-{}@{}", hex, FALLBACK_DOMAIN)
}
