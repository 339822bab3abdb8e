//! HMAC-SHA256 webhook signatures (`X-Hub-Signature-256: sha256=<hex>`).

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of the signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Signature verification failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature header missing")]
    Missing,

    #[error("invalid signature format: {0}")]
    InvalidFormat(String),

    #[error("signature verification failed")]
    Mismatch,
}

/// Verify `header` against the HMAC of `body`. Comparison is constant time.
pub fn verify_signature(
    secret: &[u8],
    body: &[u8],
    header: Option<&str>,
) -> Result<(), SignatureError> {
    let header = header.map(str::trim).filter(|h| !h.is_empty());
    let Some(header) = header else {
        return Err(SignatureError::Missing);
    };
    let hex_digest = header.strip_prefix(SIGNATURE_PREFIX).ok_or_else(|| {
        SignatureError::InvalidFormat(format!("expected {SIGNATURE_PREFIX}<hex>"))
    })?;
    let expected = hex::decode(hex_digest)
        .map_err(|e| SignatureError::InvalidFormat(format!("bad hex digest: {e}")))?;

    let mut mac = new_mac(secret);
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

/// Produce the header value for `body`, as the sender would.
pub fn sign_payload(secret: &[u8], body: &[u8]) -> String {
    let mut mac = new_mac(secret);
    mac.update(body);
    format!(
        "{SIGNATURE_PREFIX}{}",
        hex::encode(mac.finalize().into_bytes())
    )
}

fn new_mac(secret: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length; `new_from_slice` cannot fail for it.
    <HmacSha256 as Mac>::new_from_slice(secret)
        .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"))
}
