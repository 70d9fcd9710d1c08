use ethers::types::{Address, Signature};
use sha2::{Digest, Sha256};
use std::str::FromStr;

use crate::types::CommitmentPair;

/// Length of a hex-encoded SHA-256 digest
pub const DIGEST_HEX_LEN: usize = 64;

/// Compute SHA256 hash as lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

impl CommitmentPair {
    /// Commit to the exact request bytes sent and the exact response text received
    pub fn compute(request_bytes: &[u8], response_bytes: &[u8]) -> Self {
        Self {
            request_digest: sha256_hex(request_bytes),
            response_digest: sha256_hex(response_bytes),
        }
    }

    /// `<request>:<response>`, the text the inference backend signs
    pub fn canonical_text(&self) -> String {
        format!("{}:{}", self.request_digest, self.response_digest)
    }

    /// Split a signed text back into its digests.
    ///
    /// Returns `None` unless the text is exactly two hex digests joined by a colon.
    pub fn parse_canonical(text: &str) -> Option<Self> {
        let (request, response) = text.split_once(':')?;
        if !is_digest(request) || !is_digest(response) {
            return None;
        }

        Some(Self {
            request_digest: request.to_ascii_lowercase(),
            response_digest: response.to_ascii_lowercase(),
        })
    }
}

fn is_digest(s: &str) -> bool {
    s.len() == DIGEST_HEX_LEN && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Recover the EIP-191 personal-message signer of `text`
pub fn recover_signer(text: &str, signature: &str) -> Option<Address> {
    let sig = Signature::from_str(signature.trim()).ok()?;
    sig.recover(text).ok()
}

/// Verify an ECDSA personal-message signature against a claimed address.
///
/// Never fails: malformed signatures, malformed addresses and recovery
/// errors all yield `false`.
pub fn verify_signature(text: &str, signature: &str, claimed_address: &str) -> bool {
    match recover_signer(text, signature) {
        Some(recovered) => same_address(&recovered, claimed_address),
        None => false,
    }
}

fn same_address(recovered: &Address, claimed: &str) -> bool {
    let recovered = hex::encode(recovered.as_bytes());
    let claimed = claimed.trim();
    let claimed = claimed
        .strip_prefix("0x")
        .or_else(|| claimed.strip_prefix("0X"))
        .unwrap_or(claimed);

    recovered.eq_ignore_ascii_case(claimed)
}
