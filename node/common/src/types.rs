use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Advisor request status as stored by the oracle contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TryFrom<u8> for RequestStatus {
    type Error = crate::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Processing),
            2 => Ok(Self::Completed),
            3 => Ok(Self::Failed),
            other => Err(crate::Error::UnknownStatus(other)),
        }
    }
}

impl From<RequestStatus> for u8 {
    fn from(status: RequestStatus) -> Self {
        match status {
            RequestStatus::Pending => 0,
            RequestStatus::Processing => 1,
            RequestStatus::Completed => 2,
            RequestStatus::Failed => 3,
        }
    }
}

/// Pending unit of work read from the contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: u64,
    pub requester: Address,
    pub question: String,
    pub context_payload: String,
    /// Unix seconds as recorded on chain
    pub submitted_at: u64,
    pub status: RequestStatus,
}

/// Request/response commitment digests (lowercase hex SHA-256)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentPair {
    pub request_digest: String,
    pub response_digest: String,
}

/// Signing scheme reported by the inference backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningAlgorithm {
    Ecdsa,
    Other(String),
}

impl SigningAlgorithm {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ecdsa => "ecdsa",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for SigningAlgorithm {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("ecdsa") {
            Self::Ecdsa
        } else {
            Self::Other(value)
        }
    }
}

impl From<SigningAlgorithm> for String {
    fn from(value: SigningAlgorithm) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SigningAlgorithm {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SigningAlgorithm {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

/// Signature proof returned by the inference backend for one completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedProof {
    /// Text the backend actually signed, when it reports one
    #[serde(default)]
    pub text: Option<String>,
    /// 0x-prefixed 65-byte r||s||v
    pub signature: String,
    pub signing_address: String,
    pub signing_algo: SigningAlgorithm,
}

/// Record written back to the contract for a completed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationRecord {
    pub work_item_id: u64,
    pub request_digest: String,
    pub response_digest: String,
    pub signature: String,
    pub signer_address: String,
    pub algorithm: SigningAlgorithm,
    pub attestation_blob: String,
    pub response_text: String,
}
