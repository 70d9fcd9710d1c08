//! Shared types, contract bindings and crypto for the BlindFold relayer.

pub mod contracts;
pub mod crypto;
pub mod types;

pub use types::*;

/// Errors decoding on-chain data
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown request status discriminant {0}")]
    UnknownStatus(u8),
}
