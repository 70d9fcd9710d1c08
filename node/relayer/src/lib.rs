//! BlindFold relayer: resumes on-chain advisor requests with verified TEE inference.
//!
//! The scheduler polls the oracle contract for pending requests and hands each
//! one to the processor, which marks it, runs inference, commits to the exact
//! request/response bytes, checks the backend's signature and writes the
//! verification record back.

pub mod backoff;
pub mod chain;
pub mod config;
pub mod error;
pub mod health;
pub mod inference;
pub mod processor;
pub mod scheduler;
pub mod status;

pub use chain::{ChainGateway, OracleContractClient};
pub use inference::{Completion, InferenceClient, InferenceGateway};
pub use processor::{ProcessOutcome, ProcessorConfig, RequestProcessor};
pub use scheduler::{Scheduler, TickOutcome};
pub use status::RelayerStatus;
