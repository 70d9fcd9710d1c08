use blindfold_common::{
    crypto::{sha256_hex, verify_signature},
    CommitmentPair, SignedProof, SigningAlgorithm, VerificationRecord, WorkItem,
};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::chain::ChainGateway;
use crate::error::ChainError;
use crate::inference::{ChatCompletionRequest, ChatMessage, InferenceGateway};

/// System instructions sent ahead of every advisor question
pub const SYSTEM_PROMPT: &str = "You are BlindFold, a blindfolded AI financial advisor for crypto portfolios.
You help users without ever seeing their data — all processing happens inside
a hardware-secured enclave where even you can't leak what you've analyzed.

CONTEXT:
- You are running inside a Trusted Execution Environment (TEE)
- The user's portfolio data was decrypted only inside this secure enclave
- No one — not the AI provider, not the app developer — can see this conversation
- Every response you generate is cryptographically signed for verification

CAPABILITIES:
- Portfolio analysis (holdings, allocation percentages, concentration risk)
- Risk assessment (volatility, correlation, diversification score)
- Performance tracking (gains/losses, DCA effectiveness)
- Actionable suggestions (rebalancing, diversification opportunities)

RULES:
- Never provide specific buy/sell financial advice (you are not a licensed advisor)
- Always frame suggestions as \"considerations\" or \"observations\"
- Include relevant disclaimers when discussing specific actions
- Be concise and direct — users check portfolios daily
- Use dollar amounts and percentages for clarity
- If data is insufficient, say so clearly

RESPONSE FORMAT:
- Start with a direct answer to the question
- Support with data from the portfolio
- End with one relevant observation or consideration
- Keep responses under 200 words for daily check-ins";

/// Pipeline step, used in logs and outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Marking,
    Inferring,
    Hashing,
    FetchingProof,
    Verifying,
    Storing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Marking => "marking",
            Self::Inferring => "inferring",
            Self::Hashing => "hashing",
            Self::FetchingProof => "fetching_proof",
            Self::Verifying => "verifying",
            Self::Storing => "storing",
        };
        f.write_str(s)
    }
}

/// Result of processing one work item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Verified result stored on chain
    Completed { id: u64 },
    /// Abandoned after a transient or remote failure
    Skipped { id: u64, stage: Stage, reason: String },
    /// Signature did not verify; nothing stored
    Rejected { id: u64, reason: String },
    /// Already marked by this process, not touched again
    Duplicate { id: u64 },
}

impl ProcessOutcome {
    pub fn id(&self) -> u64 {
        match self {
            Self::Completed { id }
            | Self::Duplicate { id }
            | Self::Skipped { id, .. }
            | Self::Rejected { id, .. } => *id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Abandoned because the chain or the inference backend failed
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            Self::Skipped {
                stage: Stage::Marking | Stage::Inferring | Stage::FetchingProof | Stage::Storing,
                ..
            }
        )
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub model: String,
    /// Move items that fail after marking to `Failed`
    pub mark_failed: bool,
    pub fetch_attestation: bool,
}

struct ItemFailure {
    stage: Stage,
    reason: String,
    rejected: bool,
}

impl ItemFailure {
    fn skipped(stage: Stage, reason: impl fmt::Display) -> Self {
        Self { stage, reason: reason.to_string(), rejected: false }
    }

    fn rejected(reason: impl fmt::Display) -> Self {
        Self { stage: Stage::Verifying, reason: reason.to_string(), rejected: true }
    }

    fn into_outcome(self, id: u64) -> ProcessOutcome {
        if self.rejected {
            ProcessOutcome::Rejected { id, reason: self.reason }
        } else {
            ProcessOutcome::Skipped { id, stage: self.stage, reason: self.reason }
        }
    }
}

/// Build the chat request for a work item
pub fn build_request(model: &str, item: &WorkItem) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Portfolio:\n{}\n\nQuestion: {}",
                item.context_payload, item.question
            )),
        ],
        stream: false,
    }
}

/// Text the backend signed: its own copy when it reports one
pub fn canonical_text(proof: &SignedProof, local: &CommitmentPair) -> String {
    match proof.text.as_deref() {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => local.canonical_text(),
    }
}

/// Runs the yield/resume handshake for one work item
pub struct RequestProcessor {
    chain: Arc<dyn ChainGateway>,
    inference: Arc<dyn InferenceGateway>,
    config: ProcessorConfig,
    // ids marked Processing by this process; never marked twice
    claimed: Mutex<HashSet<u64>>,
}

impl RequestProcessor {
    pub fn new(
        chain: Arc<dyn ChainGateway>,
        inference: Arc<dyn InferenceGateway>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            chain,
            inference,
            config,
            claimed: Mutex::new(HashSet::new()),
        }
    }

    fn already_claimed(&self, id: u64) -> bool {
        self.claimed.lock().map(|set| set.contains(&id)).unwrap_or(false)
    }

    fn claim(&self, id: u64) {
        if let Ok(mut set) = self.claimed.lock() {
            set.insert(id);
        }
    }

    /// Process one item; every failure is contained here
    #[instrument(skip(self, item), fields(request_id = item.id))]
    pub async fn process(&self, item: &WorkItem) -> ProcessOutcome {
        if self.already_claimed(item.id) {
            debug!("request already handled by this relayer, skipping");
            return ProcessOutcome::Duplicate { id: item.id };
        }

        info!(stage = %Stage::Marking, requester = ?item.requester, "processing request");
        if let Err(e) = self.chain.mark_processing(item.id).await {
            warn!(stage = %Stage::Marking, "failed to mark request processing: {}", e);
            if matches!(e, ChainError::Timeout(..)) {
                // the tx may still mine and leave the request in Processing
                self.release_unconfirmed(item.id).await;
            }
            return ItemFailure::skipped(Stage::Marking, e).into_outcome(item.id);
        }
        self.claim(item.id);

        match self.resume(item).await {
            Ok(()) => {
                info!(stage = %Stage::Storing, "verification stored on-chain");
                ProcessOutcome::Completed { id: item.id }
            }
            Err(failure) => {
                if failure.rejected {
                    warn!(security = true, stage = %failure.stage, "signature rejected: {}", failure.reason);
                } else {
                    warn!(stage = %failure.stage, "request abandoned: {}", failure.reason);
                }

                if self.config.mark_failed {
                    let reason = format!("{}: {}", failure.stage, failure.reason);
                    if let Err(e) = self.chain.mark_failed(item.id, &reason).await {
                        warn!("failed to mark request failed: {}", e);
                    }
                }

                failure.into_outcome(item.id)
            }
        }
    }

    async fn resume(&self, item: &WorkItem) -> Result<(), ItemFailure> {
        let request = build_request(&self.config.model, item);
        let request_bytes =
            serde_json::to_vec(&request).map_err(|e| ItemFailure::skipped(Stage::Inferring, e))?;

        info!(stage = %Stage::Inferring, bytes = request_bytes.len(), "calling inference backend");
        let completion = self
            .inference
            .complete(&request_bytes)
            .await
            .map_err(|e| ItemFailure::skipped(Stage::Inferring, e))?;

        let local = CommitmentPair::compute(&request_bytes, completion.text.as_bytes());
        info!(
            stage = %Stage::Hashing,
            chat_id = %completion.id,
            response_len = completion.text.len(),
            request_hash = %&local.request_digest[..16],
            response_hash = %&local.response_digest[..16],
            "response hashed"
        );

        let proof = self
            .inference
            .fetch_proof(&completion.id, &self.config.model)
            .await
            .map_err(|e| ItemFailure::skipped(Stage::FetchingProof, e))?
            .ok_or_else(|| ItemFailure::skipped(Stage::FetchingProof, "no signature proof for completion"))?;

        if proof.signing_algo != SigningAlgorithm::Ecdsa {
            return Err(ItemFailure::rejected(format!(
                "unsupported signing algorithm {}",
                proof.signing_algo
            )));
        }

        let canonical = canonical_text(&proof, &local);
        // the stored digests must be exactly what the signature covers
        let digests = match CommitmentPair::parse_canonical(&canonical) {
            Some(signed) if signed.canonical_text() == canonical => signed,
            _ => {
                return Err(ItemFailure::rejected(
                    "signed text does not commit to request/response digests",
                ))
            }
        };
        if digests != local {
            warn!("signed digests differ from local digests, storing signed digests");
        }

        info!(stage = %Stage::Verifying, signer = %proof.signing_address, "verifying signature");
        if !verify_signature(&canonical, &proof.signature, &proof.signing_address) {
            return Err(ItemFailure::rejected(format!(
                "recovered signer does not match {}",
                proof.signing_address
            )));
        }

        let attestation_blob = self.attestation_blob(&completion.id, &digests).await;

        let record = VerificationRecord {
            work_item_id: item.id,
            request_digest: digests.request_digest,
            response_digest: digests.response_digest,
            signature: proof.signature,
            signer_address: proof.signing_address,
            algorithm: proof.signing_algo,
            attestation_blob,
            response_text: completion.text,
        };

        info!(stage = %Stage::Storing, "storing verification");
        self.chain
            .store_verification(&record)
            .await
            .map_err(|e| ItemFailure::skipped(Stage::Storing, e))
    }

    async fn release_unconfirmed(&self, id: u64) {
        if !self.config.mark_failed {
            warn!("request may be left in Processing if the timed-out mark is mined");
            return;
        }
        let reason = format!("{}: markProcessing confirmation timed out", Stage::Marking);
        if let Err(e) = self.chain.mark_failed(id, &reason).await {
            warn!("request may be left in Processing, mark failed also failed: {}", e);
        }
    }

    async fn attestation_blob(&self, chat_id: &str, digests: &CommitmentPair) -> String {
        let mut blob = serde_json::json!({
            "chat_id": chat_id,
            "model": self.config.model,
        });

        if self.config.fetch_attestation {
            // binds the report to this request
            let nonce = sha256_hex(digests.canonical_text().as_bytes());
            match self.inference.fetch_attestation(&self.config.model, &nonce).await {
                Ok(report) => blob["report"] = report,
                Err(e) => warn!("attestation report unavailable: {}", e),
            }
        }

        blob.to_string()
    }
}
