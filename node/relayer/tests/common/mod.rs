#![allow(dead_code)]

use async_trait::async_trait;
use blindfold_common::{
    crypto::{sha256_hex, verify_signature},
    RequestStatus, SignedProof, SigningAlgorithm, VerificationRecord, WorkItem,
};
use blindfold_relayer::{
    config::SchedulerConfig, error::ChainError, error::InferenceError, ChainGateway, Completion,
    InferenceGateway, ProcessorConfig, RelayerStatus, RequestProcessor, Scheduler,
};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

pub const KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
pub const MODEL: &str = "test-model";

pub fn work_item(id: u64, question: &str) -> WorkItem {
    WorkItem {
        id,
        requester: Address::repeat_byte(0xab),
        question: question.to_string(),
        context_payload: r#"{"holdings":[{"token":"NEAR","balance":"100"},{"token":"USDC","balance":"50"}]}"#
            .to_string(),
        submitted_at: 1_700_000_000,
        status: RequestStatus::Pending,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    List,
    Mark(u64),
    Store(u64),
    Fail(u64),
}

/// In-memory stand-in for the oracle contract
#[derive(Default)]
pub struct FakeChain {
    pending: Mutex<Vec<WorkItem>>,
    /// each list call yields this many brand-new items
    fresh_batch: Option<usize>,
    next_id: AtomicU64,
    list_failures: AtomicUsize,
    fail_mark: Mutex<Vec<u64>>,
    timeout_mark: Mutex<Vec<u64>>,
    fail_store: Mutex<Vec<u64>>,
    /// drop items from `pending` once stored, like the contract does
    complete_on_store: bool,
    events: Mutex<Vec<(ChainEvent, Instant)>>,
    stored: Mutex<Vec<VerificationRecord>>,
    failed: Mutex<Vec<(u64, String)>>,
}

impl FakeChain {
    pub fn with_pending(items: Vec<WorkItem>) -> Self {
        Self { pending: Mutex::new(items), complete_on_store: true, ..Default::default() }
    }

    /// Contract that keeps reporting the same items as pending forever
    pub fn sticky(items: Vec<WorkItem>) -> Self {
        Self { pending: Mutex::new(items), complete_on_store: false, ..Default::default() }
    }

    pub fn fresh_batches(size: usize) -> Self {
        Self { fresh_batch: Some(size), ..Default::default() }
    }

    pub fn failing_list(self, times: usize) -> Self {
        self.list_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn failing_mark(self, id: u64) -> Self {
        self.fail_mark.lock().unwrap().push(id);
        self
    }

    /// markProcessing for `id` is broadcast but its receipt never arrives
    pub fn timing_out_mark(self, id: u64) -> Self {
        self.timeout_mark.lock().unwrap().push(id);
        self
    }

    pub fn failing_store(self, id: u64) -> Self {
        self.fail_store.lock().unwrap().push(id);
        self
    }

    fn log(&self, event: ChainEvent) {
        self.events.lock().unwrap().push((event, Instant::now()));
    }

    pub fn events(&self) -> Vec<(ChainEvent, Instant)> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&ChainEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|(e, _)| pred(e)).count()
    }

    pub fn list_times(&self) -> Vec<Instant> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == ChainEvent::List)
            .map(|(_, t)| *t)
            .collect()
    }

    pub fn stored(&self) -> Vec<VerificationRecord> {
        self.stored.lock().unwrap().clone()
    }

    pub fn failed(&self) -> Vec<(u64, String)> {
        self.failed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainGateway for FakeChain {
    async fn list_pending(&self) -> Result<Vec<WorkItem>, ChainError> {
        self.log(ChainEvent::List);

        let remaining = self.list_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.list_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ChainError::Rpc("connection refused".into()));
        }

        if let Some(size) = self.fresh_batch {
            let batch = (0..size)
                .map(|_| work_item(self.next_id.fetch_add(1, Ordering::SeqCst), "How diversified am I?"))
                .collect();
            return Ok(batch);
        }

        Ok(self.pending.lock().unwrap().clone())
    }

    async fn mark_processing(&self, id: u64) -> Result<(), ChainError> {
        self.log(ChainEvent::Mark(id));
        if self.timeout_mark.lock().unwrap().contains(&id) {
            return Err(ChainError::Timeout("markProcessing", Duration::from_secs(60)));
        }
        if self.fail_mark.lock().unwrap().contains(&id) {
            return Err(ChainError::Contract {
                method: "markProcessing",
                message: "insufficient funds for gas".into(),
            });
        }
        Ok(())
    }

    async fn store_verification(&self, record: &VerificationRecord) -> Result<(), ChainError> {
        self.log(ChainEvent::Store(record.work_item_id));
        if self.fail_store.lock().unwrap().contains(&record.work_item_id) {
            return Err(ChainError::Timeout("provideAiResponse", Duration::from_secs(60)));
        }

        self.stored.lock().unwrap().push(record.clone());
        if self.complete_on_store {
            self.pending.lock().unwrap().retain(|i| i.id != record.work_item_id);
        }
        Ok(())
    }

    async fn mark_failed(&self, id: u64, reason: &str) -> Result<(), ChainError> {
        self.log(ChainEvent::Fail(id));
        self.failed.lock().unwrap().push((id, reason.to_string()));
        if self.complete_on_store {
            self.pending.lock().unwrap().retain(|i| i.id != id);
        }
        Ok(())
    }
}

/// How the fake backend answers a proof request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofMode {
    /// Signs `<H(request)>:<H(response)>` and reports the text
    Honest,
    /// Signs the digest pair but leaves `text` out
    NoText,
    /// Signs and reports an arbitrary text
    SignedText(String),
    /// Valid signature, but claims another signer
    WrongSigner,
    Algorithm(String),
}

/// In-memory stand-in for the TEE inference backend
pub struct FakeInference {
    wallet: LocalWallet,
    response_text: String,
    mode: ProofMode,
    missing_proofs: AtomicUsize,
    fail_completions: AtomicUsize,
    latency: Duration,
    next_chat: AtomicU64,
    requests: Mutex<HashMap<String, (Vec<u8>, String)>>,
    issued: Mutex<Vec<SignedProof>>,
    pub attestation_nonces: Mutex<Vec<String>>,
}

impl FakeInference {
    pub fn new(response_text: &str) -> Self {
        Self {
            wallet: KEY.parse().unwrap(),
            response_text: response_text.to_string(),
            mode: ProofMode::Honest,
            missing_proofs: AtomicUsize::new(0),
            fail_completions: AtomicUsize::new(0),
            latency: Duration::ZERO,
            next_chat: AtomicU64::new(1),
            requests: Mutex::new(HashMap::new()),
            issued: Mutex::new(Vec::new()),
            attestation_nonces: Mutex::new(Vec::new()),
        }
    }

    pub fn mode(mut self, mode: ProofMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn missing_proofs(self, n: usize) -> Self {
        self.missing_proofs.store(n, Ordering::SeqCst);
        self
    }

    pub fn failing_completions(self, n: usize) -> Self {
        self.fail_completions.store(n, Ordering::SeqCst);
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn signer(&self) -> String {
        format!("{:?}", self.wallet.address())
    }

    pub fn request_bodies(&self) -> Vec<Vec<u8>> {
        let requests = self.requests.lock().unwrap();
        let mut ids: Vec<_> = requests.keys().cloned().collect();
        ids.sort();
        ids.into_iter().map(|id| requests[&id].0.clone()).collect()
    }

    pub fn issued(&self) -> Vec<SignedProof> {
        self.issued.lock().unwrap().clone()
    }

    fn take(counter: &AtomicUsize) -> bool {
        let n = counter.load(Ordering::SeqCst);
        if n > 0 {
            counter.store(n - 1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl InferenceGateway for FakeInference {
    async fn complete(&self, request_body: &[u8]) -> Result<Completion, InferenceError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if Self::take(&self.fail_completions) {
            return Err(InferenceError::Http { status: 502, message: "bad gateway".into() });
        }

        let id = format!("chat-{:04}", self.next_chat.fetch_add(1, Ordering::SeqCst));
        self.requests
            .lock()
            .unwrap()
            .insert(id.clone(), (request_body.to_vec(), self.response_text.clone()));

        Ok(Completion { id, text: self.response_text.clone() })
    }

    async fn fetch_proof(
        &self,
        completion_id: &str,
        model: &str,
    ) -> Result<Option<SignedProof>, InferenceError> {
        assert_eq!(model, MODEL);
        if Self::take(&self.missing_proofs) {
            return Ok(None);
        }

        let entry = self.requests.lock().unwrap().get(completion_id).cloned();
        let Some((request, response)) = entry else {
            return Ok(None);
        };
        let pair = format!("{}:{}", sha256_hex(&request), sha256_hex(response.as_bytes()));

        let (signed_text, reported_text) = match &self.mode {
            ProofMode::NoText => (pair, None),
            ProofMode::SignedText(text) => (text.clone(), Some(text.clone())),
            _ => (pair.clone(), Some(pair)),
        };

        let signature = self.wallet.sign_message(signed_text.as_str()).await.unwrap();
        let signing_address = match self.mode {
            ProofMode::WrongSigner => "0x000000000000000000000000000000000000dEaD".to_string(),
            _ => self.signer(),
        };
        let signing_algo = match &self.mode {
            ProofMode::Algorithm(name) => SigningAlgorithm::from(name.clone()),
            _ => SigningAlgorithm::Ecdsa,
        };

        let proof = SignedProof {
            text: reported_text,
            signature: format!("0x{}", signature),
            signing_address,
            signing_algo,
        };
        self.issued.lock().unwrap().push(proof.clone());
        Ok(Some(proof))
    }

    async fn fetch_attestation(
        &self,
        _model: &str,
        nonce: &str,
    ) -> Result<serde_json::Value, InferenceError> {
        self.attestation_nonces.lock().unwrap().push(nonce.to_string());
        Ok(serde_json::json!({ "signing_address": self.signer(), "nonce": nonce }))
    }
}

/// A stored record must re-verify from its own fields alone
pub fn assert_record_verifies(record: &VerificationRecord) {
    let text = format!("{}:{}", record.request_digest, record.response_digest);
    assert!(
        verify_signature(&text, &record.signature, &record.signer_address),
        "record {} does not verify over its digests",
        record.work_item_id
    );
}

pub fn processor_config() -> ProcessorConfig {
    ProcessorConfig { model: MODEL.to_string(), mark_failed: true, fetch_attestation: false }
}

pub fn processor(chain: Arc<FakeChain>, inference: Arc<FakeInference>) -> RequestProcessor {
    RequestProcessor::new(chain, inference, processor_config())
}

pub fn scheduler(
    chain: Arc<FakeChain>,
    inference: Arc<FakeInference>,
    config: SchedulerConfig,
) -> (Arc<Scheduler>, watch::Sender<bool>) {
    let (tx, rx) = watch::channel(false);
    let processor = processor(chain.clone(), inference);
    let scheduler = Scheduler::new(chain, processor, config, Arc::new(RelayerStatus::new()), rx);
    (Arc::new(scheduler), tx)
}
