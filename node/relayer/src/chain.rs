use async_trait::async_trait;
use blindfold_common::{
    contracts::{AdvisorOracle, AdvisorRequest, Client},
    RequestStatus, VerificationRecord, WorkItem,
};
use ethers::{
    abi::Tokenizable,
    contract::builders::ContractCall,
    middleware::SignerMiddleware,
    providers::{Http, Provider},
    signers::LocalWallet,
    types::{Address, U64},
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ChainError;

/// The only contract surface the relayer touches.
///
/// Implementations report network partitions and fee/revert problems as
/// ordinary `ChainError`s; nothing here should panic.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Requests currently in `Pending`, in contract order
    async fn list_pending(&self) -> Result<Vec<WorkItem>, ChainError>;

    /// Pending -> Processing
    async fn mark_processing(&self, id: u64) -> Result<(), ChainError>;

    /// Resume the request with its verified result (-> Completed)
    async fn store_verification(&self, record: &VerificationRecord) -> Result<(), ChainError>;

    /// Processing -> Failed
    async fn mark_failed(&self, id: u64, reason: &str) -> Result<(), ChainError>;
}

/// Oracle contract client
#[derive(Clone)]
pub struct OracleContractClient {
    contract: AdvisorOracle<Client>,
    timeout: Duration,
}

impl OracleContractClient {
    pub fn new(
        rpc_url: &str,
        wallet: LocalWallet,
        contract_addr: Address,
        timeout: Duration,
    ) -> Result<Self, ChainError> {
        let provider =
            Provider::<Http>::try_from(rpc_url).map_err(|e| ChainError::Rpc(e.to_string()))?;
        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        let contract = AdvisorOracle::new(contract_addr, client);

        Ok(Self { contract, timeout })
    }

    pub fn address(&self) -> Address {
        self.contract.address()
    }

    async fn with_timeout<T, F>(&self, method: &'static str, fut: F) -> Result<T, ChainError>
    where
        F: Future<Output = Result<T, ChainError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ChainError::Timeout(method, self.timeout))?
    }

    /// Send a state-changing call and wait for a successful receipt
    async fn send(&self, method: &'static str, call: ContractCall<Client, ()>) -> Result<(), ChainError> {
        self.with_timeout(method, async move {
            let pending = call.send().await.map_err(|e| ChainError::Contract {
                method,
                message: e.to_string(),
            })?;

            let receipt = pending
                .await
                .map_err(|e| ChainError::Rpc(e.to_string()))?
                .ok_or(ChainError::Dropped(method))?;

            if receipt.status == Some(U64::zero()) {
                return Err(ChainError::Reverted {
                    method,
                    tx_hash: format!("{:?}", receipt.transaction_hash),
                });
            }

            debug!(method, tx = ?receipt.transaction_hash, "transaction confirmed");
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ChainGateway for OracleContractClient {
    async fn list_pending(&self) -> Result<Vec<WorkItem>, ChainError> {
        let raw = self
            .with_timeout("getPendingRequests", async {
                self.contract
                    .get_pending_requests()
                    .call()
                    .await
                    .map_err(|e| ChainError::Contract {
                        method: "getPendingRequests",
                        message: e.to_string(),
                    })
            })
            .await?;

        let mut items = Vec::with_capacity(raw.len());
        for request in raw {
            let request = AdvisorRequest::from_token(request.into_token()).map_err(|e| {
                ChainError::Contract {
                    method: "getPendingRequests",
                    message: e.to_string(),
                }
            })?;
            let id = request.id;
            match WorkItem::try_from(request) {
                Ok(item) if item.status == RequestStatus::Pending => items.push(item),
                Ok(item) => debug!(request_id = id, status = ?item.status, "ignoring non-pending request"),
                Err(e) => warn!(request_id = id, "skipping undecodable request: {}", e),
            }
        }

        Ok(items)
    }

    async fn mark_processing(&self, id: u64) -> Result<(), ChainError> {
        self.send("markProcessing", self.contract.mark_processing(id)).await
    }

    async fn store_verification(&self, record: &VerificationRecord) -> Result<(), ChainError> {
        let call = self.contract.provide_ai_response(
            record.work_item_id,
            record.response_text.clone(),
            record.request_digest.clone(),
            record.response_digest.clone(),
            record.signature.clone(),
            record.signer_address.clone(),
            record.algorithm.to_string(),
            record.attestation_blob.clone(),
        );

        self.send("provideAiResponse", call).await
    }

    async fn mark_failed(&self, id: u64, reason: &str) -> Result<(), ChainError> {
        self.send("markFailed", self.contract.mark_failed(id, reason.to_string())).await
    }
}
