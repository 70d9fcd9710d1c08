use ethers::{
    contract::abigen,
    middleware::SignerMiddleware,
    providers::{Http, Provider},
    signers::LocalWallet,
};

use crate::types::{RequestStatus, WorkItem};

// Generate contract bindings
abigen!(
    AdvisorOracle,
    r#"[
        struct AdvisorRequest { uint64 id; address requester; string question; string context; uint64 timestamp; uint8 status; }
        function getPendingRequests() external view returns (AdvisorRequest[])
        function markProcessing(uint64 requestId) external
        function markFailed(uint64 requestId, string reason) external
        function provideAiResponse(uint64 requestId, string responseText, string requestHash, string responseHash, string signature, string signingAddress, string signingAlgo, string teeAttestation) external
    ]"#
);

pub type Client = SignerMiddleware<Provider<Http>, LocalWallet>;

impl TryFrom<AdvisorRequest> for WorkItem {
    type Error = crate::Error;

    fn try_from(raw: AdvisorRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            id: raw.id,
            requester: raw.requester,
            question: raw.question,
            context_payload: raw.context,
            submitted_at: raw.timestamp,
            status: RequestStatus::try_from(raw.status)?,
        })
    }
}
