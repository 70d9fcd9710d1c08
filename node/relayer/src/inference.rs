use async_trait::async_trait;
use blindfold_common::SignedProof;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::config::InferenceConfig;
use crate::error::InferenceError;

/// One chat message in an inference request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

/// Chat-completion request body; field order is part of the committed bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

/// Completion text plus the backend's id for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub id: String,
    pub text: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    id: String,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Confidential-compute inference backend.
///
/// Untrusted until the proof it returns passes signature verification.
/// Implementations never retry; that is the scheduler's call.
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    /// Send the exact serialized request body, return the completion
    async fn complete(&self, request_body: &[u8]) -> Result<Completion, InferenceError>;

    /// Signature proof for a completion; `None` when the backend has none
    async fn fetch_proof(
        &self,
        completion_id: &str,
        model: &str,
    ) -> Result<Option<SignedProof>, InferenceError>;

    /// Attestation report for the model's signing key
    async fn fetch_attestation(
        &self,
        model: &str,
        nonce: &str,
    ) -> Result<serde_json::Value, InferenceError>;
}

/// HTTP client for an OpenAI-compatible TEE inference endpoint
#[derive(Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl InferenceClient {
    pub fn new(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| InferenceError::Malformed(format!("bad base url: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(InferenceError::Malformed(format!("bad base url: {}", base_url)));
        }

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    /// Each segment is percent-encoded, so ids from the backend can't reshape the path
    fn url(&self, segments: &[&str], params: &[(&str, &str)]) -> Result<Url, InferenceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| InferenceError::Malformed(format!("bad base url: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);

        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }
}

#[async_trait]
impl InferenceGateway for InferenceClient {
    async fn complete(&self, request_body: &[u8]) -> Result<Completion, InferenceError> {
        let response = self
            .http
            .post(self.url(&["chat", "completions"], &[])?)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(request_body.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(InferenceError::from_response(response).await);
        }

        let body: ChatCompletionResponse = response.json().await?;
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();

        Ok(Completion { id: body.id, text })
    }

    async fn fetch_proof(
        &self,
        completion_id: &str,
        model: &str,
    ) -> Result<Option<SignedProof>, InferenceError> {
        let url = self.url(
            &["signature", completion_id],
            &[("model", model), ("signing_algo", "ecdsa")],
        )?;

        let response = self.http.get(url).bearer_auth(&self.api_key).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(InferenceError::from_response(response).await);
        }

        Ok(Some(response.json().await?))
    }

    async fn fetch_attestation(
        &self,
        model: &str,
        nonce: &str,
    ) -> Result<serde_json::Value, InferenceError> {
        let url = self.url(
            &["attestation", "report"],
            &[("model", model), ("signing_algo", "ecdsa"), ("nonce", nonce)],
        )?;

        let response = self.http.get(url).bearer_auth(&self.api_key).send().await?;
        if !response.status().is_success() {
            return Err(InferenceError::from_response(response).await);
        }

        Ok(response.json().await?)
    }
}
