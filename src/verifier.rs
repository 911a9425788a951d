//! Client for the SDS verification service (PDF text check against a
//! product name), exposed as a boolean predicate.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[async_trait]
pub trait SdsVerifier: Send + Sync {
    /// True only when the document at `url` is a genuine SDS for `name`.
    /// Any failure is a `false`, never an error.
    async fn verify(&self, url: &str, name: &str) -> bool;
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    verified: bool,
}

/// `POST {endpoint}` with `{ "url", "name" }`, expecting `{ "verified": bool }`.
pub struct RemoteVerifier {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteVerifier {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl SdsVerifier for RemoteVerifier {
    async fn verify(&self, url: &str, name: &str) -> bool {
        if url.trim().is_empty() || name.trim().is_empty() {
            return false;
        }

        let res = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "url": url, "name": name }))
            .send()
            .await;

        match res {
            Ok(response) => {
                let status = response.status();
                if !status.is_success() {
                    tracing::warn!("⚠️ Verifier returned {} for {}", status, url);
                    return false;
                }
                match response.json::<VerifyResponse>().await {
                    Ok(data) => {
                        tracing::info!("Verifier says {} for {} ({})", data.verified, url, name);
                        data.verified
                    }
                    Err(e) => {
                        tracing::warn!("⚠️ Malformed verifier response for {}: {}", url, e);
                        false
                    }
                }
            }
            Err(e) => {
                tracing::warn!("⚠️ Verifier unreachable for {}: {}", url, e);
                false
            }
        }
    }
}

/// Accepts every confirmed PDF. Only wired in when `SDS_VERIFY_BYPASS` is set.
pub struct PassthroughVerifier;

#[async_trait]
impl SdsVerifier for PassthroughVerifier {
    async fn verify(&self, url: &str, _name: &str) -> bool {
        tracing::debug!("Verification bypassed for {}", url);
        true
    }
}
