//! Shared reqwest plumbing for page fetches and PDF probes.

use crate::error::{FetchError, FetchResult};
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use reqwest::header::{ACCEPT_LANGUAGE, CONTENT_TYPE, RANGE};
use reqwest::{Client, Response};
use std::time::Duration;

pub static USER_AGENTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:124.0) Gecko/20100101 Firefox/124.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    ]
});

const FALLBACK_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

/// Page bodies are read up to this size; the rest is dropped.
pub const MAX_PAGE_BYTES: usize = 2 * 1024 * 1024;

/// Bytes requested when a HEAD probe is inconclusive.
pub const PROBE_RANGE: &str = "bytes=0-1023";

pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(FALLBACK_USER_AGENT)
}

/// A fetched HTML document after redirects.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: String,
}

/// Headers of a probe response (HEAD or ranged GET).
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub final_url: String,
    pub content_type: Option<String>,
    /// First bytes of the body; empty for HEAD.
    pub head_bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    accept_language: String,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, accept_language: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(random_user_agent())
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            accept_language: accept_language.to_string(),
        })
    }

    /// GET a page and return its body, lossily decoded and capped at
/// [`MAX_PAGE_BYTES`]. Non-2xx after redirects is an error.
    pub async fn get_page(&self, url: &str) -> FetchResult<FetchedPage> {
        let resp = self
            .client
            .get(url)
            .header(ACCEPT_LANGUAGE, &self.accept_language)
            .send()
            .await?;
        let mut resp = ensure_success(resp)?;

        let final_url = resp.url().to_string();
        let content_type = content_type(&resp);

        let mut bytes: Vec<u8> = Vec::new();
        while bytes.len() < MAX_PAGE_BYTES {
            match resp.chunk().await {
                Ok(Some(chunk)) => bytes.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) => {
                    return Err(FetchError::Body {
                        url: final_url,
                        message: e.to_string(),
                    })
                }
            }
        }
        if bytes.len() >= MAX_PAGE_BYTES {
            tracing::debug!("Truncated {} at {} bytes", final_url, MAX_PAGE_BYTES);
            bytes.truncate(MAX_PAGE_BYTES);
        }
        let body = String::from_utf8_lossy(&bytes).into_owned();

        Ok(FetchedPage {
            final_url,
            content_type,
            body,
        })
    }

    pub async fn head(&self, url: &str) -> FetchResult<ProbeResponse> {
        let resp = self
            .client
            .head(url)
            .header(ACCEPT_LANGUAGE, &self.accept_language)
            .send()
            .await?;
        let resp = ensure_success(resp)?;

        Ok(ProbeResponse {
            final_url: resp.url().to_string(),
            content_type: content_type(&resp),
            head_bytes: Vec::new(),
        })
    }

    /// GET asking for the first kilobyte only. Servers that ignore `Range`
    /// answer 200 with the full body; only the first chunk is read.
    pub async fn get_range(&self, url: &str) -> FetchResult<ProbeResponse> {
        let resp = self
            .client
            .get(url)
            .header(ACCEPT_LANGUAGE, &self.accept_language)
            .header(RANGE, PROBE_RANGE)
            .send()
            .await?;
        let mut resp = ensure_success(resp)?;

        let final_url = resp.url().to_string();
        let content_type = content_type(&resp);
        let head_bytes = match resp.chunk().await {
            Ok(Some(chunk)) => chunk.to_vec(),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::debug!("Could not read probe body from {}: {}", final_url, e);
                Vec::new()
            }
        };

        Ok(ProbeResponse {
            final_url,
            content_type,
            head_bytes,
        })
    }
}

fn ensure_success(resp: Response) -> FetchResult<Response> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(FetchError::Status {
            status: status.as_u16(),
            url: resp.url().to_string(),
        })
    }
}

fn content_type(resp: &Response) -> Option<String> {
    resp.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_ascii_lowercase())
}
