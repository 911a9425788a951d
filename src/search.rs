//! Locale-biased Bing search.
//!
//! Primary strategy renders the SERP through a [`PageRenderer`] (Headless
//! Chrome in production); every failure there
//! (launch error, navigation error, challenge page, timeout) falls through to
//! a plain HTTP fetch of the same SERP parsed with `scraper`. Both failing is
//! an empty result, not an error.

use crate::browser::PageRenderer;
use crate::normalize::normalize;
use crate::types::SearchHit;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::header::ACCEPT_LANGUAGE;
use reqwest::Url;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub const BING_SEARCH_URL: &str = "https://www.bing.com/search";

/// Organic result containers, newest layout first.
const RESULT_SELECTORS: &[&str] = &["#b_results > li.b_algo", "li.b_algo", "div.b_algo"];
const TITLE_LINK_SELECTOR: &str = "h2 a";
const READY_SELECTOR: &str = "#b_results";

/// Markers Bing serves instead of results when it suspects automation.
const CHALLENGE_MARKERS: &[&str] = &[
    "needs to review the security",
    "captcha",
    "id=\"b_captcha\"",
    "unusual traffic",
];

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Ranked, de-duplicated hits for `query`. A fresh upstream call every
    /// time; never errors.
    async fn search(&self, query: &str) -> Vec<SearchHit>;
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    /// SERP endpoint, normally [`BING_SEARCH_URL`].
    pub endpoint: String,
    /// Market code such as `en-AU`.
    pub market: String,
    /// Country code such as `AU`.
    pub country: String,
    pub accept_language: String,
    pub timeout: Duration,
}

pub struct BingSearch {
    settings: SearchSettings,
    client: reqwest::Client,
    renderer: Option<Arc<dyn PageRenderer>>,
}

impl BingSearch {
    /// `renderer: None` runs the HTTP strategy only.
    pub fn new(settings: SearchSettings, renderer: Option<Arc<dyn PageRenderer>>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::fetch::random_user_agent())
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            settings,
            client,
            renderer,
        })
    }

    pub fn search_url(&self, query: &str) -> String {
        format!(
            "{}?q={}&setlang={}&mkt={}&cc={}&count=20",
            self.settings.endpoint,
            urlencoding::encode(query),
            self.settings.market,
            self.settings.market,
            self.settings.country,
        )
    }

    async fn search_rendered(&self, query: &str) -> Result<Vec<SearchHit>> {
        let renderer = self
            .renderer
            .clone()
            .ok_or_else(|| anyhow!("browser strategy disabled"))?;
        let url = self.search_url(query);
        let timeout = self.settings.timeout;

        let render = tokio::task::spawn_blocking(move || renderer.render(&url, READY_SELECTOR, timeout));
        // Chrome's own timeouts are per step; this bounds the whole render.
        let html = tokio::time::timeout(timeout + Duration::from_secs(5), render)
            .await
            .map_err(|_| anyhow!("browser render timed out"))???;

        check_challenge(&html)?;
        Ok(parse_bing_results(&html))
    }

    async fn search_http(&self, query: &str) -> Result<Vec<SearchHit>> {
        let resp = self
            .client
            .get(self.search_url(query))
            .header(ACCEPT_LANGUAGE, &self.settings.accept_language)
            .send()
            .await?
            .error_for_status()?;
        let html = resp.text().await?;

        check_challenge(&html)?;
        Ok(parse_bing_results(&html))
    }
}

#[async_trait]
impl SearchProvider for BingSearch {
    async fn search(&self, query: &str) -> Vec<SearchHit> {
        tracing::info!("🔎 Searching for: {}", query);

        if self.renderer.is_some() {
            match self.search_rendered(query).await {
                Ok(hits) if !hits.is_empty() => {
                    tracing::info!("✅ Browser search found {} results", hits.len());
                    return hits;
                }
                Ok(_) => tracing::warn!("⚠️ Browser search returned 0 results, trying HTTP"),
                Err(e) => tracing::warn!("⚠️ Browser search failed ({}), trying HTTP", e),
            }
        }

        match self.search_http(query).await {
            Ok(hits) => {
                tracing::info!("HTTP search found {} results", hits.len());
                hits
            }
            Err(e) => {
                tracing::warn!("❌ HTTP search failed: {}", e);
                Vec::new()
            }
        }
    }
}

fn check_challenge(html: &str) -> Result<()> {
    let lower = html.to_lowercase();
    // Challenge pages carry no organic results; a real SERP mentioning
    // "captcha" in a result snippet must not be thrown away.
    if !lower.contains("b_algo") && CHALLENGE_MARKERS.iter().any(|m| lower.contains(m)) {
        return Err(anyhow!("Bing challenge page served"));
    }
    Ok(())
}

/// Organic hits from a Bing SERP, redirect-unwrapped and de-duplicated.
/// Unknown markup yields an empty list.
pub fn parse_bing_results(html: &str) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    let title_sel = match Selector::parse(TITLE_LINK_SELECTOR) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    let mut raw = Vec::new();
    for selector in RESULT_SELECTORS {
        let result_sel = match Selector::parse(selector) {
            Ok(s) => s,
            Err(_) => continue,
        };
        for element in document.select(&result_sel) {
            let Some(anchor) = element.select(&title_sel).next() else {
                continue;
            };
            let title = anchor.text().collect::<String>().trim().to_string();
            let link = anchor.value().attr("href").unwrap_or_default();
            if title.is_empty() || link.is_empty() {
                continue;
            }
            if let Some(url) = normalize(link) {
                raw.push(SearchHit::new(title, url));
            }
        }
        if !raw.is_empty() {
            break;
        }
    }

    dedupe_hits(raw)
}

/// Keep the first hit per URL, comparing scheme-less host and path only.
pub fn dedupe_hits(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|hit| seen.insert(dedupe_key(&hit.url)))
        .collect()
}

fn dedupe_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => format!(
            "{}{}",
            parsed.host_str().unwrap_or_default().trim_start_matches("www."),
            parsed.path().trim_end_matches('/')
        )
        .to_lowercase(),
        Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_lowercase(),
    }
}
