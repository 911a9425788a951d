//! Barcode to product candidate, and product name to verified SDS.
//!
//! Each lookup walks search hits strictly in engine order, one network call
//! at a time, and stops at the first success. Outcomes are memoized in two
//! TTL caches; SDS lookups cache negatives too.

use crate::cache::TtlCache;
use crate::extractor::ProductExtractor;
use crate::pdf::{has_pdf_suffix, has_sds_keyword, looks_like_homepage, PdfDetector};
use crate::search::SearchProvider;
use crate::types::{ProductCandidate, SdsResolution, SearchHit};
use crate::verifier::SdsVerifier;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Barcode queries, tried in order until one yields a candidate.
const BARCODE_QUERY_TEMPLATES: &[&str] = &["Item {barcode}", "product {barcode}"];

const SDS_QUERY_SUFFIX: &str = "safety data sheet SDS";

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub candidate_ttl: Duration,
    pub sds_ttl: Duration,
    /// Pause between page fetches in the barcode flow.
    pub hit_delay: Duration,
    /// Hits evaluated per search.
    pub max_hits: usize,
    /// Raw hit URLs reported back with every SDS resolution.
    pub top_links: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            candidate_ttl: Duration::from_secs(5 * 60),
            sds_ttl: Duration::from_secs(10 * 60),
            hit_delay: Duration::from_millis(500),
            max_hits: 8,
            top_links: 5,
        }
    }
}

/// How cheaply a hit can be confirmed; evaluated in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HitKind {
    DirectPdf,
    SdsKeyword,
    Html,
}

pub fn classify_hit(hit: &SearchHit) -> HitKind {
    if has_pdf_suffix(&hit.url) {
        HitKind::DirectPdf
    } else if has_sds_keyword(&hit.url) || has_sds_keyword(&hit.title) {
        HitKind::SdsKeyword
    } else {
        HitKind::Html
    }
}

pub struct Resolver {
    search: Arc<dyn SearchProvider>,
    extractor: Arc<dyn ProductExtractor>,
    pdf: Arc<dyn PdfDetector>,
    verifier: Arc<dyn SdsVerifier>,
    candidates: TtlCache<String, ProductCandidate>,
    sds: TtlCache<String, SdsResolution>,
    settings: ResolverSettings,
}

impl Resolver {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        extractor: Arc<dyn ProductExtractor>,
        pdf: Arc<dyn PdfDetector>,
        verifier: Arc<dyn SdsVerifier>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            search,
            extractor,
            pdf,
            verifier,
            candidates: TtlCache::new(settings.candidate_ttl),
            sds: TtlCache::new(settings.sds_ttl),
            settings,
        }
    }

    /// Product name (and size, when the page shows one) for a barcode, or
    /// `None` when no search hit leads to a named product page.
    pub async fn resolve_candidate_from_barcode(&self, barcode: &str) -> Option<ProductCandidate> {
        let barcode = barcode.trim();
        if barcode.is_empty() {
            return None;
        }

        if let Some(cached) = self.candidates.get(&barcode.to_string()) {
            tracing::debug!("Candidate cache hit for {}", barcode);
            return Some(cached);
        }

        for template in BARCODE_QUERY_TEMPLATES {
            let query = template.replace("{barcode}", barcode);
            let hits = self.search.search(&query).await;
            if hits.is_empty() {
                tracing::debug!("No hits for {:?}", query);
                continue;
            }

            if let Some(candidate) = self.first_candidate(&hits).await {
                tracing::info!("✅ Barcode {} resolved to {:?}", barcode, candidate.name);
                self.candidates.set(barcode.to_string(), candidate.clone());
                return Some(candidate);
            }
        }

        tracing::info!("Barcode {} not found", barcode);
        None
    }

    async fn first_candidate(&self, hits: &[SearchHit]) -> Option<ProductCandidate> {
        for (i, hit) in hits.iter().take(self.settings.max_hits).enumerate() {
            if i > 0 && !self.settings.hit_delay.is_zero() {
                tokio::time::sleep(self.settings.hit_delay).await;
            }
            tracing::debug!("Trying hit #{}: {}", i + 1, hit.url);
            match self.extractor.extract(&hit.url).await {
                Some(candidate) if !candidate.name.trim().is_empty() => return Some(candidate),
                _ => continue,
            }
        }
        None
    }

    /// Verified SDS URL for a product. Never errors: "nothing verified" is an
    /// empty `sds_url` with `verified: false`, and is cached like a success.
    pub async fn resolve_sds_by_name(&self, name: &str, size: Option<&str>) -> SdsResolution {
        let name = name.trim();
        if name.is_empty() {
            return SdsResolution::not_found(Vec::new());
        }
        let size = size.map(str::trim).filter(|s| !s.is_empty());

        let key = sds_cache_key(name, size);
        if let Some(cached) = self.sds.get(&key) {
            tracing::debug!("SDS cache hit for {:?} (verified: {})", key, cached.verified);
            return cached;
        }

        let query = sds_query(name, size);
        let hits = self.search.search(&query).await;
        let top_links: Vec<String> = hits
            .iter()
            .take(self.settings.top_links)
            .map(|h| h.url.clone())
            .collect();

        let resolution = match self.first_verified_pdf(&hits, name).await {
            Some(url) => {
                tracing::info!("✅ Verified SDS for {:?}: {}", name, url);
                SdsResolution::verified(url, top_links)
            }
            None => {
                tracing::info!("No verified SDS for {:?} after {} hits", name, hits.len());
                SdsResolution::not_found(top_links)
            }
        };

        self.sds.set(key, resolution.clone());
        resolution
    }

    async fn first_verified_pdf(&self, hits: &[SearchHit], name: &str) -> Option<String> {
        let mut ordered: Vec<(HitKind, &SearchHit)> = hits
            .iter()
            .take(self.settings.max_hits)
            .map(|h| (classify_hit(h), h))
            .collect();
        // Stable: engine order is kept within each kind.
        ordered.sort_by_key(|(kind, _)| *kind);

        // PDFs already sent to the verifier (or rejected) are not retried.
        let mut tried: HashSet<String> = HashSet::new();

        for (kind, hit) in ordered {
            tracing::debug!("Evaluating {:?} hit {}", kind, hit.url);

            // Download endpoints serve PDFs from suffix-less, keyword-less URLs.
            let check = self.pdf.is_pdf(&hit.url).await;
            if check.is_pdf {
                if self.verify_once(&mut tried, &check.final_url, name).await {
                    return Some(check.final_url);
                }
                continue;
            }
            if kind == HitKind::DirectPdf {
                continue;
            }

            if looks_like_homepage(&hit.url) {
                tracing::debug!("Skipping homepage-like hit {}", hit.url);
                continue;
            }
            if let Some(pdf_url) = self.pdf.discover_pdf_on_page(&hit.url).await {
                if self.verify_once(&mut tried, &pdf_url, name).await {
                    return Some(pdf_url);
                }
            }
        }
        None
    }

    async fn verify_once(&self, tried: &mut HashSet<String>, url: &str, name: &str) -> bool {
        if !tried.insert(url.to_string()) {
            return false;
        }
        self.verifier.verify(url, name).await
    }

    /// Forget a cached SDS outcome so the next lookup searches again.
    pub fn invalidate_sds(&self, name: &str, size: Option<&str>) -> bool {
        self.sds.invalidate(&sds_cache_key(name.trim(), size.map(str::trim)))
    }

    pub fn invalidate_candidate(&self, barcode: &str) -> bool {
        self.candidates.invalidate(&barcode.trim().to_string())
    }

    pub fn purge_expired(&self) -> usize {
        self.candidates.purge_expired() + self.sds.purge_expired()
    }
}

/// Lower-cased, whitespace-collapsed name, joined with the size when present.
pub fn sds_cache_key(name: &str, size: Option<&str>) -> String {
    let norm = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    match size.filter(|s| !s.trim().is_empty()) {
        Some(size) => format!("{}|{}", norm(name), norm(size)),
        None => norm(name),
    }
}

pub fn sds_query(name: &str, size: Option<&str>) -> String {
    match size {
        Some(size) => format!("{} {} {}", name, size, SDS_QUERY_SUFFIX),
        None => format!("{} {}", name, SDS_QUERY_SUFFIX),
    }
}
