//! PDF detection and one-hop PDF discovery on HTML pages.

use crate::fetch::{HttpFetcher, ProbeResponse};
use crate::types::PdfCheck;
use async_trait::async_trait;
use reqwest::Url;
use scraper::{Html, Selector};
use std::collections::HashSet;

/// Terms that mark a link as a safety data sheet.
const SDS_KEYWORDS: &[&str] = &[
    "safety data sheet",
    "safety-data-sheet",
    "safety_data_sheet",
    "safetydatasheet",
    "msds",
    "sds",
];

/// Broader document terms; enough to be probed, not enough to score.
const DOCUMENT_KEYWORDS: &[&str] = &["pdf", "document", "download", "datasheet", "data sheet"];

/// Discovered links probed per page, best-ranked first.
const MAX_PROBES_PER_PAGE: usize = 10;

const PDF_MAGIC: &[u8] = b"%PDF-";

#[async_trait]
pub trait PdfDetector: Send + Sync {
    async fn is_pdf(&self, url: &str) -> PdfCheck;

    /// Fetch one HTML page and return the first linked PDF that confirms.
    /// A page that turns out to be a PDF itself is returned as is.
    async fn discover_pdf_on_page(&self, page_url: &str) -> Option<String>;
}

pub struct HttpPdfDetector {
    fetcher: HttpFetcher,
}

impl HttpPdfDetector {
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl PdfDetector for HttpPdfDetector {
    async fn is_pdf(&self, url: &str) -> PdfCheck {
        match self.fetcher.head(url).await {
            Ok(probe) if is_pdf_content_type(probe.content_type.as_deref()) => {
                return PdfCheck {
                    is_pdf: true,
                    final_url: probe.final_url,
                };
            }
            Ok(probe) => {
                tracing::debug!("HEAD {} inconclusive ({:?}), probing body", url, probe.content_type)
            }
            Err(e) => tracing::debug!("HEAD {} failed ({}), probing body", url, e),
        }

        match self.fetcher.get_range(url).await {
            Ok(probe) => PdfCheck {
                is_pdf: probe_is_pdf(&probe),
                final_url: probe.final_url,
            },
            Err(e) => {
                tracing::debug!("PDF probe of {} failed: {}", url, e);
                PdfCheck::not_pdf(url)
            }
        }
    }

    async fn discover_pdf_on_page(&self, page_url: &str) -> Option<String> {
        if looks_like_homepage(page_url) {
            tracing::debug!("Not crawling homepage-like {}", page_url);
            return None;
        }

        let page = match self.fetcher.get_page(page_url).await {
            Ok(page) => page,
            Err(e) => {
                tracing::debug!("Discovery fetch of {} failed: {}", page_url, e);
                return None;
            }
        };

        if is_pdf_content_type(page.content_type.as_deref()) || page.body.starts_with("%PDF-") {
            tracing::info!("📄 {} is itself a PDF", page.final_url);
            return Some(page.final_url);
        }
        if page
            .content_type
            .as_deref()
            .is_some_and(|ct| !ct.contains("html"))
        {
            tracing::debug!("Not an HTML page: {} ({:?})", page.final_url, page.content_type);
            return None;
        }

        let ranked = rank_pdf_links(&page.body, &page.final_url);
        tracing::debug!("{} PDF-like links on {}", ranked.len(), page.final_url);

        for candidate in ranked.into_iter().take(MAX_PROBES_PER_PAGE) {
            let check = self.is_pdf(&candidate).await;
            if check.is_pdf {
                tracing::info!("📄 Found PDF {} via {}", check.final_url, page_url);
                return Some(check.final_url);
            }
        }
        None
    }
}

fn is_pdf_content_type(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.contains("application/pdf") || ct.contains("application/x-pdf"))
}

/// Range GETs are judged by header first, then by the `%PDF-` signature for
/// servers that label documents `application/octet-stream` or similar.
fn probe_is_pdf(probe: &ProbeResponse) -> bool {
    is_pdf_content_type(probe.content_type.as_deref()) || probe.head_bytes.starts_with(PDF_MAGIC)
}

/// Zero or one non-empty path segment: a site root or a top-level index page.
pub fn looks_like_homepage(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => {
            let segments = parsed
                .path_segments()
                .map(|s| s.filter(|seg| !seg.is_empty()).count())
                .unwrap_or(0);
            segments <= 1
        }
        Err(_) => true,
    }
}

pub fn has_pdf_suffix(url: &str) -> bool {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_ascii_lowercase(),
        Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase(),
    };
    path.ends_with(".pdf")
}

pub fn has_sds_keyword(text: &str) -> bool {
    let lower = text.to_lowercase();
    SDS_KEYWORDS.iter().any(|kw| contains_term(&lower, kw))
}

/// `sds` must stand alone (`/sds/`, `-sds.pdf`, `SDS Download`), so words like
/// `kids` or `sdsu` do not count. Longer phrases match as substrings.
fn contains_term(haystack: &str, term: &str) -> bool {
    if term.len() > 4 {
        return haystack.contains(term);
    }
    haystack.match_indices(term).any(|(idx, _)| {
        let before = haystack[..idx].chars().next_back();
        let after = haystack[idx + term.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_alphabetic()) && !after.is_some_and(|c| c.is_ascii_alphabetic())
    })
}

fn has_document_keyword(text: &str) -> bool {
    let lower = text.to_lowercase();
    DOCUMENT_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Absolute links on the page that look like PDFs or SDS documents, best first.
///
/// Score: one point for an SDS keyword (in the href or the anchor text), one
/// for a `.pdf` suffix. The sort is stable, so page order breaks ties.
pub fn rank_pdf_links(html: &str, page_url: &str) -> Vec<String> {
    let base = match Url::parse(page_url) {
        Ok(base) => base,
        Err(_) => return Vec::new(),
    };
    let document = Html::parse_document(html);
    let selector = match Selector::parse("a[href]") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut scored: Vec<(u8, String)> = Vec::new();

    for anchor in document.select(&selector) {
        let href = match anchor.value().attr("href") {
            Some(h) => h.trim(),
            None => continue,
        };
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:") {
            continue;
        }
        let absolute = match base.join(href) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => u,
            _ => continue,
        };
        let url = absolute.to_string();
        let text = anchor.text().collect::<String>();

        let pdf = has_pdf_suffix(&url);
        let sds = has_sds_keyword(&url) || has_sds_keyword(&text);
        let document_like = has_document_keyword(&url) || has_document_keyword(&text);
        if !(pdf || sds || document_like) {
            continue;
        }
        if !seen.insert(url.clone()) {
            continue;
        }

        scored.push((u8::from(sds) + u8::from(pdf), url));
    }

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, url)| url).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_homepage_detection() {
        assert!(looks_like_homepage("https://www.wd40.com.au"));
        assert!(looks_like_homepage("https://www.wd40.com.au/"));
        assert!(looks_like_homepage("https://www.wd40.com.au/products"));
        assert!(looks_like_homepage("https://www.wd40.com.au/products/"));
        assert!(!looks_like_homepage("https://www.wd40.com.au/products/multi-use"));
        assert!(looks_like_homepage("not a url"));
    }

    #[test]
    fn test_pdf_suffix_ignores_query() {
        assert!(has_pdf_suffix("https://a.com/docs/SDS.PDF?v=3"));
        assert!(!has_pdf_suffix("https://a.com/docs/pdf-viewer?file=x"));
    }

    #[test]
    fn test_sds_keyword_boundaries() {
        assert!(has_sds_keyword("https://a.com/sds/wd40.pdf"));
        assert!(has_sds_keyword("Download MSDS"));
        assert!(has_sds_keyword("Safety Data Sheet (AU)"));
        assert!(has_sds_keyword("wd40-sds-au.pdf"));
        assert!(!has_sds_keyword("https://a.com/kids/toys"));
    }

    #[test]
    fn test_rank_prefers_keyword_and_pdf() {
        let html = r#"<html><body>
            <a href="/brochure.pdf">Brochure</a>
            <a href="/support/sds">SDS library</a>
            <a href="/files/wd40-sds.pdf">WD-40 SDS</a>
            <a href="/about">About us</a>
            <a href="https://cdn.other.com/downloads/manual">Download manual</a>
            <a href="mailto:help@a.com">Email</a>
        </body></html>"#;
        let ranked = rank_pdf_links(html, "https://www.wd40.com.au/products/multi-use");
        assert_eq!(
            ranked,
            vec![
                "https://www.wd40.com.au/files/wd40-sds.pdf",
                "https://www.wd40.com.au/brochure.pdf",
                "https://www.wd40.com.au/support/sds",
                "https://cdn.other.com/downloads/manual",
            ]
        );
    }

    #[test]
    fn test_rank_dedupes_links() {
        let html = r#"<a href="a.pdf">x</a><a href="./a.pdf">y</a>"#;
        let ranked = rank_pdf_links(html, "https://a.com/p/q/");
        assert_eq!(ranked, vec!["https://a.com/p/q/a.pdf"]);
    }

    #[test]
    fn test_probe_magic_bytes() {
        let probe = ProbeResponse {
            final_url: "https://a.com/x".into(),
            content_type: Some("application/octet-stream".into()),
            head_bytes: b"%PDF-1.7\n".to_vec(),
        };
        assert!(probe_is_pdf(&probe));

        let html = ProbeResponse {
            final_url: "https://a.com/x".into(),
            content_type: Some("text/html".into()),
            head_bytes: b"<!doctype html>".to_vec(),
        };
        assert!(!probe_is_pdf(&html));
    }
}
