//! Product name and pack-size extraction from retailer pages.

use crate::fetch::HttpFetcher;
use crate::types::ProductCandidate;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Node, Selector};
use std::io::Cursor;

/// Retailer-specific title selectors, tried after the generic sources.
const RETAILER_TITLE_SELECTORS: &[&str] = &[
    "#productTitle",
    "[data-testid='product-title']",
    "[itemprop='name']",
    ".product-title",
    ".product-name",
    ".product_title",
    ".pdp-title",
    ".shelfProductTile-descriptionLink",
];

/// Site branding that retailers append after a separator.
const RETAILER_BRANDS: &[&str] = &[
    "bunnings",
    "woolworths",
    "coles",
    "chemist warehouse",
    "priceline",
    "amazon",
    "ebay",
    "officeworks",
    "kmart",
    "big w",
    "catch",
    "aldi",
    "iga",
    "mitre 10",
    "supercheap auto",
    "repco",
    "total tools",
    "barcode lookup",
    "buy online",
];

const TITLE_SEPARATORS: &[&str] = &[" | ", " - ", " – ", " — ", " :: "];

/// Titles served by block pages and error pages rather than products.
const BLOCKED_TITLES: &[&str] = &[
    "access denied",
    "just a moment",
    "attention required",
    "page not found",
    "404 not found",
    "403 forbidden",
    "security check",
];

static SIZE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+(?:[.,]\d+)?)\s?(ml|kg|g|l|oz)\b").expect("size pattern is valid")
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

#[async_trait]
pub trait ProductExtractor: Send + Sync {
    /// Fetch `url` and pull a product candidate from it. Failures of any kind
    /// come back as `None`.
    async fn extract(&self, url: &str) -> Option<ProductCandidate>;
}

pub struct PageExtractor {
    fetcher: HttpFetcher,
}

impl PageExtractor {
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl ProductExtractor for PageExtractor {
    async fn extract(&self, url: &str) -> Option<ProductCandidate> {
        let page = match self.fetcher.get_page(url).await {
            Ok(page) => page,
            Err(e) => {
                tracing::debug!("Skipping {}: {}", url, e);
                return None;
            }
        };

        if page
            .content_type
            .as_deref()
            .is_some_and(|ct| !ct.contains("html"))
        {
            tracing::debug!("Skipping non-HTML page {} ({:?})", page.final_url, page.content_type);
            return None;
        }

        let candidate = parse_product_page(&page.body, &page.final_url);
        match &candidate {
            Some(c) => tracing::debug!("Extracted {:?} ({:?}) from {}", c.name, c.size_or_weight, page.final_url),
            None => tracing::debug!("No product name on {}", page.final_url),
        }
        candidate
    }
}

/// Pull a candidate out of raw HTML. `None` when no name source yields text.
pub fn parse_product_page(html: &str, page_url: &str) -> Option<ProductCandidate> {
    let document = Html::parse_document(html);

    let name = extract_name(&document)?;
    if is_blocked_title(&name) {
        return None;
    }

    let size_or_weight = extract_size(&name)
        .or_else(|| main_text(html, page_url).and_then(|t| extract_size(&t)))
        .or_else(|| extract_size(&visible_text(&document)));

    Some(ProductCandidate {
        name,
        size_or_weight,
    })
}

fn extract_name(document: &Html) -> Option<String> {
    let h1 = first_text(document, "h1");
    let og_title = first_attr(document, "meta[property='og:title']", "content");
    let title = first_text(document, "title");

    h1.or(og_title)
        .or(title)
        .or_else(|| {
            RETAILER_TITLE_SELECTORS
                .iter()
                .find_map(|sel| first_text(document, sel))
        })
        .map(|raw| clean_name(&raw))
        .filter(|name| !name.is_empty())
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

fn first_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr(attr))
        .map(collapse_whitespace)
        .find(|t| !t.is_empty())
}

/// Strip retailer branding appended after a separator, e.g.
/// `"WD-40 Multi-Use Product 300g | Bunnings Warehouse"`.
pub fn clean_name(raw: &str) -> String {
    let mut name = collapse_whitespace(raw);

    loop {
        let stripped = TITLE_SEPARATORS.iter().find_map(|sep| {
            let (head, tail) = name.rsplit_once(sep)?;
            let head = head.trim();
            if head.is_empty() {
                return None;
            }
            let tail = tail.to_lowercase();
            let branded = *sep == " | "
                || tail.contains(".com")
                || RETAILER_BRANDS.iter().any(|brand| contains_phrase(&tail, brand));
            branded.then(|| head.to_string())
        });

        match stripped {
            Some(head) => name = head,
            None => break,
        }
    }

    name
}

/// Whole-word match, so `iga` does not fire inside `irrigation`.
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let words: String = haystack
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    format!(" {} ", collapse_whitespace(&words)).contains(&format!(" {} ", phrase))
}

fn is_blocked_title(name: &str) -> bool {
    let lower = name.to_lowercase();
    BLOCKED_TITLES.iter().any(|t| lower.starts_with(t))
}

/// First `<number><unit>` token, formatted as e.g. `75 mL` or `1.5 kg`.
pub fn extract_size(text: &str) -> Option<String> {
    let caps = SIZE_REGEX.captures(text)?;
    let amount = normalize_decimal(caps.get(1)?.as_str());
    let unit = match caps.get(2)?.as_str().to_ascii_lowercase().as_str() {
        "ml" => "mL",
        "l" => "L",
        "g" => "g",
        "kg" => "kg",
        "oz" => "oz",
        _ => return None,
    };
    Some(format!("{} {}", amount, unit))
}

/// `1,5` becomes `1.5`; `1,000` (thousands grouping) becomes `1000`.
fn normalize_decimal(amount: &str) -> String {
    match amount.split_once(',') {
        Some((whole, frac)) if frac.len() == 3 => format!("{}{}", whole, frac),
        Some((whole, frac)) => format!("{}.{}", whole, frac),
        None => amount.to_string(),
    }
}

/// Readability's view of the main content, when it can find one.
fn main_text(html: &str, page_url: &str) -> Option<String> {
    let url = reqwest::Url::parse(page_url).ok()?;
    let mut reader = Cursor::new(html.as_bytes());
    readability::extractor::extract(&mut reader, &url)
        .ok()
        .map(|product| product.text)
        .filter(|t| !t.trim().is_empty())
}

/// All text under `<body>` except script and style contents.
fn visible_text(document: &Html) -> String {
    let mut out = String::new();
    for node in document.root_element().descendants() {
        if let Node::Text(text) = node.value() {
            let parent = node
                .parent()
                .and_then(|p| p.value().as_element().map(|e| e.name().to_string()));
            if matches!(parent.as_deref(), Some("script" | "style" | "noscript" | "title")) {
                continue;
            }
            out.push_str(text);
            out.push(' ');
        }
    }
    collapse_whitespace(&out)
}

fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").to_string()
}
