//! Local stand-ins for Bing, retailer pages, PDF hosts and the verifier.

#![allow(dead_code)]

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sds_resolver::extractor::PageExtractor;
use sds_resolver::fetch::HttpFetcher;
use sds_resolver::pdf::HttpPdfDetector;
use sds_resolver::search::{BingSearch, SearchSettings};
use sds_resolver::verifier::RemoteVerifier;
use sds_resolver::{Resolver, ResolverSettings};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PDF_BYTES: &[u8] = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n%%EOF\n";

#[derive(Default)]
pub struct Counters {
    pub searches: AtomicUsize,
    pub verifications: AtomicUsize,
}

pub struct Fixture {
    pub base: String,
    pub counters: Arc<Counters>,
}

impl Fixture {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let counters = Arc::new(Counters::default());

        let state = FixtureState {
            base: base.clone(),
            counters: counters.clone(),
        };
        let app = Router::new()
            .route("/search", get(serp))
            .route("/shop/isocol-75ml", get(isocol_page))
            .route("/shop/wd40-multi-use", get(wd40_page))
            .route("/shop/mystery-cleaner", get(plain_page))
            .route("/files/wd40-sds.pdf", get(pdf))
            .route("/files/brochure.pdf", get(pdf))
            .route("/download/file/123", get(pdf))
            // HEAD refused, body labelled as a generic download.
            .route(
                "/docs/domestos.pdf",
                get(octet_stream_pdf).head(|| async { StatusCode::METHOD_NOT_ALLOWED }),
            )
            .route("/verify-sds", post(verify))
            .with_state(state);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base, counters }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn resolver(&self) -> Resolver {
        let accept_language = "en-AU,en;q=0.9";
        let search = BingSearch::new(
            SearchSettings {
                endpoint: self.url("/search"),
                market: "en-AU".into(),
                country: "AU".into(),
                accept_language: accept_language.into(),
                timeout: Duration::from_secs(5),
            },
            None,
        )
        .unwrap();
        let fetcher = HttpFetcher::new(Duration::from_secs(5), accept_language).unwrap();
        let verifier = RemoteVerifier::new(&self.url("/verify-sds"), Duration::from_secs(5)).unwrap();

        Resolver::new(
            Arc::new(search),
            Arc::new(PageExtractor::new(fetcher.clone())),
            Arc::new(HttpPdfDetector::new(fetcher)),
            Arc::new(verifier),
            ResolverSettings {
                hit_delay: Duration::ZERO,
                ..Default::default()
            },
        )
    }

    pub fn searches(&self) -> usize {
        self.counters.searches.load(Ordering::SeqCst)
    }

    pub fn verifications(&self) -> usize {
        self.counters.verifications.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct FixtureState {
    base: String,
    counters: Arc<Counters>,
}

fn bing_wrapped(target: &str) -> String {
    format!(
        "https://www.bing.com/ck/a?!&&p=abc&u=a1{}&ntb=1",
        URL_SAFE_NO_PAD.encode(target)
    )
}

fn serp_page(items: &[(&str, String)]) -> String {
    let lis: String = items
        .iter()
        .map(|(title, href)| {
            format!(
                r#"<li class="b_algo"><h2><a href="{}">{}</a></h2><p>snippet</p></li>"#,
                href, title
            )
        })
        .collect();
    format!(r#"<html><body><ol id="b_results">{}</ol></body></html>"#, lis)
}

async fn serp(
    State(state): State<FixtureState>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<String> {
    state.counters.searches.fetch_add(1, Ordering::SeqCst);
    let q = params.get("q").cloned().unwrap_or_default();
    let url = |path: &str| format!("{}{}", state.base, path);

    let items: Vec<(&str, String)> = if q == "Item 093549004" {
        vec![
            ("Gone", url("/shop/discontinued/093549004")),
            ("Isocol Rubbing Alcohol", bing_wrapped(&url("/shop/isocol-75ml"))),
        ]
    } else if q.starts_with("WD-40") {
        vec![
            ("WD-40 Australia", url("/shop")),
            ("WD-40 Multi-Use Product", url("/shop/wd40-multi-use")),
        ]
    } else if q.starts_with("Domestos") {
        vec![("Domestos document", bing_wrapped(&url("/docs/domestos.pdf")))]
    } else if q.starts_with("Mystery") {
        vec![("Mystery Cleaner", url("/shop/mystery-cleaner"))]
    } else if q.starts_with("Pinkysirup") {
        vec![("Pinkysirup Degreaser", url("/download/file/123"))]
    } else if q.starts_with("Brochure") {
        vec![("Brochure", url("/files/brochure.pdf"))]
    } else {
        Vec::new()
    };
    Html(serp_page(&items))
}

async fn isocol_page() -> Html<&'static str> {
    Html(
        r#"<html><head><title>Isocol Rubbing Alcohol Antiseptic 75ml | Chemist Warehouse</title></head>
        <body><h1>Isocol Rubbing Alcohol Antiseptic 75ml</h1><p>Kills 99.9% of germs.</p></body></html>"#,
    )
}

async fn wd40_page() -> Html<&'static str> {
    Html(
        r#"<html><body><h1>WD-40 Multi-Use Product 300g</h1>
        <a href="/files/brochure.pdf">Brochure</a>
        <a href="/files/wd40-sds.pdf">Safety Data Sheet</a>
        </body></html>"#,
    )
}

async fn plain_page() -> Html<&'static str> {
    Html(r#"<html><body><h1>Mystery Cleaner 1L</h1><a href="/about">About</a></body></html>"#)
}

async fn pdf() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/pdf")], PDF_BYTES)
}

async fn octet_stream_pdf() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/octet-stream")], PDF_BYTES)
}

#[derive(Deserialize)]
struct VerifyRequest {
    url: String,
    name: String,
}

async fn verify(
    State(state): State<FixtureState>,
    Json(req): Json<VerifyRequest>,
) -> impl IntoResponse {
    state.counters.verifications.fetch_add(1, Ordering::SeqCst);
    if req.url.is_empty() || req.name.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": "missing fields" })));
    }
    let verified = req.url.ends_with("/files/wd40-sds.pdf")
        || req.url.ends_with("/docs/domestos.pdf")
        || req.url.ends_with("/download/file/123");
    (StatusCode::OK, Json(serde_json::json!({ "verified": verified })))
}
