use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One organic result from the search engine, in engine-ranked order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
}

impl SearchHit {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

/// Product identity scraped from a single retailer page.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductCandidate {
    #[schema(example = "Isocol Rubbing Alcohol")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "75 mL")]
    pub size_or_weight: Option<String>,
}

/// Terminal output of a name to SDS lookup.
///
/// `sds_url` is empty and `verified` is false when nothing passed
/// verification. `top_links` always carries the leading raw hits.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SdsResolution {
    pub sds_url: String,
    pub verified: bool,
    pub top_links: Vec<String>,
}

impl SdsResolution {
    pub fn verified(sds_url: String, top_links: Vec<String>) -> Self {
        Self {
            sds_url,
            verified: true,
            top_links,
        }
    }

    pub fn not_found(top_links: Vec<String>) -> Self {
        Self {
            sds_url: String::new(),
            verified: false,
            top_links,
        }
    }
}

/// Outcome of probing a URL for PDF content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfCheck {
    pub is_pdf: bool,
    /// Location after following redirects; the input URL when the probe failed.
    pub final_url: String,
}

impl PdfCheck {
    pub fn not_pdf(url: &str) -> Self {
        Self {
            is_pdf: false,
            final_url: url.to_string(),
        }
    }
}

/// Persisted product row.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    #[schema(example = "093549004")]
    pub barcode: String,
    pub name: String,
    pub size_or_weight: Option<String>,
    pub sds_url: Option<String>,
    #[serde(default)]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}
