use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use utoipa::{OpenApi, ToSchema};

use crate::pipeline::Resolver;
use crate::store::ProductStore;
use crate::types::{ProductCandidate, ProductRecord, SdsResolution};

pub struct AppState {
    pub resolver: Arc<Resolver>,
    pub store: Arc<dyn ProductStore>,
    /// Upper bound on any single pipeline call made by a handler.
    pub request_timeout: Duration,
}

#[derive(OpenApi)]
#[openapi(
    paths(health, get_product, upsert_product, sds_by_name),
    components(schemas(
        HealthResponse,
        LookupSource,
        ProductLookupResponse,
        UpsertProductRequest,
        SdsByNameRequest,
        ProductRecord,
        ProductCandidate,
        SdsResolution
    )),
    tags(
        (name = "products", description = "Barcode lookup and product records"),
        (name = "sds", description = "Safety data sheet resolution")
    )
)]
pub struct ApiDoc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/products", post(upsert_product))
        .route("/products/:barcode", get(get_product))
        .route("/sds/by-name", post(sds_by_name))
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LookupSource {
    Store,
    Search,
    None,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductLookupResponse {
    pub barcode: String,
    pub source: LookupSource,
    /// Present when the product was already stored.
    pub record: Option<ProductRecord>,
    /// Present when the product was found by search; not persisted.
    pub candidate: Option<ProductCandidate>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpsertProductRequest {
    pub barcode: String,
    pub name: String,
    pub size_or_weight: Option<String>,
    pub sds_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SdsByNameRequest {
    #[schema(example = "WD-40 Multi-Use Product")]
    pub name: String,
    pub size: Option<String>,
    /// Stored product to attach a verified SDS to.
    pub barcode: Option<String>,
}

async fn bounded<T>(limit: Duration, fut: impl Future<Output = T>) -> Result<T, StatusCode> {
    tokio::time::timeout(limit, fut).await.map_err(|_| {
        tracing::warn!("⏱️ Pipeline call exceeded {:?}", limit);
        StatusCode::GATEWAY_TIMEOUT
    })
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/products/{barcode}",
    params(("barcode" = String, Path, description = "EAN/UPC barcode")),
    responses(
        (status = 200, description = "Stored record, search candidate, or nothing", body = ProductLookupResponse),
        (status = 500, description = "Store failure"),
        (status = 504, description = "Search exceeded the request timeout")
    ),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(barcode): Path<String>,
) -> Result<Json<ProductLookupResponse>, StatusCode> {
    let barcode = barcode.trim().to_string();

    let stored = state.store.get_product_by_barcode(&barcode).await.map_err(|e| {
        tracing::error!("❌ Store lookup failed for {}: {}", barcode, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    if let Some(record) = stored {
        return Ok(Json(ProductLookupResponse {
            barcode,
            source: LookupSource::Store,
            record: Some(record),
            candidate: None,
        }));
    }

    let candidate = bounded(
        state.request_timeout,
        state.resolver.resolve_candidate_from_barcode(&barcode),
    )
    .await?;

    let source = if candidate.is_some() {
        LookupSource::Search
    } else {
        LookupSource::None
    };
    Ok(Json(ProductLookupResponse {
        barcode,
        source,
        record: None,
        candidate,
    }))
}

#[utoipa::path(
    post,
    path = "/products",
    request_body = UpsertProductRequest,
    responses(
        (status = 200, description = "Saved record", body = ProductRecord),
        (status = 400, description = "Missing barcode or name"),
        (status = 500, description = "Store failure")
    ),
    tag = "products"
)]
pub async fn upsert_product(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpsertProductRequest>,
) -> Result<Json<ProductRecord>, StatusCode> {
    let barcode = req.barcode.trim();
    let name = req.name.trim();
    if barcode.is_empty() || name.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let record = ProductRecord {
        barcode: barcode.to_string(),
        name: name.to_string(),
        size_or_weight: req.size_or_weight.filter(|s| !s.trim().is_empty()),
        sds_url: req.sds_url.filter(|s| !s.trim().is_empty()),
        updated_at: None,
    };
    let saved = state.store.upsert_product(record).await.map_err(|e| {
        tracing::error!("❌ Failed to save product {}: {}", barcode, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(saved))
}

#[utoipa::path(
    post,
    path = "/sds/by-name",
    request_body = SdsByNameRequest,
    responses(
        (status = 200, description = "Verified SDS, or an empty URL with the top links", body = SdsResolution),
        (status = 400, description = "Missing name"),
        (status = 504, description = "Resolution exceeded the request timeout")
    ),
    tag = "sds"
)]
pub async fn sds_by_name(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SdsByNameRequest>,
) -> Result<Json<SdsResolution>, StatusCode> {
    if req.name.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let resolution = bounded(
        state.request_timeout,
        state.resolver.resolve_sds_by_name(&req.name, req.size.as_deref()),
    )
    .await?;

    if resolution.verified {
        if let Some(barcode) = req.barcode.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            // The resolution is still returned if the write fails.
            match state.store.update_sds_url(barcode, &resolution.sds_url).await {
                Ok(true) => tracing::info!("💾 Stored SDS for {}", barcode),
                Ok(false) => tracing::debug!("No stored product {} to attach SDS to", barcode),
                Err(e) => tracing::error!("❌ Failed to store SDS for {}: {}", barcode, e),
            }
        }
    }

    Ok(Json(resolution))
}
