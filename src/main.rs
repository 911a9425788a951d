use sds_resolver::api::{self, ApiDoc, AppState};
use sds_resolver::browser::{BrowserManager, LocaleProfile, PageRenderer};
use sds_resolver::config::Config;
use sds_resolver::extractor::PageExtractor;
use sds_resolver::fetch::HttpFetcher;
use sds_resolver::pdf::HttpPdfDetector;
use sds_resolver::search::{BingSearch, SearchSettings};
use sds_resolver::store::{MemoryProductStore, PgProductStore, ProductStore};
use sds_resolver::verifier::{PassthroughVerifier, RemoteVerifier, SdsVerifier};
use sds_resolver::{Resolver, ResolverSettings};

use dotenv::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sds_resolver=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env();

    let store: Arc<dyn ProductStore> = match &config.database_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await?;
            Arc::new(PgProductStore::init(pool).await?)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, products are kept in memory");
            Arc::new(MemoryProductStore::new())
        }
    };

    let accept_language = config.accept_language();
    let browser = if config.browser_enabled {
        Some(Arc::new(BrowserManager::new(LocaleProfile {
            locale: config.search_market.clone(),
            accept_language: accept_language.clone(),
            timezone: config.search_timezone.clone(),
        })))
    } else {
        tracing::info!("Browser search disabled, using HTTP only");
        None
    };

    let search = BingSearch::new(
        SearchSettings {
            endpoint: config.search_endpoint.clone(),
            market: config.search_market.clone(),
            country: config.search_country.clone(),
            accept_language: accept_language.clone(),
            timeout: config.search_timeout,
        },
        browser.clone().map(|b| b as Arc<dyn PageRenderer>),
    )?;

    let fetcher = HttpFetcher::new(config.fetch_timeout, &accept_language)?;

    let verifier: Arc<dyn SdsVerifier> = if config.verify_bypass {
        tracing::warn!("⚠️ SDS_VERIFY_BYPASS is set: every confirmed PDF is accepted unverified");
        Arc::new(PassthroughVerifier)
    } else {
        Arc::new(RemoteVerifier::new(&config.verify_url, config.verify_timeout)?)
    };

    let resolver = Resolver::new(
        Arc::new(search),
        Arc::new(PageExtractor::new(fetcher.clone())),
        Arc::new(HttpPdfDetector::new(fetcher)),
        verifier,
        ResolverSettings {
            candidate_ttl: config.candidate_cache_ttl,
            sds_ttl: config.sds_cache_ttl,
            hit_delay: config.hit_delay,
            max_hits: config.max_hits,
            top_links: config.top_links,
        },
    );

    let resolver = Arc::new(resolver);
    let sweeper = resolver.clone();
    let sweep_every = config.candidate_cache_ttl.max(std::time::Duration::from_secs(60));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        loop {
            interval.tick().await;
            let purged = sweeper.purge_expired();
            if purged > 0 {
                tracing::debug!("Purged {} expired cache entries", purged);
            }
        }
    });

    let state = Arc::new(AppState {
        resolver,
        store,
        request_timeout: config.request_timeout,
    });

    let app = api::router(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(browser) = browser {
        browser.shutdown();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
