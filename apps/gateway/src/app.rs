use axum::{middleware, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::cache::{MemoryShareCache, NoopShareCache, ShareCache};
use crate::config::Config;
use crate::error::AppResult;
use crate::extractor::TokenExtractor;
use crate::logging::request_logger;
use crate::playlist::PlaylistService;
use crate::resolver::ShareResolver;
use crate::routes::gateway_router;
use crate::upstream::UpstreamClient;
use crate::VERSION;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub client: UpstreamClient,
    pub resolver: ShareResolver,
    pub playlists: PlaylistService,
    pub cache: Arc<dyn ShareCache>,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> AppResult<Self> {
        let client = UpstreamClient::new(&config.upstream)?;
        let resolver = ShareResolver::new(client.clone(), Arc::new(TokenExtractor::default()));
        let playlists = PlaylistService::new(client.clone(), &config.server.public_base_url);

        let cache: Arc<dyn ShareCache> = if config.cache.enabled {
            Arc::new(MemoryShareCache::from_config(&config.cache))
        } else {
            Arc::new(NoopShareCache)
        };

        Ok(Self {
            config,
            client,
            resolver,
            playlists,
            cache,
        })
    }
}

#[derive(Serialize)]
struct HealthcheckResponse {
    status: String,
    version: String,
}

async fn healthcheck() -> Json<HealthcheckResponse> {
    Json(HealthcheckResponse {
        status: "healthy".to_string(),
        version: VERSION.to_string(),
    })
}

pub fn create_app(config: Arc<Config>) -> AppResult<Router> {
    let state = AppState::new(config)?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(Router::new()
        .route("/healthcheck", get(healthcheck))
        .merge(gateway_router())
        .layer(middleware::from_fn(request_logger))
        .layer(cors)
        .with_state(state))
}
