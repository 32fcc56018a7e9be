//! Application wiring: shared state, collaborator construction, router.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::api;
use crate::config::AppConfig;
use crate::pipeline::{Pipeline, PipelineDeps, PipelineOptions};
use crate::providers::{
    GeminiClient, HttpImageFetcher, ImageGenerator, OpenAiImageClient, ReplicateClient,
    ReplicateModel,
};
use crate::records::{GenerationStore, MemoryGenerationStore, PgGenerationStore};
use crate::storage::{BlobStore, LocalFileStorage, VercelBlobStorage};

#[derive(Clone)]
pub struct AppState {
    /// `None` until every provider credential is configured.
    pub pipeline: Option<Arc<Pipeline>>,
    pub records: Arc<dyn GenerationStore>,
    pub history_limit: usize,
    pub max_upload_bytes: usize,
}

/// Everything `main` needs to serve: state plus the directory to expose
/// under `/cache` when blobs live on local disk.
pub struct App {
    pub state: AppState,
    pub local_cache_dir: Option<PathBuf>,
}

pub fn build_app(config: &AppConfig) -> Result<App> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("style-compare/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let (blob_store, local_cache_dir): (Arc<dyn BlobStore>, Option<PathBuf>) =
        match &config.blob_token {
            Some(token) => {
                tracing::info!("storing blobs in Vercel Blob");
                (Arc::new(VercelBlobStorage::new(http.clone(), token.clone())), None)
            }
            None => {
                tracing::info!(dir = %config.cache_dir.display(), "storing blobs on local disk");
                (
                    Arc::new(LocalFileStorage::new(
                        config.cache_dir.clone(),
                        config.cache_base_url.clone(),
                    )),
                    Some(config.cache_dir.clone()),
                )
            }
        };

    let records: Arc<dyn GenerationStore> = match &config.database_url {
        Some(url) => Arc::new(PgGenerationStore::connect_lazy(url)?),
        None => {
            tracing::warn!("DATABASE_URL not set, generation history is kept in memory only");
            Arc::new(MemoryGenerationStore::new())
        }
    };

    let credentials = &config.credentials;
    let pipeline = match (
        &credentials.openai_api_key,
        &credentials.gemini_api_key,
        &credentials.replicate_api_token,
    ) {
        (Some(openai_key), Some(gemini_key), Some(replicate_token)) => {
            let gemini = Arc::new(GeminiClient::new(http.clone(), gemini_key));
            let generators: Vec<Arc<dyn ImageGenerator>> = vec![
                Arc::new(OpenAiImageClient::new(http.clone(), openai_key)),
                gemini.clone(),
                Arc::new(ReplicateClient::new(
                    http.clone(),
                    replicate_token,
                    ReplicateModel::Flux,
                )),
                Arc::new(ReplicateClient::new(
                    http.clone(),
                    replicate_token,
                    ReplicateModel::Sdxl,
                )),
            ];
            let deps = PipelineDeps {
                blob_store,
                records: records.clone(),
                analyzer: gemini,
                generators,
                fetcher: Arc::new(HttpImageFetcher::new(http.clone())),
            };
            Some(Arc::new(Pipeline::new(
                deps,
                PipelineOptions {
                    provider_timeout: config.provider_timeout,
                },
            )))
        }
        _ => {
            tracing::warn!(
                missing = ?credentials.missing(),
                "provider credentials incomplete, generate requests will be rejected"
            );
            None
        }
    };

    Ok(App {
        state: AppState {
            pipeline,
            records,
            history_limit: config.history_limit,
            max_upload_bytes: config.max_upload_bytes,
        },
        local_cache_dir,
    })
}

pub fn build_router(state: AppState, local_cache_dir: Option<PathBuf>) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);
    let mut router = Router::new()
        .route("/health", get(api::health))
        .route(
            "/api/generate",
            post(api::generate).layer(upload_limit),
        )
        .route("/api/history", get(api::history));
    if let Some(dir) = local_cache_dir {
        router = router.nest_service("/cache", ServeDir::new(dir));
    }
    router.layer(TraceLayer::new_for_http()).with_state(state)
}
