use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, routing::post, Json, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};

use poi_pipeline_common::config;
use poi_pipeline_engine::circuit_breaker::CircuitBreakerRegistry;
use poi_pipeline_engine::orchestrator::Orchestrator;
use poi_pipeline_engine::{alias_cache, content_reader, embeddings, geocode_cache, llm, resolver, url_cache, vectorstore};

/// Shared application state accessible from axum handlers.
struct AppState {
    orchestrator: Arc<Orchestrator>,
    metrics_handle: PrometheusHandle,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("POI pipeline engine starting");

    let config_path = std::env::var("PIPELINE_CONFIG_PATH").unwrap_or_else(|_| "config/pipeline.toml".into());

    let pipeline_config = match config::load_config(&config_path) {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration — refusing to start");
            std::process::exit(1);
        }
    };

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");

    let vector_store = match vectorstore::VectorStore::connect(&pipeline_config.vector_store).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to vector store");
            std::process::exit(1);
        }
    };

    let alias_cache = match alias_cache::AliasCache::connect(&pipeline_config.cache.alias_cache_path).await {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            tracing::error!(error = %e, "Failed to open alias cache");
            std::process::exit(1);
        }
    };

    let url_cache = match url_cache::UrlCache::connect(&pipeline_config.cache.url_cache_path).await {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            tracing::error!(error = %e, "Failed to open url cache");
            std::process::exit(1);
        }
    };

    let geocode_cache = match geocode_cache::GeocodeCache::load(&pipeline_config.cache.geocode_cache_path) {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load geocode cache");
            std::process::exit(1);
        }
    };

    let resolver = resolver::PlaceResolver::new(pipeline_config.place_provider.clone()).map(Arc::new);
    if resolver.is_none() {
        tracing::warn!("Place provider API key not set — web-discovered POIs will not resolve");
    }

    let llm_client = llm::LlmClient::new(pipeline_config.llm.clone(), pipeline_config.retry.llm.clone()).map(Arc::new);
    if llm_client.is_none() {
        tracing::warn!("LLM API key not set — keyword expansion, summarization, and reranking are disabled");
    }

    let embedding_client =
        embeddings::EmbeddingClient::new(pipeline_config.embedding.clone(), pipeline_config.retry.embedding.clone())
            .map(Arc::new);
    if embedding_client.is_none() {
        tracing::error!("Embedding API key not set — refusing to start (hard dependency)");
        std::process::exit(1);
    }

    let content_reader = Arc::new(content_reader::ContentReader::new(&pipeline_config.fetch_sidecar));

    let circuit_breakers = Arc::new(CircuitBreakerRegistry::new());
    {
        let cbs = Arc::clone(&circuit_breakers);
        tokio::spawn(async move {
            let interval = std::time::Duration::from_secs(30);
            loop {
                tokio::time::sleep(interval).await;
                cbs.report_metrics();
            }
        });
    }

    let pipeline_config = Arc::new(pipeline_config);

    let orchestrator = Arc::new(Orchestrator::new(
        vector_store,
        alias_cache,
        url_cache,
        geocode_cache,
        resolver,
        llm_client,
        embedding_client,
        content_reader,
        Arc::clone(&pipeline_config),
        Arc::clone(&circuit_breakers),
    ));

    let state = Arc::new(AppState {
        orchestrator,
        metrics_handle,
    });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/run", post(run_handler))
        .with_state(state);

    let port: u16 = std::env::var("ENGINE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("Failed to bind TCP listener");

    tracing::info!(port, "POI pipeline engine listening");

    axum::serve(listener, app).await.expect("HTTP server error");
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "healthy" })))
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}

/// Request body for `POST /run` (spec §6).
#[derive(Deserialize)]
struct RunRequest {
    persona_summary: String,
    travel_destination: String,
    start_date: String,
    end_date: String,
    #[serde(default)]
    save_path: Option<String>,
}

#[derive(Serialize)]
struct RunResponse {
    pois: Vec<poi_pipeline_common::types::Poi>,
    target: usize,
    final_count: usize,
}

async fn run_handler(State(state): State<Arc<AppState>>, Json(req): Json<RunRequest>) -> impl IntoResponse {
    match state
        .orchestrator
        .run(
            req.persona_summary,
            req.travel_destination,
            req.start_date,
            req.end_date,
            req.save_path,
        )
        .await
    {
        Ok((pois, run_state)) => {
            let body = RunResponse {
                final_count: pois.len(),
                target: run_state.target,
                pois,
            };
            (StatusCode::OK, Json(serde_json::to_value(body).unwrap_or_default())).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "pipeline run failed");
            let body = serde_json::json!({ "error": e.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}
