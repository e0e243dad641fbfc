//! Drunken Bot API Gateway
//!
//! HTTP front end for lyric autocompletion:
//! - Completion requests forwarded to the inference backend and cleaned
//! - Similarity retrieval over the lyric index
//! - Observability (logging, metrics)

mod completion;
mod handlers;

use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use completion::{CompletionBackend, VllmClient};
use drunkenbot_common::{config::AppConfig, embeddings, index, metrics};
use drunkenbot_search::Retriever;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub completion: Arc<dyn CompletionBackend>,
    pub retriever: Option<Arc<Retriever>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);
    init_tracing(&config);

    info!("Starting Drunken Bot API Gateway v{}", drunkenbot_common::VERSION);

    if config.observability.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .set_buckets(metrics::LATENCY_BUCKETS)?
            .with_http_listener(addr)
            .install()?;
        metrics::register_metrics();
        info!(%addr, "Prometheus exporter listening");
    }

    let completion: Arc<dyn CompletionBackend> = Arc::new(VllmClient::new(&config.completion)?);
    info!(url = %config.completion.url, model = completion.model(), "Inference backend configured");

    let retriever = if config.retrieval.enabled {
        let embedder = embeddings::create_embedder(&config.embedding)?;
        let index = index::open_index(&config.index).await?;
        info!(
            embedder = embedder.model_name(),
            index = index.name(),
            collection = %config.index.collection,
            "Retrieval enabled"
        );
        Some(Arc::new(Retriever::new(embedder, index, &config.index.collection)))
    } else {
        None
    };

    let state = AppState {
        config: config.clone(),
        completion,
        retriever,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let timeout = TimeoutLayer::new(Duration::from_secs(state.config.server.request_timeout_secs));

    Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health))
        .route("/complete", post(handlers::complete::complete))
        .route("/retrieve", post(handlers::retrieve::retrieve))
        .layer(TraceLayer::new_for_http())
        .layer(timeout)
        .layer(cors)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use completion::SamplingParams;
    use drunkenbot_common::embeddings::{Embedder, HashEmbedder};
    use drunkenbot_common::errors::{AppError, Result};
    use drunkenbot_common::index::{ChunkMetadata, MemoryIndex, UpsertBatch, VectorIndex};
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Backend returning a canned completion and recording the last call
    struct StubBackend {
        reply: std::result::Result<String, String>,
        last: Mutex<Option<(String, SamplingParams)>>,
    }

    impl StubBackend {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                last: Mutex::new(None),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err("connection refused".to_string()),
                last: Mutex::new(None),
            })
        }

        fn last_call(&self) -> Option<(String, SamplingParams)> {
            self.last.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionBackend for StubBackend {
        async fn generate(&self, prompt: &str, params: SamplingParams) -> Result<String> {
            *self.last.lock().unwrap() = Some((prompt.to_string(), params));
            self.reply
                .clone()
                .map_err(|message| AppError::CompletionError { message })
        }

        fn model(&self) -> &str {
            "stub-model"
        }
    }

    fn app(backend: Arc<StubBackend>, retriever: Option<Arc<Retriever>>) -> Router {
        create_router(AppState {
            config: Arc::new(AppConfig::default()),
            completion: backend,
            retriever,
        })
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        send(app, request).await
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_complete_returns_cleaned_completion() {
        let backend = StubBackend::replying("<think></think>is this just fantasy");
        let (status, body) = post_json(
            app(backend.clone(), None),
            "/complete",
            json!({"text": "Is this the real life, is this"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["completion"], " just fantasy");
        assert_eq!(body["raw_completion"], "<think></think>is this just fantasy");

        let (prompt, params) = backend.last_call().unwrap();
        assert_eq!(prompt, "Is this the real life, is this");
        assert_eq!(params.max_tokens, 20);
        assert!((params.temperature - 0.7).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_complete_passes_sampling_params() {
        let backend = StubBackend::replying("la la");
        let (status, _) = post_json(
            app(backend.clone(), None),
            "/complete",
            json!({"text": "sing", "max_tokens": 100, "temperature": 0.0}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let (_, params) = backend.last_call().unwrap();
        assert_eq!(params.max_tokens, 100);
        assert_eq!(params.temperature, 0.0);
    }

    #[tokio::test]
    async fn test_complete_rejects_invalid_requests() {
        let cases = [
            (json!({"text": ""}), "text"),
            (json!({"text": "hi", "max_tokens": 0}), "max_tokens"),
            (json!({"text": "hi", "max_tokens": 101}), "max_tokens"),
            (json!({"text": "hi", "temperature": 2.5}), "temperature"),
            (json!({"text": "hi", "temperature": -0.1}), "temperature"),
        ];

        for (request, field) in cases {
            let backend = StubBackend::replying("unused");
            let (status, body) = post_json(app(backend.clone(), None), "/complete", request).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{field}");
            assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
            assert_eq!(body["error"]["details"]["field"], field);
            assert!(backend.last_call().is_none());
        }
    }

    #[tokio::test]
    async fn test_complete_rejects_malformed_json() {
        let request = Request::builder()
            .method("POST")
            .uri("/complete")
            .header("content-type", "application/json")
            .body(Body::from("{\"text\":"))
            .unwrap();
        let (status, body) = send(app(StubBackend::replying("x"), None), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_FORMAT");
    }

    #[tokio::test]
    async fn test_complete_inference_failure_is_bad_gateway() {
        let (status, body) =
            post_json(app(StubBackend::failing(), None), "/complete", json!({"text": "hello"})).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "COMPLETION_ERROR");
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let (status, body) = send(app(StubBackend::replying("x"), None), get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");
        assert_eq!(body["model"], "stub-model");
        assert_eq!(body["vllm_url"], "http://localhost:8000/v1/completions");
        assert_eq!(body["version"], drunkenbot_common::VERSION);

        let (status, body) = send(app(StubBackend::replying("x"), None), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "The Drunken Bot API");
    }

    async fn seeded_retriever() -> Arc<Retriever> {
        let embedder = Arc::new(HashEmbedder::new(64));
        let index = Arc::new(MemoryIndex::new());
        let texts = vec![
            "we will we will rock you".to_string(),
            "buddy you're a boy make a big noise".to_string(),
        ];
        let embeddings = embedder.embed_batch(&texts).await.unwrap();
        index
            .upsert(
                "lyric_chunks",
                UpsertBatch {
                    model: embedder.model_name().to_string(),
                    ids: vec!["Queen_We-Will-Rock-You_0".into(), "Queen_We-Will-Rock-You_1".into()],
                    texts,
                    embeddings,
                    metadatas: vec![
                        ChunkMetadata {
                            artist: "Queen".into(),
                            title: "We Will Rock You".into(),
                            album: Some("News of the World".into()),
                        };
                        2
                    ],
                },
            )
            .await
            .unwrap();
        Arc::new(Retriever::new(embedder, index, "lyric_chunks"))
    }

    #[tokio::test]
    async fn test_retrieve_endpoint() {
        let app = app(StubBackend::replying("x"), Some(seeded_retriever().await));
        let (status, body) =
            post_json(app, "/retrieve", json!({"query": "we will rock you", "top_k": 1})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["results"][0]["text"], "we will we will rock you");
        assert_eq!(body["results"][0]["metadata"]["album"], "News of the World");
        assert!(body["results"][0]["similarity_score"].as_f64().unwrap() > 0.5);
    }

    #[tokio::test]
    async fn test_retrieve_validation_and_disabled() {
        let app_with = app(StubBackend::replying("x"), Some(seeded_retriever().await));
        let (status, body) =
            post_json(app_with, "/retrieve", json!({"query": "rock", "threshold": 1.5})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["details"]["field"], "threshold");

        let (status, _) =
            post_json(app(StubBackend::replying("x"), None), "/retrieve", json!({"query": "rock"})).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
