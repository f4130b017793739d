mod cache;
mod config;
mod db;
mod models;
mod responses;
mod routes;
mod services;
mod state;
mod utils;
mod worker;

use std::{net::SocketAddr, sync::Arc};

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::{
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use reqwest::Client;
use sqlx::sqlite::SqlitePool;
use tokio::net::TcpListener;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cache::QueryCache;
use crate::config::Config;
use crate::db::sqlite_sql_runner::SqliteSqlRunner;
use crate::db::sql_runner::SqlRunner;
use crate::responses::JsonResponse;
use crate::routes::health::{api_health, health, list_backends, root};
use crate::routes::query::{
    ask, download_csv, generate_figure, generate_followups, generate_sql, load_question,
    question_history, run_sql,
};
use crate::services::llm::select_backend;
use crate::services::query::QueryService;
use crate::state::AppState;
use crate::worker::TaskPool;

#[cfg(feature = "tls")]
use axum_server::tls_rustls::RustlsConfig;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let rate_limit_ms: u64 = std::env::var("RATE_LIMITER_MILLISECONDS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        // Default: 200ms/token (~5 req/sec)
        .unwrap_or(200);
    let rate_limit_burst: u32 = std::env::var("RATE_LIMITER_BURST")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        // Default: allow short bursts during client polling
        .unwrap_or(20);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(rate_limit_ms)
            .burst_size(rate_limit_burst)
            .use_headers()
            .error_handler(|_err| {
                JsonResponse::too_many_requests(
                    "Too many requests. Please wait a moment and try again.",
                )
                .into_response()
            })
            .finish()
            .unwrap(),
    );

    // Background task to cleanup old IPs
    let governor_limiter = governor_conf.limiter().clone();
    std::thread::spawn(move || {
        let interval = std::time::Duration::from_secs(60);
        loop {
            std::thread::sleep(interval);
            governor_limiter.retain_recent();
        }
    });

    let config = Arc::new(Config::from_env());

    let pool = establish_connection(&config.database_url).await;
    let sql_runner = Arc::new(SqliteSqlRunner::new(pool)) as Arc<dyn SqlRunner>;

    let http_client = Client::new();
    let llm = select_backend(&http_client, &config.llm)
        .expect("No LLM backend available. Set AGENT_GATEWAY_URL or ANTHROPIC_API_KEY.");

    let query = Arc::new(QueryService::new(
        Arc::new(QueryCache::new()),
        llm,
        sql_runner,
        TaskPool::new(config.worker_pool_size),
    ));

    let state = AppState {
        query,
        http_client,
        config: config.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(config.frontend_origin.parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let query_routes = Router::new()
        .route("/", post(ask))
        .route("/generate_sql", post(generate_sql))
        .route("/run_sql", post(run_sql))
        .route("/generate_figure", post(generate_figure))
        .route("/generate_followups", post(generate_followups))
        .route("/load_question", post(load_question))
        .route("/history", get(question_history))
        .route("/download_csv/{id}", get(download_csv));

    let api_routes = Router::new()
        .route("/health", get(api_health))
        .route("/backends", get(list_backends))
        .nest("/query", query_routes);

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api/v0", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer {
            config: governor_conf.clone(),
        })
        .layer(cors);

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let addr = SocketAddr::from(([127, 0, 0, 1], 8000));

    #[cfg(feature = "tls")]
    {
        // TLS: Only run this block when `--features tls` is used
        let tls_config = RustlsConfig::from_pem_file(
            std::env::var("DEV_CERT_LOCATION").unwrap(),
            std::env::var("DEV_KEY_LOCATION").unwrap(),
        )
        .await
        .expect("Failed to load TLS certs");

        println!("Running with TLS at https://{}", addr);
        let _ = axum_server::bind_rustls(addr, tls_config)
            .serve(make_service)
            .await;

        return; // Skip the fallback if TLS was used
    }

    let listener = TcpListener::bind(addr).await.unwrap();
    println!("Running without TLS at http://{}", addr);
    axum::serve(listener, make_service).await.unwrap();
}

/// Establish a connection to the database and verify it.
async fn establish_connection(database_url: &str) -> SqlitePool {
    let pool = SqlitePool::connect(database_url)
        .await
        .expect("Failed to connect to the database");

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .expect("Failed to verify database connection");

    info!("Successfully connected to the database");
    pool
}
