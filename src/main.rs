use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rustiscorm_studio::ai::AiAssistant;
use rustiscorm_studio::config::Config;
use rustiscorm_studio::export::{pdf::ChromePdf, Exporter};
use rustiscorm_studio::routes::{self, AppState};
use rustiscorm_studio::store::{CourseStore, MemStore, PgStore};
use rustiscorm_studio::db;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "rustiscorm_studio=info,axum=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let api = match &config.database_url {
        Some(url) => {
            let pool = db::connect(url).await?;
            tracing::info!("using postgres store");
            api(&config, PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, courses live in memory only");
            api(&config, MemStore::new())
        }
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(api)
        .layer(DefaultBodyLimit::max(config.body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn api<S: CourseStore>(config: &Config, store: S) -> Router {
    let pdf = ChromePdf::new(config.chrome_path.clone(), config.pdf_timeout);
    routes::router(AppState {
        store: Arc::new(store),
        exporter: Arc::new(Exporter::new(config.export_settings(), Arc::new(pdf))),
        ai: Arc::new(AiAssistant::new(config.ai_settings())),
    })
}
