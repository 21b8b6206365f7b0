use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use forms_api_rust::auth::FieldCipher;
use forms_api_rust::config;
use forms_api_rust::database::DatabaseManager;
use forms_api_rust::handlers::{companies, mail, menu};
use forms_api_rust::mail::Mailer;
use forms_api_rust::middleware::auth::token_auth_middleware;
use forms_api_rust::middleware::rate_limit::{mail_rate_limit_middleware, ClientRateLimiter};
use forms_api_rust::services::SyncService;
use forms_api_rust::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, MAIL_KEY, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = config::config();
    tracing::info!("Starting Forms API in {:?} mode", config.environment);

    let manager = Arc::new(DatabaseManager::new());
    let mailer = Mailer::from_config(&config.smtp)?;

    let state = AppState {
        manager: manager.clone(),
        cipher: Arc::new(FieldCipher::new(&config.security.field_key)),
        mailer: Arc::new(mailer),
        mail_limiter: Arc::new(ClientRateLimiter::per_minute(
            config.api.mail_rate_limit_per_minute,
        )),
        sync: Arc::new(SyncService::new(manager)),
    };

    let app = app(state);

    // Allow tests or deployments to override port via env
    let port = std::env::var("FORMS_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("Forms API server listening on http://{}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/web/filter", post(menu::filter_post))
        // Rate-limited mail endpoint
        .merge(mail_routes(state.clone()))
        // Token-protected company administration
        .merge(company_routes(state.clone()))
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn mail_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/mail/send", post(mail::send_post))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            mail_rate_limit_middleware,
        ))
}

fn company_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/companies/:db_name", get(companies::company_get))
        .route("/api/companies/:db_name/plan", put(companies::plan_put))
        .route(
            "/api/companies/:db_name/suspension",
            put(companies::suspension_put),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            token_auth_middleware,
        ))
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Forms API (Rust)",
            "version": version,
            "description": "Multi-tenant forms administration backend",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "menu": "/api/web/filter (public)",
                "mail": "/api/mail/send (token + access key, rate limited)",
                "companies": "/api/companies/:db_name[/plan|/suspension] (protected)",
            }
        }
    }))
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    match state.manager.health_check().await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string()
                }
            })),
        ),
    }
}
