use std::sync::{Arc, Mutex};

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use chairside::config::AppConfig;
use chairside::db;
use chairside::handlers;
use chairside::services::notifications::email::HttpEmailNotifier;
use chairside::services::notifications::{LogNotifier, Notifier};
use chairside::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    // No email API configured means dev mode: notifications go to the log.
    let notifier: Box<dyn Notifier> = if config.email_api_url.is_empty() {
        tracing::info!("EMAIL_API_URL not set, logging notifications instead of sending");
        Box::new(LogNotifier)
    } else {
        Box::new(HttpEmailNotifier::new(
            config.email_api_url.clone(),
            config.email_api_key.clone(),
            config.email_from.clone(),
        ))
    };

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        notifier,
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/api/availability",
            get(handlers::availability::get_availability),
        )
        .route("/api/bookings", post(handlers::booking::create_booking))
        .route(
            "/api/bookings/confirm",
            post(handlers::booking::confirm_booking),
        )
        .route(
            "/api/bookings/cancel",
            post(handlers::booking::cancel_booking),
        )
        .route(
            "/api/bookings/reschedule",
            post(handlers::booking::reschedule_booking),
        )
        .route("/api/admin/bookings", get(handlers::admin::get_bookings))
        .route(
            "/api/admin/bookings/:id/cancel",
            post(handlers::admin::cancel_booking),
        )
        .route("/api/admin/settings", get(handlers::admin::get_settings))
        .route(
            "/api/admin/settings",
            post(handlers::admin::update_settings),
        )
        .route("/api/admin/barbers", post(handlers::admin::create_barber))
        .route("/api/admin/services", post(handlers::admin::create_service))
        .route("/api/admin/rules", post(handlers::admin::create_rule))
        .route("/api/admin/time-off", post(handlers::admin::create_time_off))
        .route("/api/admin/blocks", post(handlers::admin::create_block))
        .route("/api/admin/blocks", get(handlers::admin::list_blocks))
        .route(
            "/api/admin/blocks/:id",
            delete(handlers::admin::delete_block),
        )
        .route("/api/admin/sweep", post(handlers::admin::sweep_expired))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
