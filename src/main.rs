use std::sync::Arc;

use sqlx::SqlitePool;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use kolekta_api::api;
use kolekta_api::config::Config;
use kolekta_api::fanout::FanoutHub;

#[derive(OpenApi)]
#[openapi(
    info(title = "Kolekta Tracking API", version = "0.1.0"),
    paths(
        api::schedules::list_schedules,
        api::schedules::get_schedule_map,
        api::schedules::start_schedule,
        api::schedules::update_station_status,
        api::schedules::complete_schedule,
        api::health::health_check,
    ),
    components(schemas(
        api::ErrorResponse,
        api::schedules::ScheduleMapResponse,
        api::schedules::StationStatusRequest,
        api::health::HealthResponse,
        kolekta_api::models::Schedule,
        kolekta_api::models::ScheduleSnapshot,
        kolekta_api::models::ScheduleStatus,
        kolekta_api::models::Station,
        kolekta_api::models::StationPatch,
        kolekta_api::models::StationStatus,
        kolekta_api::progress::MarkerDescriptor,
    )),
    tags(
        (name = "schedules", description = "Schedule snapshots and driver actions"),
        (name = "health", description = "Service health check")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info,sqlx=warn".into()),
        )
        .init();

    // Load config
    let config = Config::load("config.yaml").expect("Failed to load config");
    tracing::info!(bind_addr = %config.bind_addr, "Loaded configuration");

    // Build CORS layer based on config
    let cors_layer = if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode explicitly enabled (all origins allowed) - DO NOT USE IN PRODUCTION");
        CorsLayer::permissive()
    } else if !config.cors_origins.is_empty() {
        tracing::info!(origins = ?config.cors_origins, "CORS: Restricting to configured origins");
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    } else {
        panic!("CORS configuration error: Either set 'cors_origins' with allowed origins, or set 'cors_permissive: true' for development");
    };

    // Initialize SQLite database
    if let Err(e) = std::fs::create_dir_all(&config.database_dir) {
        tracing::warn!("Could not create database directory: {}", e);
    }
    let db_file = std::path::Path::new(&config.database_dir).join("tracking.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_file.display());
    let pool = SqlitePool::connect(&db_url)
        .await
        .expect("Failed to connect to SQLite database");

    // Run migrations
    let migrator = sqlx::migrate!("./migrations");
    tracing::info!(migrations = migrator.migrations.len(), "Found migrations");
    migrator.run(&pool).await.expect("Failed to run migrations");
    tracing::info!("Database migrations completed");

    // Fan-out hub shared by driver actions and WebSocket subscribers
    let hub = Arc::new(FanoutHub::new());

    // Build the app
    let app = axum::Router::new()
        .route("/", axum::routing::get(root))
        .nest("/api", api::router(pool.clone(), hub))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind listen address");

    tracing::info!("Server running on http://{}", config.bind_addr);
    tracing::info!("Swagger UI: http://{}/swagger-ui", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

async fn root() -> &'static str {
    "Kolekta Tracking API"
}
