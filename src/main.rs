use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use petmate::config::{LoggingSettings, Settings};
use petmate::routes::{self, AppState};
use petmate::services::{
    build_broadcaster, CachedDirectory, ConnectionRegistry, HttpNotificationSink,
    HttpUserDirectory, NoopNotificationSink, NotificationSink, OfflineDirectory, UserDirectory,
};
use petmate::store::{Datastore, MemoryStore, PgStore};

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle query payload errors
pub fn handle_query_payload_error(err: error::QueryPayloadError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    JsonError {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle path parameter errors
pub fn handle_path_error(err: error::PathError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    JsonError {
        error: "invalid_path".to_string(),
        message: format!("Invalid path: {}", err),
        status_code: 400,
    }
    .into()
}

fn init_tracing(logging: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if logging.format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

async fn open_store(settings: &Settings) -> Result<Arc<dyn Datastore>, petmate::StoreError> {
    if settings.database.is_memory() {
        warn!("Using the in-memory store; data is lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = PgStore::from_settings(
        &settings.database.url,
        settings.database.max_connections,
        settings.database.min_connections,
        settings.database.acquire_timeout_secs,
        settings.database.idle_timeout_secs,
    )
    .await?;

    info!(
        max_connections = settings.database.max_connections.unwrap_or(10),
        "PostgreSQL store initialized"
    );
    Ok(Arc::new(store))
}

fn build_directory(settings: &Settings) -> Arc<dyn UserDirectory> {
    let Some(base_url) = settings.directory.base_url.as_deref().filter(|u| !u.trim().is_empty()) else {
        warn!("No user directory configured, profiles will use placeholders");
        return Arc::new(OfflineDirectory);
    };

    match HttpUserDirectory::new(base_url, settings.directory.timeout()) {
        Ok(http) => {
            info!(
                base_url,
                capacity = settings.cache.capacity,
                ttl_secs = settings.cache.ttl_secs,
                miss_ttl_secs = settings.cache.miss_ttl_secs,
                "User directory client initialized"
            );
            Arc::new(CachedDirectory::new(
                Arc::new(http),
                settings.cache.capacity,
                Duration::from_secs(settings.cache.ttl_secs),
                Duration::from_secs(settings.cache.miss_ttl_secs),
            ))
        }
        Err(e) => {
            error!("Failed to build user directory client ({}), using placeholders", e);
            Arc::new(OfflineDirectory)
        }
    }
}

fn build_notifier(settings: &Settings) -> Arc<dyn NotificationSink> {
    let Some(base_url) = settings.notification.base_url.as_deref().filter(|u| !u.trim().is_empty()) else {
        warn!("No notification service configured, match notifications are dropped");
        return Arc::new(NoopNotificationSink);
    };

    match HttpNotificationSink::new(base_url, settings.notification.timeout()) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            error!("Failed to build notification client ({}), notifications disabled", e);
            Arc::new(NoopNotificationSink)
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    init_tracing(&settings.logging);
    info!("Starting petmate service...");

    let store = open_store(&settings).await.map_err(|e| {
        error!("Failed to open store: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;

    let directory = build_directory(&settings);
    let notifier = build_notifier(&settings);

    let registry = ConnectionRegistry::new();
    let broadcaster = build_broadcaster(settings.realtime.redis_url.as_deref(), registry.clone()).await;

    let app_state = AppState::new(
        store,
        directory,
        notifier,
        broadcaster,
        registry,
        settings.directory.timeout(),
        settings.matching.max_radius_km,
    );

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .app_data(web::PathConfig::default().error_handler(handle_path_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
