// Route exports
pub mod messages;
pub mod petmate;
pub mod ws;

use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, HttpResponse, Responder};

use crate::models::HealthResponse;
use crate::services::{
    CandidateFinder, ChatService, ConnectionRegistry, DisplayResolver, MatchEngine,
    NotificationSink, ProfileProvisioner, RealtimeBroadcaster, UserDirectory,
};
use crate::store::Datastore;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Datastore>,
    pub provisioner: ProfileProvisioner,
    pub finder: CandidateFinder,
    pub engine: MatchEngine,
    pub chat: ChatService,
    pub registry: ConnectionRegistry,
}

impl AppState {
    /// Wire the services on top of one store and the external collaborators
    pub fn new(
        store: Arc<dyn Datastore>,
        directory: Arc<dyn UserDirectory>,
        notifier: Arc<dyn NotificationSink>,
        broadcaster: Arc<dyn RealtimeBroadcaster>,
        registry: ConnectionRegistry,
        directory_timeout: Duration,
        max_radius_km: f64,
    ) -> Self {
        let provisioner =
            ProfileProvisioner::new(store.clone(), directory.clone(), directory_timeout);
        let resolver = DisplayResolver::new(store.clone(), directory, directory_timeout);

        Self {
            finder: CandidateFinder::new(store.clone(), provisioner.clone(), max_radius_km),
            engine: MatchEngine::new(
                store.clone(),
                provisioner.clone(),
                resolver.clone(),
                notifier,
            ),
            chat: ChatService::new(store.clone(), resolver, broadcaster),
            provisioner,
            registry,
            store,
        }
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health_check))
            .configure(petmate::configure)
            .configure(messages::configure),
    )
    .configure(ws::configure);
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let status = match state.store.health_check().await {
        Ok(()) => "healthy",
        Err(e) => {
            tracing::warn!(error = %e, "store health check failed");
            "degraded"
        }
    };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}
