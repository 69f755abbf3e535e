//! Petmate - pet owner matching and real-time chat service
//!
//! Users discover nearby pet owners, turn mutual likes into matches and chat
//! in one room per matched pair. Persistence sits behind the [`store`]
//! traits; the HTTP and WebSocket surface lives in [`routes`].

pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

// Re-export commonly used types
pub use core::distance::{calculate_bounding_box, haversine_distance};
pub use error::{AppError, AppResult};
pub use routes::AppState;
pub use store::{Datastore, MemoryStore, PgStore, StoreError};
