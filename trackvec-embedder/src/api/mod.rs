//! HTTP API handlers for trackvec-embedder

pub mod health;
pub mod tracks;
pub mod webhook;

pub use health::health_routes;
pub use tracks::track_routes;
pub use webhook::webhook_routes;
