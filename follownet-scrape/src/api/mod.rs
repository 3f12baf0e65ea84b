//! HTTP API handlers for follownet-scrape

pub mod export;
pub mod health;
pub mod scrape;
pub mod sessions;
pub mod sse;

pub use export::export_routes;
pub use health::health_routes;
pub use scrape::scrape_routes;
pub use sessions::session_routes;
pub use sse::event_stream;
