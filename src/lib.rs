pub mod app;
pub mod authz;
pub mod billing;
pub mod cache;
pub mod db;
pub mod docs;
pub mod errors;
pub mod events;
pub mod jwt;
pub mod models;
pub mod notify;
pub mod rate_limit;
pub mod routes;
pub mod subscriptions;
pub mod sync;
pub mod utils;

// Re-export commonly used items for tests
pub use app::{build_router, create_app, AppState};
