pub mod server;

// Re-export the pieces main and the integration tests wire together
pub use server::config::{app_router, AppConfig, AppState};
pub use server::services;
