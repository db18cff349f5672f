//! Axum upload gateway for the detweb detection service.
//!
//! This crate provides:
//! - Multipart upload handling with collision-resistant stored names
//! - Routing to the image or video pipeline by media kind
//! - Result serving with explicit video content types

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
