// Public modules
pub mod auth;
pub mod build;
pub mod campaign;
pub mod certs;
pub mod client;
pub mod config;
pub mod deploy;
pub mod error;
pub mod git;
pub mod http;
pub mod images;
pub mod jwt;
pub mod manifest;
pub mod resource;
pub mod telemetry;
pub mod transform;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
