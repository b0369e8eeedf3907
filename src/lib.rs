pub mod core;
pub mod utils;

// Re-export everything from core for ergonomic library use
// Users can write `fabric::manifest` instead of `fabric::core::manifest`
pub use self::core::*;
pub use self::utils::*;
