//! Generic utility primitives with zero domain knowledge.
//!
//! - `command` - Command execution with error handling
//! - `io` - File I/O with consistent error handling
//! - `path` - Host-independent manifest path handling

pub mod command;
pub mod io;
pub mod path;
