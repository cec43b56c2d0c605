// Clippy allows for reasonable defaults
#![allow(clippy::new_without_default)] // Default not always appropriate for stateful types
#![allow(clippy::needless_borrow)] // Explicit borrows can clarify ownership
#![allow(clippy::collapsible_if)] // Separate ifs can be more readable

// Module declarations
pub mod api;
pub mod config;
pub mod export;
pub mod health;
pub mod history;
pub mod models;
pub mod session;

// Re-export wire types for consumers
pub use models::*;
