//! idea-board/crates/ib-core/src/lib.rs
//!
//! The central domain types and interface definitions for Idea Board.

pub mod error;
pub mod models;
pub mod query;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use query::*;
pub use traits::*;
