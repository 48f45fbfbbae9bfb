//! # ib-store-groq
//!
//! `IdeaRepo` and `EngagementRepo` over a hosted document store queried
//! with GROQ. Votes are stored as one document per (idea, user) with a
//! deterministic id, so changing a vote is a single `createOrReplace` and
//! retracting it a single `delete`.

pub mod client;
pub mod documents;
mod store;

pub use client::{GroqClient, GroqConfig, Mutation};
pub use store::GroqStore;
