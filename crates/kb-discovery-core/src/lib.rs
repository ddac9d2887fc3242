//! # kb-discovery core
//!
//! Runtime-agnostic logic for connection discovery: node and connection
//! models, the lexical (TF-IDF) and temporal scorers, score fusion,
//! deduplicating upsert, and the storage traits.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Scheduling,
//! caching, timeouts, and SQLite live in the `kb-discovery` app crate.

pub mod fusion;
pub mod lexical;
pub mod models;
pub mod store;
pub mod temporal;
pub mod upsert;
