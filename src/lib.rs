//! # kb-discovery
//!
//! **Connection discovery for a personal knowledge base.**
//!
//! Given a knowledge node (a note, an image, or a saved web page), kb-discovery
//! finds the other nodes it is meaningfully related to, scores each
//! relationship with a bounded confidence, and stores the result without
//! creating duplicates.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  enqueue  ┌────────────┐  spawn_blocking  ┌──────────────┐
//! │ Ingestion  │─────────▶│ Scheduler  │─────────────────▶│ Fusion       │
//! │ / CLI      │           │ queue+cache│◀─────────────────│ lexical+time │
//! └────────────┘           └─────┬──────┘    connections   └──────────────┘
//!                                │ upsert
//!                                ▼
//!                          ┌────────────┐
//!                          │  SQLite    │
//!                          │ nodes/conns│
//!                          └────────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. A node is created; the ingestion side calls
//!    [`discovery::ConnectionDiscovery::on_node_ingested`].
//! 2. The [`scheduler`] queues the job by priority and drains jobs one at a time.
//! 3. Each job loads the node and the full corpus and runs the core fusion
//!    builder (TF-IDF cosine similarity + temporal decay) under a timeout.
//! 4. Discovered connections are upserted, keeping the more confident record
//!    per node pair, and the result is cached for five minutes.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Schema for nodes and connections (idempotent) |
//! | [`sqlite_store`] | SQLite implementation of the node and connection stores |
//! | [`error`] | `DiscoveryError`: not found, timeout, store, worker |
//! | [`queue`] | Priority job queue with per-node collapsing |
//! | [`cache`] | TTL cache of per-node results |
//! | [`scheduler`] | Drain loop, cache short-circuit, timeout-bounded analysis |
//! | [`discovery`] | Public facade used by callers |
//! | [`commands`] | `kbd` CLI entry points |
//!
//! Scoring itself lives in the `kb-discovery-core` crate; its store traits
//! are re-exported as [`store`].

pub mod cache;
pub mod commands;
pub mod config;
pub mod db;
pub mod discovery;
pub mod error;
pub mod migrate;
pub mod queue;
pub mod scheduler;
pub mod sqlite_store;

pub use kb_discovery_core::store;

pub use discovery::{ConnectionDiscovery, WorkerStatus};
pub use error::DiscoveryError;
pub use scheduler::{AnalysisResult, DiscoveryScheduler, SchedulerOptions};
