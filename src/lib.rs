#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Flowsync Core
//!
//! Synchronization and reconciliation engine that keeps three representations
//! of a logical workflow consistent: a live runtime instance in an external
//! workflow-automation engine, a relational database holding per-environment
//! state, and a Git repository acting as the durable source of truth for
//! promotion pipelines.
//!
//! ## Architecture
//!
//! Data flows one way per engine and fans out into reconciliation:
//!
//! ```text
//! ┌───────────────┐                      ┌───────────────┐
//! │ Workflow      │  RuntimeSyncEngine   │               │
//! │ Runtime API   │─────────────────────▶│               │
//! └───────────────┘                      │  Relational   │   ReconciliationEngine
//! ┌───────────────┐                      │  Store        │──▶ pairwise diff /
//! │ Git Host      │  GitSyncEngine       │               │    conflict status
//! │ (promotion)   │─────────────────────▶│               │
//! └───────────────┘                      └───────────────┘
//! ```
//!
//! The [`orchestration::SyncOrchestrator`] turns "please sync environment E"
//! into exactly one in-flight [`models::SyncJob`], and the [`scheduler`]
//! drives periodic, debounced passes over every eligible environment. All
//! mutual exclusion lives in the store (non-terminal job uniqueness plus
//! keyed upserts), so multiple service instances can run without a
//! distributed lock manager.
//!
//! ## Module Organization
//!
//! - [`models`] - Entity layer: canonical workflows, environment mappings,
//!   Git state, diff state, sync jobs
//! - [`storage`] - The relational-store collaborator: [`storage::SyncStore`]
//!   trait with Postgres and in-memory implementations
//! - [`clients`] - Runtime API and Git host collaborator traits
//! - [`hashing`] - Deterministic content fingerprinting with collision
//!   fallback
//! - [`engines`] - Runtime→database and Git→database ingestion
//! - [`reconciliation`] - Database→database diff/conflict computation
//! - [`orchestration`] - Idempotent job lifecycle and progress events
//! - [`scheduler`] - Periodic, debounced sync driver
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use flowsync_core::engines::RuntimeSyncEngine;
//! use flowsync_core::orchestration::NoopProgressSink;
//! use flowsync_core::storage::MemoryStore;
//!
//! # async fn example(
//! #     runtime: Arc<dyn flowsync_core::clients::RuntimeClient>,
//! #     environment: flowsync_core::models::Environment,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let engine = RuntimeSyncEngine::new(store, runtime);
//! let outcome = engine.sync_environment(&environment, &NoopProgressSink).await?;
//! println!("linked {} workflows, {} skipped", outcome.linked, outcome.skipped);
//! # Ok(())
//! # }
//! ```

pub mod clients;
pub mod config;
pub mod constants;
pub mod engines;
pub mod error;
pub mod hashing;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod reconciliation;
pub mod scheduler;
pub mod storage;

pub use error::{Result, SyncError};
