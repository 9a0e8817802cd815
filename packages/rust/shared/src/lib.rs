//! Shared types, error model, and configuration for indexsync.
//!
//! This crate is the foundation depended on by all other indexsync crates.
//! It provides:
//! - The unified error type ([`IndexSyncError`])
//! - Domain types ([`QueueEntry`], [`ActionType`], [`AccessOp`], [`JobRecord`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BackendConfig, DatabaseConfig, WorkerConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, validate_backend_url,
};
pub use error::{IndexSyncError, Result};
pub use types::{AccessOp, ActionType, Heartbeat, JobRecord, QueueEntry, UnknownActionType};
