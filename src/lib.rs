//! Playbook Sync: Incremental Content Regeneration
//!
//! Keeps one persisted record per playbook entity (company, account, persona,
//! industry) in step with two slow, unreliable operations: reading the
//! entity's website and generating marketing copy from it. Each run detects
//! which entities changed, re-runs only the stages they need, and checkpoints
//! the store after every entity.

pub mod cli;
pub mod config;
pub mod detect;
pub mod error;
pub mod input;
pub mod logging;
pub mod pipeline;
pub mod provider;
pub mod render;
pub mod retry;
pub mod stage;
pub mod store;
pub mod types;

pub use detect::{detect_changes, ChangeFlags, ChangeReason, ChangeSet};
pub use error::{ApiError, StorageError};
pub use input::{InputSource, Snapshot};
pub use pipeline::{render_pass, EntityOutcome, Pipeline, RunReport};
pub use store::RecordStore;
pub use types::{EntityKey, Observation, Record};
