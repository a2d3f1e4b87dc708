//! Observers Core Library
//!
//! Observation tracking for automated reviewers: the lifecycle store, the
//! query engine behind `list`, the `observations` dispatch tool, and the
//! change hooks that render a summary after each mutation.

pub mod config;
pub mod display;
pub mod domain;
pub mod hooks;
pub mod metrics;
pub mod obs;
pub mod query;
pub mod store;
pub mod telemetry;
pub mod tool;

pub use config::{DisplayConfig, DisplayStyle, StoreConfig, DEFAULT_STATE_DIR, DEFAULT_STATE_KEY};

pub use display::{render, ObservationDisplayHook, DISPLAY_HOOK_NAME, DISPLAY_HOOK_PRIORITY};

pub use domain::{
    NewObservation, Observation, ObservationError, Result, Severity, SourceType, Status,
};

pub use hooks::{HookHandler, HookRegistry, HookResult, OBSERVATIONS_CHANGE};

pub use metrics::METRICS;

pub use query::{ListFilters, ListQuery, ListResult, SortBy, DEFAULT_LIMIT};

pub use store::{BatchCreated, ObservationStore};

pub use telemetry::init_tracing;

pub use tool::{ObservationsTool, Operation, OperationKind, ToolResult};

pub use observers_state::{FsStateStore, MemoryStateStore, StateStore, StorageError};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
