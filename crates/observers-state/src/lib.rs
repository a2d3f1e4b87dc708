//! Observers-State: named-blob persistence for observer state
//!
//! This crate provides the persistence layer for the observation store.
//! The store serializes its whole state to one document and hands it to a
//! [`StateStore`] under a single key; on mount it reads the same key back.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: whole-document get/set, nothing incremental.
//!
//! ## Key Components
//!
//! - `StateStore`: async get/set of a named blob
//! - `MemoryStateStore`: in-memory fake with write-failure injection
//! - `FsStateStore`: one file per key, written atomically

mod error;
pub mod fakes;
pub mod fs_store;
pub mod storage_traits;

pub use error::StorageError;
pub use fakes::MemoryStateStore;
pub use fs_store::FsStateStore;
pub use storage_traits::{StateStore, StorageResult};
