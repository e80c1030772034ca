//! Request cache with versioned namespaces and offline support.
//!
//! This module provides:
//! - A storage backend keyed by request identity holding response snapshots
//! - Named, versioned namespaces that are created on install and pruned on activation
//! - Lookup across every live namespace for general assets

mod namespaces;
mod storage;
mod traits;

pub use namespaces::{NamespaceHandle, NamespaceManager, NamespaceSet, PruneReport};
pub use storage::{CacheStorage, CachedResponse, SqliteStorage};
pub use traits::{CacheResult, CacheSource};
#[cfg(test)]
pub use traits::RequestKey;
