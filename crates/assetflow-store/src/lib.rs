//! Local content store for transferable assets.
//!
//! The transfer service reads upload bodies from, and lands download bytes
//! in, a byte-addressable store keyed by [`assetflow_core::AssetId`]. The
//! store is shared with the rest of the application; callers may read an
//! object while a transfer is writing a different one. This crate defines
//! the [`ContentStore`] boundary and a filesystem implementation.

pub mod local;
pub mod traits;

pub use local::LocalContentStore;
pub use traits::{ContentStore, StoreError, StoreResult};
