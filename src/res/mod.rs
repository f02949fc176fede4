//! The resource loading and caching core.
//!
//! To understand how loading works here, it helps to distinguish between a _bundle_ and
//! a _resource_.
//!
//! # Bundle
//!
//! A bundle is a packaged group of resources that is downloaded, opened and unloaded as
//! one physical unit. Bundles could depend on other bundles, say a character bundle that
//! uses the shaders of a shared bundle. The server publishes a `DescriptorIndex` which
//! lists every bundle with its hash, size and dependencies.
//!
//! # Resource
//!
//! A resource is some piece of data that is ready to use, like a texture or a prefab. It
//! is located by a readable path, and depending on the index it is loaded either:
//!
//! 1. as the main asset of a bundle, if the path names a bundle;
//! 2. as a sub-asset of a bundle, if the path contains the id of a bundle;
//! 3. directly from the built-in storage shipped with the client otherwise.
//!
//! # Handle
//!
//! Every distinct load of a path and a resource type is represented by a `LoadHandle`.
//! Its perfectly safe to store and share a handle even while the underlying resource is
//! still loading, and a handle never dangles: once the load is gone every query with it
//! simply answers nothing.
//!
//! ## Ownership & Lifetime
//!
//! Reference counting is used to share resources. Every `load` increases the reference
//! count of the handle by 1, and it is the user's responsibility to drop the ownership
//! with `unload` once done. When the last ownership is dropped the resource is
//! destroyed, and so is every bundle nobody else depends on.
//!
//! # Errors
//!
//! Loads never report errors to their callers directly. The first failure stops the
//! whole cache, and once everything in flight has settled the error sink is told about
//! it. It could `retry` the failed load in place, or start over with `unload_all(true)`.

pub mod cache;
pub mod descriptor;
pub mod errors;
pub mod handle;
pub mod kind;
pub mod list;
pub mod request;
pub mod storage;
pub mod tracker;

pub mod prelude {
    pub use super::cache::{AssetCache, CacheParams, LoadFailure};
    pub use super::descriptor::{DescriptorIndex, ResourceDescriptor};
    pub use super::errors::{LoadError, StorageError};
    pub use super::handle::{LoadHandle, LoadStatus};
    pub use super::kind::ResourceKind;
    pub use super::list::{AssetList, ListStatus};
    pub use super::storage::prelude::*;
}
