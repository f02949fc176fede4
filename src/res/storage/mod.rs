//! The storage collaborators the cache loads from.
//!
//! The cache treats storage as three black boxes: fetching the bytes of a bundle and
//! opening it, looking an asset up inside an opened bundle, and reading a built-in
//! resource directly. All of them answer with a `Request` that could be resolved
//! immediately, or later from a background worker.

pub mod archive;
pub mod dir;
pub mod memory;

use std::any::Any;
use std::sync::Arc;

use super::errors::StorageError;
use super::kind::ResourceKind;
use super::request::Request;

/// A loaded resource object. Use `AssetCache::resource` to downcast it.
pub type Resource = Arc<dyn Any + Send + Sync>;

pub type BundleResponse = Result<Arc<dyn Bundle>, StorageError>;

pub trait Storage: 'static {
    /// Fetches and opens the bundle `id`. Fails with `StorageError::NotFound` if the
    /// bundle file is missing.
    fn load_bundle(&self, id: &str) -> Request<BundleResponse>;

    /// Loads a resource shipped with the client. Responds `None` if nothing usable
    /// lives at `path`.
    fn load_builtin(&self, path: &str, kind: ResourceKind) -> Request<Option<Resource>>;
}

/// An opened bundle.
pub trait Bundle: Send + Sync {
    /// Returns true if the bundle contains an asset named `name`.
    fn contains(&self, name: &str) -> bool;

    /// Loads the asset `name`, along with its sub-assets if requested. Responds `None`
    /// if the asset turned out to be empty.
    fn load_asset(
        &self,
        name: &str,
        kind: ResourceKind,
        with_sub_assets: bool,
    ) -> Request<Option<Resource>>;

    /// Frees the native memory held by this bundle. Called exactly once when the last
    /// dependent releases it.
    fn unload(&self);
}

/// The resource object produced by the built-in storages: the named bytes, plus the
/// sub-assets if they were requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAsset {
    pub name: String,
    pub kind: ResourceKind,
    pub bytes: Vec<u8>,
    pub sub_assets: Vec<RawAsset>,
}

impl RawAsset {
    pub fn new<T: Into<String>>(name: T, kind: ResourceKind, bytes: Vec<u8>) -> Self {
        RawAsset {
            name: name.into(),
            kind,
            bytes,
            sub_assets: Vec::new(),
        }
    }

    /// Wraps this asset into a `Resource`, or returns `None` if it carries no bytes.
    pub fn into_resource(self) -> Option<Resource> {
        if self.bytes.is_empty() {
            None
        } else {
            Some(Arc::new(self))
        }
    }
}

pub mod prelude {
    pub use super::dir::{Directory, DirectoryParams};
    pub use super::memory::MemoryStorage;
    pub use super::{Bundle, RawAsset, Resource, Storage};
}
