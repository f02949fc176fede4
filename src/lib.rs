//! # What is This?
//!
//! _satchel_ is the asset loading and caching core of a game client. It turns logical
//! resource paths into loaded resource objects, shares them between callers through
//! reference counting, resolves the dependency graph of asset bundles and keeps the
//! number of simultaneous loads bounded.
//!
//! Everything is driven from one owner thread: call `AssetCache::advance` once per
//! frame and all completions, callbacks and error notifications are delivered from
//! inside that call. Storage backends are free to do their I/O on background workers,
//! their results are only observed when the owner polls them.
//!
//! ```rust,ignore
//! use satchel::prelude::*;
//!
//! let params = DirectoryParams {
//!     bundles: "downloads".into(),
//!     ..DirectoryParams::default()
//! };
//!
//! let storage = Directory::new(params)?;
//! let mut cache = AssetCache::new(storage, CacheParams::default());
//! cache.set_index(DescriptorIndex::from_json_str(&metadata)?);
//!
//! cache.load_with_callback("ui/title", ResourceKind::Texture, |cache, handle| {
//!     let texture = cache.resource::<RawAsset>(handle);
//!     // ...
//! });
//!
//! loop {
//!     cache.advance();
//! }
//! ```

#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

#[macro_use]
pub mod utils;
pub mod errors;
pub mod res;
pub mod sched;

pub mod prelude {
    pub use crate::res::prelude::*;
}
