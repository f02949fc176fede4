//! An in-process storage. Every read resolves immediately unless its key is held, in
//! which case it stays pending until the key is released. This gives full control over
//! the order in which loads complete.

use std::sync::{Arc, Mutex};

use super::archive::{ArchiveEntry, BundleArchive};
use super::{Bundle, BundleResponse, RawAsset, Resource, Storage};
use crate::res::errors::StorageError;
use crate::res::kind::ResourceKind;
use crate::res::request::Request;
use crate::utils::prelude::{FastHashMap, FastHashSet};

type Deliver = Box<dyn FnOnce() + Send + 'static>;

/// In-memory storage. Clones share the same contents.
///
/// Hold keys are matched against bundle ids for bundle fetches, asset names for asset
/// loads and paths for built-in loads, ignoring case.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    bundles: FastHashMap<String, BundleArchive>,
    builtins: FastHashMap<String, RawAsset>,
    holds: FastHashSet<String>,
    pending: Vec<(String, Deliver)>,
    fetches: Vec<String>,
    builtin_fetches: Vec<String>,
    unloads: Vec<String>,
}

impl Inner {
    fn submit<T>(&mut self, key: &str, value: T) -> Request<T>
    where
        T: Send + 'static,
    {
        let key = key.to_lowercase();
        if !self.holds.contains(&key) {
            return Request::ok(value);
        }

        let latch = Request::latch();
        let tx = latch.clone();
        self.pending.push((key, Box::new(move || tx.set(value))));
        Request::new(latch)
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }

    /// Adds or replaces the bundle `id`.
    pub fn insert_bundle<T>(&self, id: &str, entries: T)
    where
        T: IntoIterator<Item = ArchiveEntry>,
    {
        let archive = BundleArchive {
            entries: entries.into_iter().collect(),
        };

        let mut inner = self.inner.lock().unwrap();
        inner.bundles.insert(id.to_lowercase(), archive);
    }

    pub fn remove_bundle(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.bundles.remove(&id.to_lowercase()).is_some()
    }

    /// Adds or replaces a built-in resource. Empty bytes make it load as null.
    pub fn insert_builtin(&self, path: &str, kind: ResourceKind, bytes: Vec<u8>) {
        let name = path.rsplit('/').next().unwrap_or(path);
        let raw = RawAsset::new(name, kind, bytes);

        let mut inner = self.inner.lock().unwrap();
        inner.builtins.insert(path.to_lowercase(), raw);
    }

    /// Keeps reads of `key` pending until `release` is called.
    pub fn hold(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.holds.insert(key.to_lowercase());
    }

    /// Removes the hold on `key` and resolves every read that was waiting for it.
    pub fn release(&self, key: &str) {
        let key = key.to_lowercase();

        let ready = {
            let mut inner = self.inner.lock().unwrap();
            inner.holds.remove(&key);

            let (ready, rest): (Vec<_>, Vec<_>) =
                inner.pending.drain(..).partition(|v| v.0 == key);
            inner.pending = rest;
            ready
        };

        for (_, deliver) in ready {
            deliver();
        }
    }

    /// Returns the number of reads waiting for a release.
    pub fn pending(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }

    /// Every bundle fetch in the order it was issued.
    pub fn fetches(&self) -> Vec<String> {
        self.inner.lock().unwrap().fetches.clone()
    }

    /// Every built-in read in the order it was issued.
    pub fn builtin_fetches(&self) -> Vec<String> {
        self.inner.lock().unwrap().builtin_fetches.clone()
    }

    /// Every bundle unload in the order it happened.
    pub fn unloads(&self) -> Vec<String> {
        self.inner.lock().unwrap().unloads.clone()
    }
}

impl Storage for MemoryStorage {
    fn load_bundle(&self, id: &str) -> Request<BundleResponse> {
        let mut inner = self.inner.lock().unwrap();
        inner.fetches.push(id.to_owned());

        let rsp: BundleResponse = match inner.bundles.get(&id.to_lowercase()) {
            Some(archive) => Ok(Arc::new(MemoryBundle {
                id: id.to_owned(),
                archive: archive.clone(),
                storage: self.inner.clone(),
            })),
            None => Err(StorageError::NotFound(id.to_owned())),
        };

        inner.submit(id, rsp)
    }

    fn load_builtin(&self, path: &str, kind: ResourceKind) -> Request<Option<Resource>> {
        let mut inner = self.inner.lock().unwrap();
        inner.builtin_fetches.push(path.to_owned());

        let rsp = inner
            .builtins
            .get(&path.to_lowercase())
            .filter(|v| kind.is_satisfied_by(v.kind))
            .cloned()
            .and_then(RawAsset::into_resource);

        inner.submit(path, rsp)
    }
}

struct MemoryBundle {
    id: String,
    archive: BundleArchive,
    storage: Arc<Mutex<Inner>>,
}

impl Bundle for MemoryBundle {
    fn contains(&self, name: &str) -> bool {
        self.archive.find(name).is_some()
    }

    fn load_asset(
        &self,
        name: &str,
        _: ResourceKind,
        with_sub_assets: bool,
    ) -> Request<Option<Resource>> {
        let rsp = self
            .archive
            .find(name)
            .and_then(|v| v.to_raw(with_sub_assets).into_resource());

        let mut inner = self.storage.lock().unwrap();
        inner.submit(name, rsp)
    }

    fn unload(&self) {
        let mut inner = self.storage.lock().unwrap();
        inner.unloads.push(self.id.clone());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hold() {
        let storage = MemoryStorage::new();
        storage.insert_bundle(
            "ui/common",
            vec![ArchiveEntry::new("button", ResourceKind::Sprite, vec![1])],
        );

        assert!(storage.load_bundle("missing").poll());

        storage.hold("UI/Common");
        let mut req = storage.load_bundle("ui/common");
        assert!(!req.poll());
        assert_eq!(storage.pending(), 1);

        storage.release("ui/common");
        assert!(req.poll());
        assert_eq!(storage.pending(), 0);

        let bundle = req.into_response().unwrap().unwrap();
        assert!(bundle.contains("button"));
        assert!(!bundle.contains("missing"));

        let mut asset = bundle.load_asset("button", ResourceKind::Sprite, false);
        assert!(asset.poll());
        assert!(asset.into_response().unwrap().is_some());

        bundle.unload();
        assert_eq!(storage.fetches(), vec!["missing", "ui/common"]);
        assert_eq!(storage.unloads(), vec!["ui/common"]);
    }

    #[test]
    fn builtin() {
        let storage = MemoryStorage::new();
        storage.insert_builtin("sound/bgm", ResourceKind::AudioClip, vec![1, 2]);
        storage.insert_builtin("sound/empty", ResourceKind::AudioClip, Vec::new());

        let rsp = storage
            .load_builtin("Sound/BGM", ResourceKind::Object)
            .into_response()
            .unwrap()
            .unwrap();
        let raw = rsp.downcast_ref::<RawAsset>().unwrap();
        assert_eq!(raw.name, "bgm");
        assert_eq!(raw.bytes, vec![1, 2]);

        let rsp = storage.load_builtin("sound/bgm", ResourceKind::Texture);
        assert!(rsp.into_response().unwrap().is_none());

        let rsp = storage.load_builtin("sound/empty", ResourceKind::AudioClip);
        assert!(rsp.into_response().unwrap().is_none());
    }
}
