//! Loads a named set of resources with one aggregate callback.

use super::cache::AssetCache;
use super::handle::{LoadHandle, LoadStatus};
use super::kind::ResourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListStatus {
    /// There is nothing in the list.
    Empty,
    /// Some entry has not been requested yet.
    NeedLoad,
    Loading,
    Loaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub path: String,
    pub kind: ResourceKind,
    pub handle: Option<LoadHandle>,
}

#[derive(Debug, Clone, Default)]
pub struct AssetList {
    entries: Vec<ListEntry>,
}

impl AssetList {
    pub fn new() -> Self {
        AssetList::default()
    }

    /// Replaces the entries of this list.
    pub fn initialize<I, T>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (T, ResourceKind)>,
        T: Into<String>,
    {
        self.entries.clear();
        for (path, kind) in entries {
            self.add(path, kind);
        }
    }

    /// Appends an entry and returns its position.
    pub fn add<T: Into<String>>(&mut self, path: T, kind: ResourceKind) -> usize {
        self.entries.push(ListEntry {
            path: path.into(),
            kind,
            handle: None,
        });

        self.entries.len() - 1
    }

    /// Requests every entry. `on_all_loaded` rides on the last request, so with the
    /// callbacks being called in request order it fires after all of them loaded. An
    /// empty list calls back on the next tick.
    pub fn load<F>(&mut self, cache: &mut AssetCache, on_all_loaded: F)
    where
        F: FnOnce(&mut AssetCache) + 'static,
    {
        let last = match self.entries.len() {
            0 => {
                cache.defer(on_all_loaded);
                return;
            }
            len => len - 1,
        };

        for entry in &mut self.entries[..last] {
            entry.handle = Some(cache.load(&entry.path, entry.kind));
        }

        let entry = &mut self.entries[last];
        let handle = cache.load_with_callback(&entry.path, entry.kind, move |cache, _| {
            on_all_loaded(cache)
        });

        entry.handle = Some(handle);
    }

    pub fn status(&self, cache: &AssetCache) -> ListStatus {
        if self.entries.is_empty() {
            return ListStatus::Empty;
        }

        let mut loading = false;
        for entry in &self.entries {
            match entry.handle {
                None => return ListStatus::NeedLoad,
                Some(handle) => {
                    if cache.status(handle) != Some(LoadStatus::Completed) {
                        loading = true;
                    }
                }
            }
        }

        if loading {
            ListStatus::Loading
        } else {
            ListStatus::Loaded
        }
    }

    /// Drops the ownership of every requested entry.
    pub fn unload(&mut self, cache: &mut AssetCache) {
        for entry in &mut self.entries {
            if let Some(handle) = entry.handle.take() {
                cache.unload(handle);
            }
        }
    }

    /// Finds an entry by path, ignoring case.
    pub fn find(&self, path: &str) -> Option<&ListEntry> {
        let path = path.to_lowercase();
        self.entries.iter().find(|v| v.path.to_lowercase() == path)
    }

    /// Returns the handles of the requested entries.
    pub fn handles(&self) -> Vec<LoadHandle> {
        self.entries.iter().filter_map(|v| v.handle).collect()
    }

    #[inline]
    pub fn entries(&self) -> &[ListEntry] {
        &self.entries
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forgets every entry. Requested ones are not unloaded.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::res::cache::CacheParams;
    use crate::res::storage::memory::MemoryStorage;

    #[test]
    fn empty() {
        let storage = MemoryStorage::new();
        let mut cache = AssetCache::new(storage, CacheParams::default());

        let fired = Rc::new(RefCell::new(false));
        let tx = fired.clone();

        let mut list = AssetList::new();
        assert_eq!(list.status(&cache), ListStatus::Empty);
        list.load(&mut cache, move |_| *tx.borrow_mut() = true);

        assert!(!*fired.borrow());
        cache.advance();
        assert!(*fired.borrow());
    }

    #[test]
    fn aggregate() {
        let storage = MemoryStorage::new();
        storage.insert_builtin("ui/a", ResourceKind::Sprite, vec![1]);
        storage.insert_builtin("ui/b", ResourceKind::Sprite, vec![1]);
        storage.insert_builtin("sound/c", ResourceKind::AudioClip, vec![1]);
        storage.hold("ui/a");

        let mut cache = AssetCache::new(storage.clone(), CacheParams::default());
        let mut list = AssetList::new();
        list.initialize(vec![
            ("ui/a", ResourceKind::Sprite),
            ("ui/b", ResourceKind::Sprite),
            ("sound/c", ResourceKind::AudioClip),
        ]);
        assert_eq!(list.status(&cache), ListStatus::NeedLoad);

        let fired = Rc::new(RefCell::new(0));
        let tx = fired.clone();
        list.load(&mut cache, move |_| *tx.borrow_mut() += 1);
        assert_eq!(list.status(&cache), ListStatus::Loading);

        cache.advance();
        assert_eq!(*fired.borrow(), 0);

        storage.release("ui/a");
        cache.advance();
        assert_eq!(*fired.borrow(), 1);
        assert_eq!(list.status(&cache), ListStatus::Loaded);
        assert_eq!(list.handles().len(), 3);
        assert_eq!(list.find("UI/B").map(|v| v.kind), Some(ResourceKind::Sprite));

        list.unload(&mut cache);
        assert!(cache.is_empty());
        assert_eq!(list.status(&cache), ListStatus::NeedLoad);

        list.clear();
        assert_eq!(list.status(&cache), ListStatus::Empty);
    }
}
