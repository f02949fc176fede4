//! Bookkeeping of physical bundles shared between loads.
//!
//! A bundle is fetched at most once no matter how many loads depend on it, and it is
//! unloaded the moment its last dependent lets go of it. Records are created lazily and
//! registering a dependent never issues any I/O; the fetch starts when a dependent
//! actually walks into the bundle.

use std::mem;
use std::sync::Arc;

use super::handle::LoadHandle;
use super::request::Request;
use super::storage::{Bundle, BundleResponse, Storage};
use crate::utils::prelude::{FastHashMap, FastHashSet};

/// The fetch progress of a bundle, as observed by its dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchState {
    /// Nobody asked for the bytes yet.
    Idle,
    Loading,
    Loaded,
    /// The last fetch failed. The next requester starts a new one.
    Failed,
}

enum Fetch {
    Idle,
    Loading(Request<BundleResponse>),
    Loaded(Arc<dyn Bundle>),
    Failed,
}

impl Fetch {
    fn state(&self) -> FetchState {
        match *self {
            Fetch::Idle => FetchState::Idle,
            Fetch::Loading(_) => FetchState::Loading,
            Fetch::Loaded(_) => FetchState::Loaded,
            Fetch::Failed => FetchState::Failed,
        }
    }
}

pub struct BundleRecord {
    id: String,
    fetch: Fetch,
    dependents: FastHashSet<LoadHandle>,
}

impl BundleRecord {
    fn new(id: &str) -> Self {
        BundleRecord {
            id: id.to_owned(),
            fetch: Fetch::Idle,
            dependents: FastHashSet::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn state(&self) -> FetchState {
        self.fetch.state()
    }

    #[inline]
    pub fn dependents(&self) -> &FastHashSet<LoadHandle> {
        &self.dependents
    }

    fn settle(&mut self) {
        let fetch = mem::replace(&mut self.fetch, Fetch::Idle);
        self.fetch = match fetch {
            Fetch::Loading(mut req) => {
                if !req.poll() {
                    Fetch::Loading(req)
                } else {
                    match req.into_response() {
                        Some(Ok(bundle)) => {
                            debug!("[BundleTracker] bundle {} loaded.", self.id);
                            Fetch::Loaded(bundle)
                        }
                        Some(Err(err)) => {
                            warn!("[BundleTracker] failed to fetch {}: {}", self.id, err);
                            Fetch::Failed
                        }
                        None => Fetch::Failed,
                    }
                }
            }
            v => v,
        };
    }
}

/// Registry of bundle records keyed by lower-cased bundle id.
#[derive(Default)]
pub struct BundleTracker {
    records: FastHashMap<String, BundleRecord>,
    // Fetches whose record was discarded before they finished. Bundles arriving here
    // are unloaded right away.
    orphans: Vec<(String, Request<BundleResponse>)>,
}

impl BundleTracker {
    pub fn new() -> Self {
        BundleTracker::default()
    }

    /// Returns the record of `id`, creating an empty one if needed. Never issues I/O.
    pub fn acquire(&mut self, id: &str) -> &mut BundleRecord {
        self.records
            .entry(id.to_lowercase())
            .or_insert_with(|| BundleRecord::new(id))
    }

    /// Marks `handle` as depending on the bundle `id`.
    pub fn register_dependent(&mut self, id: &str, handle: LoadHandle) {
        self.acquire(id).dependents.insert(handle);
    }

    /// Drops the dependency of `handle` on `id`. Once the last dependent is gone the
    /// physical bundle is unloaded and the record discarded, and true is returned.
    pub fn release(&mut self, id: &str, handle: LoadHandle) -> bool {
        let key = id.to_lowercase();

        let empty = match self.records.get_mut(&key) {
            Some(record) => {
                record.dependents.remove(&handle);
                record.dependents.is_empty()
            }
            None => return false,
        };

        if !empty {
            return false;
        }

        if let Some(record) = self.records.remove(&key) {
            match record.fetch {
                Fetch::Loaded(bundle) => {
                    bundle.unload();
                    info!("[BundleTracker] bundle {} unloaded.", record.id);
                }
                Fetch::Loading(req) => {
                    debug!(
                        "[BundleTracker] bundle {} released while loading, unloads on arrival.",
                        record.id
                    );
                    self.orphans.push((record.id, req));
                }
                _ => {}
            }
        }

        true
    }

    /// Makes sure the bytes of `id` are on their way. Starts a fetch if nobody did yet,
    /// or if the last one failed; otherwise attaches to the existing one.
    pub fn fetch(&mut self, id: &str, storage: &dyn Storage) -> FetchState {
        let record = self.acquire(id);

        match record.fetch {
            Fetch::Idle | Fetch::Failed => {
                trace!("[BundleTracker] fetch bundle {}.", id);
                record.fetch = Fetch::Loading(storage.load_bundle(id));
            }
            _ => {}
        }

        record.settle();
        record.state()
    }

    /// Polls every fetch in flight.
    pub fn advance(&mut self) {
        for record in self.records.values_mut() {
            record.settle();
        }

        let mut i = 0;
        while i < self.orphans.len() {
            if !self.orphans[i].1.poll() {
                i += 1;
                continue;
            }

            let (id, req) = self.orphans.swap_remove(i);
            if let Some(Ok(bundle)) = req.into_response() {
                bundle.unload();
                info!("[BundleTracker] orphaned bundle {} unloaded.", id);
            }
        }
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<&BundleRecord> {
        self.records.get(&id.to_lowercase())
    }

    /// Returns the fetch state of `id`, `Idle` if there is no record of it.
    #[inline]
    pub fn state(&self, id: &str) -> FetchState {
        self.get(id).map(|v| v.state()).unwrap_or(FetchState::Idle)
    }

    /// Returns the opened bundle `id` if it has been loaded.
    pub fn bundle(&self, id: &str) -> Option<Arc<dyn Bundle>> {
        self.get(id).and_then(|v| match v.fetch {
            Fetch::Loaded(ref bundle) => Some(bundle.clone()),
            _ => None,
        })
    }

    /// Returns the number of loads depending on `id`.
    #[inline]
    pub fn dependents(&self, id: &str) -> usize {
        self.get(id).map(|v| v.dependents.len()).unwrap_or(0)
    }

    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the number of discarded fetches still waiting for their bytes.
    #[inline]
    pub fn orphans(&self) -> usize {
        self.orphans.len()
    }
}
