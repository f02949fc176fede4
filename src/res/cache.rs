//! The process-wide entry point of resource loading.

use std::any::Any;
use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::descriptor::{DescriptorIndex, Resolution};
use super::errors::LoadError;
use super::handle::{DriveContext, LoadHandle, LoadStatus, LoadTask, Progress, Source};
use super::kind::ResourceKind;
use super::storage::{Resource, Storage};
use super::tracker::BundleTracker;
use crate::utils::prelude::ObjectPool;

/// Setup parameters of `AssetCache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheParams {
    /// The maximum number of loads in progress at the same time.
    pub max_concurrent_loads: usize,
}

impl Default for CacheParams {
    fn default() -> Self {
        CacheParams {
            max_concurrent_loads: 5,
        }
    }
}

/// The error that stopped the cache, handed to the error sink once every load has
/// settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub handle: LoadHandle,
    pub path: String,
    pub error: LoadError,
}

pub type LoadCallback = Box<dyn FnOnce(&mut AssetCache, LoadHandle)>;
pub type ErrorSink = Box<dyn FnMut(&mut AssetCache, &LoadFailure)>;

struct PendingCallback {
    handle: LoadHandle,
    action: Option<LoadCallback>,
}

/// `AssetCache` turns resource paths into shared, reference-counted resources.
///
/// Requests for the same path and a compatible type share one load. At most
/// `max_concurrent_loads` loads make progress at once, the rest wait in request order.
/// Callbacks fire in the order they were requested, and only from inside `advance`.
///
/// The first failure engages an error gate: every other load is asked to stop at its
/// next checkpoint, nothing new is started, and once all of them settled the error sink
/// is notified exactly once. The caller then either `retry`s, or drops everything with
/// `unload_all(true)`.
///
/// There are no timeouts here. A fetch that never finishes keeps its load busy forever,
/// and enough of them exhaust the load budget, after which nothing else starts; and
/// while the gate is engaged a hung load also holds back the error notification.
pub struct AssetCache {
    params: CacheParams,
    storage: Box<dyn Storage>,
    index: DescriptorIndex,

    tasks: ObjectPool<LoadHandle, LoadTask>,
    // Alive handles in request order.
    order: Vec<LoadHandle>,
    bundles: BundleTracker,

    callbacks: VecDeque<PendingCallback>,
    deferred: Vec<Box<dyn FnOnce(&mut AssetCache)>>,

    failure: Option<LoadFailure>,
    notified: bool,
    sink: Option<ErrorSink>,
}

impl AssetCache {
    pub fn new<S: Storage>(storage: S, params: CacheParams) -> Self {
        AssetCache {
            params,
            storage: Box::new(storage),
            index: DescriptorIndex::new(),
            tasks: ObjectPool::new(),
            order: Vec::new(),
            bundles: BundleTracker::new(),
            callbacks: VecDeque::new(),
            deferred: Vec::new(),
            failure: None,
            notified: false,
            sink: None,
        }
    }

    #[inline]
    pub fn params(&self) -> &CacheParams {
        &self.params
    }

    /// Installs the bundle metadata published by the server. Without it everything is
    /// loaded from built-in storage.
    pub fn set_index(&mut self, index: DescriptorIndex) {
        info!("[AssetCache] {} bundle descriptors installed.", index.len());
        self.index = index;
    }

    #[inline]
    pub fn index(&self) -> &DescriptorIndex {
        &self.index
    }

    /// Subscribes the process-wide error notification.
    pub fn set_error_sink<F>(&mut self, sink: F)
    where
        F: FnMut(&mut AssetCache, &LoadFailure) + 'static,
    {
        self.sink = Some(Box::new(sink));
    }

    /// Drops the bundle metadata and the outstanding error, used when returning to the
    /// title screen. Loads held back by the error carry on.
    pub fn reset(&mut self) {
        info!("[AssetCache] reset.");
        self.index.clear();
        self.disengage(None);
    }

    /// Requests the resource at `path`.
    pub fn load<T: AsRef<str>>(&mut self, path: T, kind: ResourceKind) -> LoadHandle {
        self.load_impl(path.as_ref(), kind, None)
    }

    /// Requests the resource at `path`, calling `func` from `advance` once it is
    /// loaded and every earlier request has been called back.
    pub fn load_with_callback<T, F>(&mut self, path: T, kind: ResourceKind, func: F) -> LoadHandle
    where
        T: AsRef<str>,
        F: FnOnce(&mut AssetCache, LoadHandle) + 'static,
    {
        let action: LoadCallback = Box::new(func);
        self.load_impl(path.as_ref(), kind, Some(action))
    }

    fn load_impl(
        &mut self,
        path: &str,
        kind: ResourceKind,
        action: Option<LoadCallback>,
    ) -> LoadHandle {
        if let Some(handle) = self.find_handle(path, kind) {
            if let Some(task) = self.tasks.get_mut(handle) {
                task.rc += 1;
            }

            self.callbacks.push_back(PendingCallback { handle, action });
            return handle;
        }

        let source = match self.index.resolve(path) {
            Resolution::Bundle(v) => Source::Bundle {
                id: v.id.clone(),
                chain: self.index.chain(&v.id),
                sub_asset: false,
            },
            Resolution::SubAsset(v) => Source::Bundle {
                id: v.id.clone(),
                chain: self.index.chain(&v.id),
                sub_asset: true,
            },
            Resolution::Builtin => Source::Builtin,
        };

        let mut task = LoadTask::new(path, kind, source);
        task.rc = 1;

        let handle = self.tasks.create(task);
        if let Some(task) = self.tasks.get(handle) {
            for id in task.chain() {
                self.bundles.register_dependent(id, handle);
            }
        }

        debug!("[AssetCache] {} requested as {:?}.", handle, kind);
        self.order.push(handle);
        self.callbacks.push_back(PendingCallback { handle, action });
        self.start_if_can();
        handle
    }

    /// Drops one ownership of `handle`. Returns true if the load was actually removed,
    /// which happens once nothing owns it, it is not pinned and it is not loading.
    pub fn unload(&mut self, handle: LoadHandle) -> bool {
        let unloadable = match self.tasks.get_mut(handle) {
            Some(task) => {
                task.rc = task.rc.saturating_sub(1);
                task.is_unloadable()
            }
            None => return false,
        };

        if unloadable {
            self.remove(handle);
        }

        unloadable
    }

    /// Unloads every load nobody owns. With `force`, ownerships and pins are dropped
    /// first and the error gate is disengaged. Loads still in flight are removed as soon
    /// as they settle.
    pub fn unload_all(&mut self, force: bool) -> usize {
        if force {
            info!("[AssetCache] forced to unload everything.");
        }

        let mut num = 0;
        for handle in self.order.clone() {
            let unloadable = match self.tasks.get_mut(handle) {
                Some(task) => {
                    if force {
                        task.pinned = false;
                        task.rc = 0;
                    }

                    task.is_unloadable()
                }
                None => false,
            };

            if unloadable {
                self.remove(handle);
                num += 1;
            }
        }

        if force {
            self.disengage(None);
        }

        num
    }

    /// Stops notifying the callers of `handle`. The load itself keeps going and keeps
    /// its ownerships, which have to be dropped with `unload` eventually.
    pub fn cancel(&mut self, handle: LoadHandle) -> usize {
        let len = self.callbacks.len();
        self.callbacks.retain(|v| v.handle != handle);
        len - self.callbacks.len()
    }

    /// Finds the load of `path` whose type satisfies `kind`, without side effects.
    pub fn find_handle<T: AsRef<str>>(&self, path: T, kind: ResourceKind) -> Option<LoadHandle> {
        let path = path.as_ref().to_lowercase();
        let tasks = &self.tasks;

        self.order.iter().cloned().find(|&handle| {
            tasks
                .get(handle)
                .map(|v| kind.is_satisfied_by(v.kind()) && v.path().to_lowercase() == path)
                .unwrap_or(false)
        })
    }

    /// Clears the outstanding error, then resumes the failed load and every other
    /// stopped one. Stops that were requested but not reached yet are withdrawn. If one
    /// of them fails again the gate re-engages and the remaining resumes are abandoned.
    pub fn retry(&mut self) -> bool {
        let failure = match self.failure {
            Some(ref failure) => failure.clone(),
            None => return false,
        };

        info!("[AssetCache] retry {} ({}).", failure.path, failure.error);
        self.disengage(Some(failure.handle));
        true
    }

    /// Runs `func` on the next `advance`.
    pub fn defer<F>(&mut self, func: F)
    where
        F: FnOnce(&mut AssetCache) + 'static,
    {
        self.deferred.push(Box::new(func));
    }

    /// Advances every load, starts waiting ones if the budget allows, invokes ready
    /// callbacks in request order and delivers the error notification if the cache has
    /// settled. Call it once per frame from the owner thread.
    pub fn advance(&mut self) {
        let deferred = mem::replace(&mut self.deferred, Vec::new());

        self.bundles.advance();
        for handle in self.order.clone() {
            let busy = self
                .tasks
                .get(handle)
                .map(|v| !v.status().is_quiescent())
                .unwrap_or(false);

            if busy {
                self.drive(handle);
            }
        }

        self.start_if_can();
        self.drain();

        for func in deferred {
            func(self);
        }

        self.notify_if_can();
    }

    /// Returns true if any load has not been completed yet.
    pub fn is_loading(&self) -> bool {
        self.order.iter().any(|&handle| {
            self.tasks
                .get(handle)
                .map(|v| v.status() != LoadStatus::Completed)
                .unwrap_or(false)
        })
    }

    #[inline]
    pub fn contains(&self, handle: LoadHandle) -> bool {
        self.tasks.contains(handle)
    }

    #[inline]
    pub fn status(&self, handle: LoadHandle) -> Option<LoadStatus> {
        self.tasks.get(handle).map(|v| v.status())
    }

    #[inline]
    pub fn error_status(&self, handle: LoadHandle) -> Option<LoadError> {
        self.tasks.get(handle).and_then(|v| v.error())
    }

    #[inline]
    pub fn reference_count(&self, handle: LoadHandle) -> u32 {
        self.tasks.get(handle).map(|v| v.rc).unwrap_or(0)
    }

    #[inline]
    pub fn is_pinned(&self, handle: LoadHandle) -> bool {
        self.tasks.get(handle).map(|v| v.pinned).unwrap_or(false)
    }

    /// Pinned loads are never unloaded, unless forced with `unload_all(true)`.
    pub fn set_pinned(&mut self, handle: LoadHandle, pinned: bool) -> bool {
        match self.tasks.get_mut(handle) {
            Some(task) => {
                task.pinned = pinned;
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn path(&self, handle: LoadHandle) -> Option<&str> {
        self.tasks.get(handle).map(|v| v.path())
    }

    #[inline]
    pub fn kind(&self, handle: LoadHandle) -> Option<ResourceKind> {
        self.tasks.get(handle).map(|v| v.kind())
    }

    /// Returns the loaded object of `handle`.
    #[inline]
    pub fn raw_resource(&self, handle: LoadHandle) -> Option<&Resource> {
        self.tasks.get(handle).and_then(|v| v.resource())
    }

    /// Returns the loaded object of `handle` if it is a `T`.
    pub fn resource<T: Any + Send + Sync>(&self, handle: LoadHandle) -> Option<Arc<T>> {
        self.raw_resource(handle)
            .and_then(|v| v.clone().downcast::<T>().ok())
    }

    /// The outstanding error, if the gate is engaged.
    #[inline]
    pub fn failure(&self) -> Option<&LoadFailure> {
        self.failure.as_ref()
    }

    #[inline]
    pub fn bundles(&self) -> &BundleTracker {
        &self.bundles
    }

    /// Returns the number of alive loads.
    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn loading(&self) -> usize {
        self.order
            .iter()
            .filter(|&&handle| {
                self.tasks
                    .get(handle)
                    .map(|v| !v.status().is_quiescent())
                    .unwrap_or(false)
            })
            .count()
    }

    fn start_if_can(&mut self) {
        while self.failure.is_none() && self.loading() < self.params.max_concurrent_loads {
            let tasks = &self.tasks;
            let next = self.order.iter().cloned().find(|&handle| {
                tasks
                    .get(handle)
                    .map(|v| v.status() == LoadStatus::Unstarted)
                    .unwrap_or(false)
            });

            let handle = match next {
                Some(handle) => handle,
                None => return,
            };

            if let Some(task) = self.tasks.get_mut(handle) {
                task.start();
                debug!("[AssetCache] start loading {}.", task.path());
            }

            self.drive(handle);
        }
    }

    fn drive(&mut self, handle: LoadHandle) {
        let progress = {
            let task = match self.tasks.get_mut(handle) {
                Some(task) => task,
                None => return,
            };

            let mut ctx = DriveContext {
                bundles: &mut self.bundles,
                storage: self.storage.as_ref(),
            };

            task.drive(&mut ctx)
        };

        match progress {
            Progress::Pending => return,
            Progress::Completed => {
                if let Some(task) = self.tasks.get(handle) {
                    info!("[AssetCache] {} loaded.", task.path());
                }
            }
            Progress::Stopped => {
                debug!("[AssetCache] {} stopped.", handle);
            }
            Progress::Failed(err) => self.fail(handle, err),
        }

        // Loads dropped by everyone while they were busy go away once they settle.
        let unloadable = self
            .tasks
            .get(handle)
            .map(|v| v.is_unloadable())
            .unwrap_or(false);

        if unloadable {
            self.remove(handle);
        }
    }

    fn fail(&mut self, handle: LoadHandle, error: LoadError) {
        let (path, owned) = match self.tasks.get(handle) {
            Some(task) => (task.path().to_owned(), task.rc > 0 || task.pinned),
            None => return,
        };

        // Nobody wants it any more, it is swept right after.
        if !owned {
            warn!("[AssetCache] {} failed after being dropped: {}.", path, error);
            return;
        }

        if self.failure.is_some() {
            warn!("[AssetCache] {} failed while stopping: {}.", path, error);
            return;
        }

        error!("[AssetCache] failed to load {}: {}.", path, error);
        self.failure = Some(LoadFailure {
            handle,
            path,
            error,
        });
        self.notified = false;

        for &v in &self.order {
            if let Some(task) = self.tasks.get_mut(v) {
                if task.request_stop() {
                    trace!("[AssetCache] request {} to stop.", task.path());
                }
            }
        }
    }

    // Lifts the error gate. Every load it held back carries on: pending stops are
    // withdrawn, and stopped loads are resumed with `first` ahead of the others until one
    // of them fails again.
    fn disengage(&mut self, first: Option<LoadHandle>) {
        self.failure = None;
        self.notified = false;

        for &v in &self.order {
            if let Some(task) = self.tasks.get_mut(v) {
                if task.cancel_stop() {
                    trace!("[AssetCache] {} keeps loading.", task.path());
                }
            }
        }

        let mut handles: Vec<_> = first.into_iter().collect();
        handles.extend(self.order.iter().cloned().filter(|&v| Some(v) != first));

        for handle in handles {
            if self.failure.is_some() {
                break;
            }

            let resumed = self
                .tasks
                .get_mut(handle)
                .map(|v| v.resume())
                .unwrap_or(false);

            if resumed {
                debug!("[AssetCache] {} resumed.", handle);
                self.drive(handle);
            }
        }

        self.start_if_can();
    }

    fn notify_if_can(&mut self) {
        if self.notified {
            return;
        }

        let failure = match self.failure {
            Some(ref failure) => failure.clone(),
            None => return,
        };

        let busy = self.order.iter().any(|&handle| {
            self.tasks
                .get(handle)
                .map(|v| !v.status().is_quiescent())
                .unwrap_or(false)
        });

        if busy {
            return;
        }

        info!(
            "[AssetCache] notify error {} of {}.",
            failure.error, failure.path
        );

        self.notified = true;
        if let Some(mut sink) = self.sink.take() {
            sink(self, &failure);

            if self.sink.is_none() {
                self.sink = Some(sink);
            }
        }
    }

    fn drain(&mut self) {
        while self.failure.is_none() {
            let status = match self.callbacks.front() {
                Some(v) => self.status(v.handle),
                None => return,
            };

            match status {
                Some(LoadStatus::Completed) | None => {}
                _ => return,
            }

            if let Some(cb) = self.callbacks.pop_front() {
                if let (Some(action), Some(_)) = (cb.action, status) {
                    action(self, cb.handle);
                }
            }

            self.start_if_can();
        }
    }

    fn remove(&mut self, handle: LoadHandle) {
        if let Some(task) = self.tasks.free(handle) {
            task.release(&mut self.bundles, handle);
            self.order.retain(|&v| v != handle);
            self.callbacks.retain(|v| v.handle != handle);
            info!("[AssetCache] {} unloaded.", task.path());
        }
    }
}
