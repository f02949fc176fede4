//! The state machine of a single load.
//!
//! ```text
//! Unstarted -> Loading -> Completed
//!                 |  \
//!                 |   StopRequested -> Stopped -> Loading (resume)
//!                 |    (cancel stop) -> Loading
//!                 |                  \
//!                 |                   Completed
//!               (error) -> Stopped
//! ```
//!
//! A load walks through a list of steps: fetch every bundle of its dependency chain in
//! order, fetch the asset out of its own bundle, then settle the result. Direct loads
//! skip the bundle steps and fetch from built-in storage instead. The current step is
//! kept in the task, so a stopped load resumes exactly where it left off.
//!
//! Stop requests are honoured at the entry of a step, or when the result of the current
//! step is ready. I/O that is already in flight is never abandoned.

use std::sync::Arc;

use super::errors::LoadError;
use super::kind::ResourceKind;
use super::request::Request;
use super::storage::dir::stem;
use super::storage::{Bundle, Resource, Storage};
use super::tracker::{BundleTracker, FetchState};

impl_handle!(LoadHandle);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStatus {
    Unstarted,
    Loading,
    StopRequested,
    Stopped,
    Completed,
}

impl LoadStatus {
    /// Returns true if the load is neither loading nor about to stop.
    #[inline]
    pub fn is_quiescent(self) -> bool {
        match self {
            LoadStatus::Loading | LoadStatus::StopRequested => false,
            _ => true,
        }
    }
}

/// Where the content of a load comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Builtin,
    Bundle {
        /// The bundle holding the asset.
        id: String,
        /// Bundles to fetch in order, ending with `id`.
        chain: Vec<String>,
        /// The asset is one of several inside the bundle, so its sub-assets are
        /// loaded too.
        sub_asset: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Bundle(usize),
    Asset,
    Builtin,
    Settle,
}

/// What happened during one `drive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Still waiting on I/O.
    Pending,
    Completed,
    /// Reached a checkpoint after a stop was requested.
    Stopped,
    /// Stopped with an error. Reported once per failure.
    Failed(LoadError),
}

pub struct DriveContext<'a> {
    pub bundles: &'a mut BundleTracker,
    pub storage: &'a dyn Storage,
}

pub struct LoadTask {
    path: String,
    kind: ResourceKind,
    source: Source,
    status: LoadStatus,
    error: Option<LoadError>,
    resource: Option<Resource>,
    pub(crate) rc: u32,
    pub(crate) pinned: bool,

    step: Step,
    // The I/O of the current step has been issued.
    awaiting: bool,
    content: Option<Request<Option<Resource>>>,
}

impl LoadTask {
    pub fn new<T: Into<String>>(path: T, kind: ResourceKind, source: Source) -> Self {
        let step = match source {
            Source::Builtin => Step::Builtin,
            Source::Bundle { .. } => Step::Bundle(0),
        };

        LoadTask {
            path: path.into(),
            kind,
            source,
            status: LoadStatus::Unstarted,
            error: None,
            resource: None,
            rc: 0,
            pinned: false,
            step,
            awaiting: false,
            content: None,
        }
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    #[inline]
    pub fn source(&self) -> &Source {
        &self.source
    }

    #[inline]
    pub fn status(&self) -> LoadStatus {
        self.status
    }

    #[inline]
    pub fn error(&self) -> Option<LoadError> {
        self.error
    }

    /// The loaded object, only available once completed.
    #[inline]
    pub fn resource(&self) -> Option<&Resource> {
        if self.status == LoadStatus::Completed {
            self.resource.as_ref()
        } else {
            None
        }
    }

    /// The bundles this load depends on, empty for direct loads.
    pub fn chain(&self) -> &[String] {
        match self.source {
            Source::Bundle { ref chain, .. } => chain,
            Source::Builtin => &[],
        }
    }

    /// Returns true if nothing owns this load any more and it could be dropped.
    #[inline]
    pub fn is_unloadable(&self) -> bool {
        self.rc == 0 && !self.pinned && self.status.is_quiescent()
    }

    /// Unstarted -> Loading.
    pub fn start(&mut self) -> bool {
        if self.status != LoadStatus::Unstarted {
            return false;
        }

        self.status = LoadStatus::Loading;
        true
    }

    /// Loading -> StopRequested.
    pub fn request_stop(&mut self) -> bool {
        if self.status != LoadStatus::Loading {
            return false;
        }

        self.status = LoadStatus::StopRequested;
        true
    }

    /// StopRequested -> Loading, withdrawing a stop the load has not reached yet.
    pub fn cancel_stop(&mut self) -> bool {
        if self.status != LoadStatus::StopRequested {
            return false;
        }

        self.status = LoadStatus::Loading;
        true
    }

    /// Stopped -> Loading, clearing the error. The load re-enters the step it left off.
    pub fn resume(&mut self) -> bool {
        if self.status != LoadStatus::Stopped {
            return false;
        }

        self.status = LoadStatus::Loading;
        self.error = None;
        true
    }

    /// Advances the load as far as possible without blocking.
    pub fn drive(&mut self, ctx: &mut DriveContext) -> Progress {
        loop {
            match self.status {
                LoadStatus::Loading | LoadStatus::StopRequested => {}
                LoadStatus::Completed => return Progress::Completed,
                _ => return Progress::Pending,
            }

            if self.status == LoadStatus::StopRequested && !self.awaiting {
                self.status = LoadStatus::Stopped;
                return Progress::Stopped;
            }

            match self.step {
                Step::Bundle(i) => {
                    let id = &self.chain()[i];
                    let state = if self.awaiting {
                        ctx.bundles.state(id)
                    } else {
                        FetchState::Idle
                    };

                    let state = match state {
                        FetchState::Idle => ctx.bundles.fetch(id, ctx.storage),
                        v => v,
                    };

                    match state {
                        FetchState::Loaded => {
                            self.awaiting = false;
                            self.step = if i + 1 < self.chain().len() {
                                Step::Bundle(i + 1)
                            } else {
                                Step::Asset
                            };
                        }
                        FetchState::Failed => return self.fail(LoadError::SourceNotFound),
                        _ => {
                            self.awaiting = true;
                            return Progress::Pending;
                        }
                    }
                }

                Step::Asset => {
                    let (id, sub_asset) = match self.source {
                        Source::Bundle {
                            ref id,
                            sub_asset,
                            ..
                        } => (id, sub_asset),
                        Source::Builtin => {
                            self.step = Step::Builtin;
                            continue;
                        }
                    };

                    let bundle: Arc<dyn Bundle> = match ctx.bundles.bundle(id) {
                        Some(bundle) => bundle,
                        None => {
                            // The bundle went away underneath us, fetch it again.
                            self.step = Step::Bundle(self.chain().len() - 1);
                            continue;
                        }
                    };

                    let name = stem(&self.path);
                    if !bundle.contains(name) {
                        return self.fail(LoadError::ContentNotContained);
                    }

                    trace!("[LoadTask] fetch {} from bundle {}.", self.path, id);
                    let req = bundle.load_asset(name, self.kind.storage_kind(), sub_asset);
                    self.content = Some(req);
                    self.step = Step::Settle;
                    self.awaiting = true;
                }

                Step::Builtin => {
                    trace!("[LoadTask] fetch {} from built-in storage.", self.path);
                    let req = ctx.storage.load_builtin(&self.path, self.kind.storage_kind());
                    self.content = Some(req);
                    self.step = Step::Settle;
                    self.awaiting = true;
                }

                Step::Settle => {
                    let ready = match self.content {
                        Some(ref mut req) => req.poll(),
                        None => true,
                    };

                    if !ready {
                        return Progress::Pending;
                    }

                    self.awaiting = false;

                    // The result is kept, it settles once resumed.
                    if self.status == LoadStatus::StopRequested {
                        self.status = LoadStatus::Stopped;
                        return Progress::Stopped;
                    }

                    let rsp = self
                        .content
                        .take()
                        .and_then(Request::into_response)
                        .and_then(|v| v);

                    match rsp {
                        Some(resource) => {
                            self.resource = Some(resource);
                            self.status = LoadStatus::Completed;
                            return Progress::Completed;
                        }
                        None => {
                            self.step = match self.source {
                                Source::Builtin => Step::Builtin,
                                Source::Bundle { .. } => Step::Asset,
                            };

                            return self.fail(LoadError::ContentIsNull);
                        }
                    }
                }
            }
        }
    }

    fn fail(&mut self, err: LoadError) -> Progress {
        self.status = LoadStatus::Stopped;
        self.error = Some(err);
        self.awaiting = false;
        Progress::Failed(err)
    }

    /// Drops this load's claims on the bundles of its chain.
    pub fn release(&self, bundles: &mut BundleTracker, handle: LoadHandle) {
        for id in self.chain() {
            bundles.release(id, handle);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::res::storage::archive::ArchiveEntry;
    use crate::res::storage::memory::MemoryStorage;

    fn bundle(chain: &[&str], sub_asset: bool) -> Source {
        Source::Bundle {
            id: chain[chain.len() - 1].to_owned(),
            chain: chain.iter().map(|v| (*v).to_owned()).collect(),
            sub_asset,
        }
    }

    fn register(bundles: &mut BundleTracker, task: &LoadTask, handle: LoadHandle) {
        for id in task.chain() {
            bundles.register_dependent(id, handle);
        }
    }

    #[test]
    fn transitions() {
        let mut task = LoadTask::new("bgm", ResourceKind::AudioClip, Source::Builtin);
        assert!(!task.resume());
        assert!(!task.request_stop());
        assert!(task.start());
        assert!(!task.start());
        assert!(task.request_stop());
        assert_eq!(task.status(), LoadStatus::StopRequested);
        assert!(!task.request_stop());
        assert!(!task.is_unloadable());

        assert!(task.cancel_stop());
        assert_eq!(task.status(), LoadStatus::Loading);
        assert!(!task.cancel_stop());
        assert!(!task.resume());
    }

    #[test]
    fn builtin() {
        let storage = MemoryStorage::new();
        storage.insert_builtin("sound/bgm", ResourceKind::AudioClip, vec![1]);

        let mut bundles = BundleTracker::new();
        let mut ctx = DriveContext {
            bundles: &mut bundles,
            storage: &storage,
        };

        let mut task = LoadTask::new("sound/bgm", ResourceKind::AudioClip, Source::Builtin);
        assert_eq!(task.drive(&mut ctx), Progress::Pending);
        assert!(task.resource().is_none());

        task.start();
        assert_eq!(task.drive(&mut ctx), Progress::Completed);
        assert!(task.resource().is_some());
        assert_eq!(task.error(), None);
    }

    #[test]
    fn null_content() {
        let storage = MemoryStorage::new();
        let mut bundles = BundleTracker::new();
        let mut ctx = DriveContext {
            bundles: &mut bundles,
            storage: &storage,
        };

        let mut task = LoadTask::new("sound/bgm", ResourceKind::AudioClip, Source::Builtin);
        task.start();
        assert_eq!(
            task.drive(&mut ctx),
            Progress::Failed(LoadError::ContentIsNull)
        );
        assert_eq!(task.status(), LoadStatus::Stopped);

        storage.insert_builtin("sound/bgm", ResourceKind::AudioClip, vec![1]);
        assert!(task.resume());
        assert_eq!(task.error(), None);
        assert_eq!(task.drive(&mut ctx), Progress::Completed);
        assert_eq!(storage.builtin_fetches().len(), 2);
    }

    #[test]
    fn resume_after_stop() {
        let storage = MemoryStorage::new();
        storage.insert_bundle("shared/a", vec![]);
        storage.insert_bundle("shared/b", vec![]);
        storage.insert_bundle(
            "chara/0001",
            vec![ArchiveEntry::new("0001", ResourceKind::GameObject, vec![1])],
        );

        let handle = LoadHandle::from(crate::utils::prelude::Handle::new(0, 1));
        let mut bundles = BundleTracker::new();
        let mut task = LoadTask::new(
            "chara/0001",
            ResourceKind::GameObject,
            bundle(&["shared/a", "shared/b", "chara/0001"], false),
        );
        register(&mut bundles, &task, handle);

        storage.hold("shared/b");
        task.start();

        {
            let mut ctx = DriveContext {
                bundles: &mut bundles,
                storage: &storage,
            };
            assert_eq!(task.drive(&mut ctx), Progress::Pending);
            assert!(task.request_stop());

            // The in-flight fetch finishes before the stop is honoured.
            assert_eq!(task.drive(&mut ctx), Progress::Pending);
        }

        storage.release("shared/b");
        bundles.advance();

        {
            let mut ctx = DriveContext {
                bundles: &mut bundles,
                storage: &storage,
            };
            assert_eq!(task.drive(&mut ctx), Progress::Stopped);
            assert_eq!(task.status(), LoadStatus::Stopped);
            assert_eq!(storage.fetches(), vec!["shared/a", "shared/b"]);

            assert!(task.resume());
            assert_eq!(task.drive(&mut ctx), Progress::Completed);
        }

        assert_eq!(
            storage.fetches(),
            vec!["shared/a", "shared/b", "chara/0001"]
        );

        task.release(&mut bundles, handle);
        assert!(bundles.is_empty());
        assert_eq!(storage.unloads().len(), 3);
    }

    #[test]
    fn stop_while_settling() {
        let storage = MemoryStorage::new();
        storage.insert_builtin("text/intro", ResourceKind::TextAsset, vec![1]);
        storage.hold("text/intro");

        let mut bundles = BundleTracker::new();
        let mut ctx = DriveContext {
            bundles: &mut bundles,
            storage: &storage,
        };

        let mut task = LoadTask::new("text/intro", ResourceKind::TextAsset, Source::Builtin);
        task.start();
        assert_eq!(task.drive(&mut ctx), Progress::Pending);

        task.request_stop();
        storage.release("text/intro");

        // Completion during a stop request turns into a stop, the result is kept.
        assert_eq!(task.drive(&mut ctx), Progress::Stopped);
        assert!(task.resource().is_none());

        task.resume();
        assert_eq!(task.drive(&mut ctx), Progress::Completed);
        assert_eq!(storage.builtin_fetches().len(), 1);
    }

    #[test]
    fn not_contained() {
        let storage = MemoryStorage::new();
        storage.insert_bundle("ui/common", vec![]);

        let handle = LoadHandle::from(crate::utils::prelude::Handle::new(0, 1));
        let mut bundles = BundleTracker::new();
        let mut task = LoadTask::new(
            "ui/common/button",
            ResourceKind::Sprite,
            bundle(&["ui/common"], true),
        );
        register(&mut bundles, &task, handle);
        task.start();

        let mut ctx = DriveContext {
            bundles: &mut bundles,
            storage: &storage,
        };
        assert_eq!(
            task.drive(&mut ctx),
            Progress::Failed(LoadError::ContentNotContained)
        );
        assert_eq!(task.error(), Some(LoadError::ContentNotContained));
    }
}
