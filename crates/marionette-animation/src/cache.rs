//! Clip cache with deduplicated in-flight loads
//!
//! `load` hands out a `Shared` future per clip name. A second request for a
//! name that is still loading joins the first one instead of fetching again.
//! The pending entry is dropped when the load settles; only successes reach
//! the resolved map.

use crate::catalog::ClipDescriptor;
use crate::clip::SkeletalClip;
use crate::loader::ClipSource;
use futures::future::{self, FutureExt, LocalBoxFuture, Shared};
use marionette_core::MarionetteError;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use thiserror::Error;

/// A failed load. Cloneable so every joined waiter can observe it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("failed to load clip '{name}': {reason}")]
pub struct LoadError {
    pub name: String,
    pub reason: String,
}

impl From<LoadError> for MarionetteError {
    fn from(err: LoadError) -> Self {
        MarionetteError::LoadFailure {
            name: err.name,
            reason: err.reason,
        }
    }
}

/// A clip ready for playback
#[derive(Debug)]
pub struct LoadedClip {
    pub name: String,
    pub clip: SkeletalClip,
    /// Length used for playback, from the clip data rather than the catalog
    pub runtime_duration: f64,
}

pub type LoadResult = std::result::Result<Rc<LoadedClip>, LoadError>;

/// Handle to a (possibly shared) load
pub type ClipLoad = Shared<LocalBoxFuture<'static, LoadResult>>;

#[derive(Default)]
struct CacheState {
    loaded: HashMap<String, Rc<LoadedClip>>,
    pending: HashMap<String, ClipLoad>,
    /// Bumped by `dispose`; loads started under an older generation are discarded
    generation: u64,
    fetches: usize,
}

#[derive(Clone)]
pub struct ClipCache {
    state: Rc<RefCell<CacheState>>,
    source: Rc<dyn ClipSource>,
}

impl fmt::Debug for ClipCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ClipCache")
            .field("loaded", &state.loaded.len())
            .field("pending", &state.pending.len())
            .field("generation", &state.generation)
            .finish()
    }
}

impl ClipCache {
    pub fn new(source: Rc<dyn ClipSource>) -> Self {
        Self {
            state: Rc::new(RefCell::new(CacheState::default())),
            source,
        }
    }

    /// Resolve a clip, fetching it at most once per name.
    pub fn load(&self, descriptor: &ClipDescriptor) -> ClipLoad {
        let name = descriptor.name.clone();
        {
            let state = self.state.borrow();
            if let Some(clip) = state.loaded.get(&name) {
                let ready: LocalBoxFuture<'static, LoadResult> =
                    future::ready(Ok(clip.clone())).boxed_local();
                return ready.shared();
            }
            if let Some(pending) = state.pending.get(&name) {
                tracing::trace!(clip = %name, "joining in-flight load");
                return pending.clone();
            }
        }

        let fetch = self.source.fetch(descriptor);
        let fallback_duration = descriptor.duration;
        let weak: Weak<RefCell<CacheState>> = Rc::downgrade(&self.state);
        let generation = {
            let mut state = self.state.borrow_mut();
            state.fetches += 1;
            state.generation
        };

        let key = name.clone();
        let settle = async move {
            let outcome = match fetch.await {
                Ok(clip) => {
                    let runtime_duration = if clip.duration > 0.0 {
                        clip.duration
                    } else {
                        fallback_duration
                    };
                    Ok(Rc::new(LoadedClip {
                        name: key.clone(),
                        clip,
                        runtime_duration,
                    }))
                }
                Err(err) => {
                    let reason = match err {
                        MarionetteError::LoadFailure { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    Err(LoadError {
                        name: key.clone(),
                        reason,
                    })
                }
            };

            if let Some(state) = weak.upgrade() {
                let mut state = state.borrow_mut();
                if state.generation == generation {
                    state.pending.remove(&key);
                    if let Ok(clip) = &outcome {
                        state.loaded.insert(key.clone(), clip.clone());
                    }
                }
            }
            if let Err(err) = &outcome {
                tracing::warn!("{}", err);
            }
            outcome
        }
        .boxed_local()
        .shared();

        self.state
            .borrow_mut()
            .pending
            .insert(name, settle.clone());
        settle
    }

    pub fn has(&self, name: &str) -> bool {
        self.state.borrow().loaded.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Rc<LoadedClip>> {
        self.state.borrow().loaded.get(name).cloned()
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.state.borrow().pending.contains_key(name)
    }

    pub fn loaded_count(&self) -> usize {
        self.state.borrow().loaded.len()
    }

    pub fn pending_count(&self) -> usize {
        self.state.borrow().pending.len()
    }

    /// Underlying fetches started over the cache's lifetime
    pub fn fetch_count(&self) -> usize {
        self.state.borrow().fetches
    }

    /// Names of resolved clips, sorted
    pub fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.borrow().loaded.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop resolved clips and pending loads. Loads still in flight settle
    /// without touching the cache.
    pub fn dispose(&self) {
        let mut state = self.state.borrow_mut();
        state.loaded.clear();
        state.pending.clear();
        state.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ClipCategory;
    use crate::clip::{BoneTrack, Interpolation, JointKeyframe, JointProperty};
    use crate::loader::MemoryClipSource;
    use futures::channel::oneshot;
    use futures::executor::block_on;
    use marionette_core::Result;

    fn descriptor(name: &str) -> ClipDescriptor {
        ClipDescriptor {
            name: name.into(),
            resource: format!("{}.vrma", name),
            category: ClipCategory::Idle,
            duration: 3.0,
            looping: true,
        }
    }

    fn clip(name: &str) -> SkeletalClip {
        SkeletalClip {
            name: name.into(),
            duration: 2.5,
            tracks: vec![BoneTrack {
                bone: "spine".into(),
                property: JointProperty::Rotation,
                interpolation: Interpolation::Linear,
                keyframes: vec![JointKeyframe::new(0.0, vec![0.0, 0.0, 0.0, 1.0])],
            }],
        }
    }

    /// Holds every fetch until the test releases it
    struct GatedSource {
        gates: RefCell<Vec<oneshot::Sender<()>>>,
        fail: bool,
    }

    impl ClipSource for GatedSource {
        fn fetch(&self, d: &ClipDescriptor) -> LocalBoxFuture<'static, Result<SkeletalClip>> {
            let (tx, rx) = oneshot::channel();
            self.gates.borrow_mut().push(tx);
            let name = d.name.clone();
            let fail = self.fail;
            async move {
                let _ = rx.await;
                if fail {
                    Err(MarionetteError::LoadFailure {
                        name,
                        reason: "gate closed".into(),
                    })
                } else {
                    Ok(clip(&name))
                }
            }
            .boxed_local()
        }
    }

    fn gated(fail: bool) -> Rc<GatedSource> {
        Rc::new(GatedSource {
            gates: RefCell::new(Vec::new()),
            fail,
        })
    }

    #[test]
    fn concurrent_loads_share_one_fetch() {
        let source = gated(false);
        let cache = ClipCache::new(source.clone());
        let first = cache.load(&descriptor("wave"));
        let second = cache.load(&descriptor("wave"));
        assert_eq!(cache.fetch_count(), 1);
        assert_eq!(source.gates.borrow().len(), 1);
        assert!(cache.is_pending("wave"));
        assert!(first.clone().now_or_never().is_none());

        for gate in source.gates.borrow_mut().drain(..) {
            gate.send(()).unwrap();
        }
        let a = block_on(first).unwrap();
        let b = block_on(second).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(a.runtime_duration, 2.5);
        assert!(cache.has("wave"));
        assert_eq!(cache.pending_count(), 0);

        // Resolved: no new fetch
        block_on(cache.load(&descriptor("wave"))).unwrap();
        assert_eq!(cache.fetch_count(), 1);
    }

    #[test]
    fn failures_are_not_cached() {
        let source = gated(true);
        let cache = ClipCache::new(source.clone());
        let load = cache.load(&descriptor("spin"));
        for gate in source.gates.borrow_mut().drain(..) {
            gate.send(()).unwrap();
        }
        let err = block_on(load).unwrap_err();
        assert_eq!(err.name, "spin");
        assert_eq!(err.reason, "gate closed");
        assert!(!cache.has("spin"));
        assert!(!cache.is_pending("spin"));

        // A later request fetches again
        let _retry = cache.load(&descriptor("spin"));
        assert_eq!(cache.fetch_count(), 2);
    }

    #[test]
    fn dispose_discards_in_flight_results() {
        let source = gated(false);
        let cache = ClipCache::new(source.clone());
        let load = cache.load(&descriptor("bow"));
        cache.dispose();
        assert_eq!(cache.pending_count(), 0);

        for gate in source.gates.borrow_mut().drain(..) {
            gate.send(()).unwrap();
        }
        assert!(block_on(load).is_ok());
        assert!(!cache.has("bow"));
        assert_eq!(cache.loaded_count(), 0);
    }

    #[test]
    fn ready_sources_resolve_immediately() {
        let source = Rc::new(MemoryClipSource::new().with_clip("hello", clip("hello")));
        let cache = ClipCache::new(source.clone());
        let loaded = cache.load(&descriptor("hello")).now_or_never().unwrap().unwrap();
        assert_eq!(loaded.name, "hello");
        assert_eq!(cache.loaded_names(), vec!["hello".to_string()]);
        assert_eq!(source.fetch_count(), 1);
    }

    #[test]
    fn load_error_converts() {
        let err: MarionetteError = LoadError {
            name: "spin".into(),
            reason: "missing".into(),
        }
        .into();
        assert!(matches!(err, MarionetteError::LoadFailure { .. }));
    }
}
