//=========================================================================
// Bundle Loader
//=========================================================================
//
// Deduplicated, reference-counted acquisition and release of bundles.
//
// Per-key slot lifecycle:
//
//   (absent) ──acquire──> Loading ──ok──> Loaded{ref_count} ──release→0──> Unloading ──> (absent)
//                            └──err──> (absent)     ↺ acquire +1 / release -1
//
// Loading and Unloading hold a shared future. Concurrent callers for the
// same key await that one future instead of starting their own, so the
// provider sees at most one operation per key at a time. The slot map
// lock is only held between awaits; unrelated keys never wait on each
// other.
//
// Dropped callers:
//   A load nobody is waiting for any more is finished on the runtime and
//   unloaded again. An unload whose releasing caller went away is finished
//   on the runtime. Without a runtime, the next acquire of the key drives
//   whatever is left in its slot.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, warn};
use parking_lot::Mutex;
use tokio::runtime::Handle;

//=== Internal Dependencies ===============================================

use super::{BundleContent, BundleHandle, BundleKey, BundleProvider};
use crate::core::error::{LoaderError, ProviderError};
use crate::core::events::{EventBus, NavigationEvent};

//=== Slot State ==========================================================

type LoadFuture = Shared<BoxFuture<'static, Result<Arc<BundleContent>, ProviderError>>>;
type UnloadFuture = Shared<BoxFuture<'static, Result<(), ProviderError>>>;
type SlotMap = Arc<Mutex<HashMap<BundleKey, Slot>>>;

enum Slot {
    Loading(LoadFuture),
    Loaded {
        content: Arc<BundleContent>,
        ref_count: u32,
    },
    Unloading(UnloadFuture),
}

/// What an `acquire` has to wait for before it can take a reference.
enum Pending {
    Load(LoadFuture),
    Unload(UnloadFuture),
}

fn start_unload(provider: &Arc<dyn BundleProvider>, content: Arc<BundleContent>) -> UnloadFuture {
    let provider = Arc::clone(provider);
    async move { provider.unload(content).await }.boxed().shared()
}

/// Clears the slot if it still holds this very unload.
fn clear_unloading(slots: &Mutex<HashMap<BundleKey, Slot>>, key: &BundleKey, unload: &UnloadFuture) {
    let mut slots = slots.lock();
    if matches!(slots.get(key), Some(Slot::Unloading(current)) if current.ptr_eq(unload)) {
        slots.remove(key);
    }
}

/// Hands `task` to the current tokio runtime, if there is one.
fn spawn_detached(key: &BundleKey, task: BoxFuture<'static, ()>) {
    match Handle::try_current() {
        Ok(runtime) => drop(runtime.spawn(task)),
        Err(_) => warn!(
            "No async runtime to finish bundle {}; the next acquire will settle it",
            key
        ),
    }
}

//=== DetachOnDrop ========================================================

/// Awaits a cleanup future, moving it onto the runtime if dropped early.
struct DetachOnDrop {
    key: BundleKey,
    task: Option<BoxFuture<'static, Result<(), LoaderError>>>,
}

impl Future for DetachOnDrop {
    type Output = Result<(), LoaderError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(task) = self.task.as_mut() else {
            return Poll::Pending;
        };

        let output = futures::ready!(task.poll_unpin(cx));
        self.task = None;
        Poll::Ready(output)
    }
}

impl Drop for DetachOnDrop {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            debug!("Caller releasing bundle {} went away, finishing on the runtime", self.key);
            spawn_detached(&self.key, task.map(|_| ()).boxed());
        }
    }
}

//=== LoadWatch ===========================================================

/// Armed while an `acquire` awaits a load; settles the load if dropped.
struct LoadWatch<'a> {
    loader: &'a BundleLoader,
    key: &'a BundleKey,
    load: &'a LoadFuture,
    armed: bool,
}

impl LoadWatch<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for LoadWatch<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.loader.settle_abandoned_load(self.key, self.load);
        }
    }
}

//=== BundleLoader ========================================================

/// Single-flight, reference-counted front for a [`BundleProvider`].
///
/// Every successful [`acquire`](Self::acquire) must be matched by exactly
/// one [`release`](Self::release). The bundle is unloaded when the last
/// reference goes away.
pub struct BundleLoader {
    provider: Arc<dyn BundleProvider>,
    slots: SlotMap,
    events: EventBus,
}

impl BundleLoader {
    //--- Construction -----------------------------------------------------

    /// Creates a loader with its own (unobserved) event bus.
    pub fn new(provider: Arc<dyn BundleProvider>) -> Self {
        Self::with_events(provider, EventBus::default())
    }

    /// Creates a loader that publishes bundle events to `events`.
    pub fn with_events(provider: Arc<dyn BundleProvider>, events: EventBus) -> Self {
        Self {
            provider,
            slots: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    //--- Acquire ----------------------------------------------------------

    /// Takes one reference to the bundle `key`, loading it if needed.
    ///
    /// An already loaded bundle is returned immediately. If a load for
    /// `key` is in flight the call joins it. If the bundle is being
    /// unloaded the call waits for that to finish and loads it again.
    ///
    /// On failure no reference is taken and every caller that joined the
    /// same load receives the same error. Dropping the returned future
    /// takes no reference either.
    pub async fn acquire(&self, key: &BundleKey) -> Result<BundleHandle, LoaderError> {
        loop {
            let pending = {
                let mut slots = self.slots.lock();
                match slots.get_mut(key) {
                    Some(Slot::Loaded { content, ref_count }) => {
                        *ref_count += 1;
                        debug!("Bundle {} reused (refs: {})", key, ref_count);
                        return Ok(BundleHandle::new(Arc::clone(content)));
                    }
                    Some(Slot::Loading(load)) => {
                        debug!("Bundle {} already loading, joining in-flight load", key);
                        Pending::Load(load.clone())
                    }
                    Some(Slot::Unloading(unload)) => Pending::Unload(unload.clone()),
                    None => {
                        debug!("Loading bundle {}", key);
                        let load = self.start_load(key);
                        slots.insert(key.clone(), Slot::Loading(load.clone()));
                        Pending::Load(load)
                    }
                }
            };

            match pending {
                Pending::Unload(unload) => {
                    let _ = unload.clone().await;
                    clear_unloading(&self.slots, key, &unload);
                }
                Pending::Load(load) => {
                    let watch = LoadWatch {
                        loader: self,
                        key,
                        load: &load,
                        armed: true,
                    };
                    let result = load.clone().await;
                    watch.disarm();

                    if let Some(outcome) = self.finish_load(key, &load, result) {
                        return outcome;
                    }
                    // The load we joined was already released and torn
                    // down; start over against the current slot.
                }
            }
        }
    }

    fn start_load(&self, key: &BundleKey) -> LoadFuture {
        let provider = Arc::clone(&self.provider);
        let key = key.clone();

        async move {
            let content = provider.load(&key).await?;
            if content.key() != &key {
                return Err(ProviderError::Malformed {
                    reason: format!("provider returned bundle {}", content.key()),
                    key,
                });
            }
            Ok(Arc::new(content))
        }
        .boxed()
        .shared()
    }

    /// Applies a finished load to the slot map.
    ///
    /// Returns `None` when the caller must retry.
    fn finish_load(
        &self,
        key: &BundleKey,
        load: &LoadFuture,
        result: Result<Arc<BundleContent>, ProviderError>,
    ) -> Option<Result<BundleHandle, LoaderError>> {
        let mut slots = self.slots.lock();

        let content = match result {
            Ok(content) => content,
            Err(cause) => {
                if matches!(slots.get(key), Some(Slot::Loading(current)) if current.ptr_eq(load)) {
                    slots.remove(key);
                    warn!("Bundle {} failed to load: {}", key, cause);
                }
                return Some(Err(LoaderError::LoadFailed {
                    key: key.clone(),
                    cause,
                }));
            }
        };

        if matches!(slots.get(key), Some(Slot::Loading(current)) if current.ptr_eq(load)) {
            slots.insert(
                key.clone(),
                Slot::Loaded {
                    content: Arc::clone(&content),
                    ref_count: 1,
                },
            );
            drop(slots);

            debug!("Bundle {} loaded (refs: 1)", key);
            self.events.publish(NavigationEvent::BundleLoaded { key: key.clone() });
            return Some(Ok(BundleHandle::new(content)));
        }

        // Another waiter of the same load registered it first
        if let Some(Slot::Loaded {
            content: loaded,
            ref_count,
        }) = slots.get_mut(key)
        {
            if Arc::ptr_eq(loaded, &content) {
                *ref_count += 1;
                debug!("Bundle {} reused after shared load (refs: {})", key, ref_count);
                return Some(Ok(BundleHandle::new(content)));
            }
        }

        None
    }

    /// Finishes a load whose waiter was dropped.
    ///
    /// If no other waiter has claimed it by then, the content goes
    /// straight back to the provider and the slot is cleared.
    fn settle_abandoned_load(&self, key: &BundleKey, load: &LoadFuture) {
        let slots = Arc::clone(&self.slots);
        let provider = Arc::clone(&self.provider);
        let key = key.clone();
        let load = load.clone();

        let task = {
            let key = key.clone();
            async move {
                let result = load.clone().await;

                let unload = {
                    let mut slots = slots.lock();
                    if !matches!(slots.get(&key), Some(Slot::Loading(current)) if current.ptr_eq(&load)) {
                        return;
                    }
                    match result {
                        Ok(content) => {
                            let unload = start_unload(&provider, content);
                            slots.insert(key.clone(), Slot::Unloading(unload.clone()));
                            unload
                        }
                        Err(_) => {
                            slots.remove(&key);
                            return;
                        }
                    }
                };

                debug!("Unloading bundle {} loaded for a dropped caller", key);
                if let Err(cause) = unload.clone().await {
                    warn!("Bundle {} failed to unload: {}", key, cause);
                }
                clear_unloading(&slots, &key, &unload);
            }
        };

        spawn_detached(&key, task.boxed());
    }

    //--- Release ----------------------------------------------------------

    /// Gives back one reference to `key`; unloads the bundle on the last one.
    ///
    /// Fails with [`LoaderError::ReleaseOnUnacquired`] when `key` holds no
    /// reference, leaving every count untouched. An unload failure is
    /// reported, but the handle is gone either way.
    ///
    /// The reference is dropped on the first poll; an unload still running
    /// when the future is dropped is finished on the runtime.
    pub async fn release(&self, key: &BundleKey) -> Result<(), LoaderError> {
        match self.drop_reference(key)? {
            None => Ok(()),
            Some(unload) => {
                DetachOnDrop {
                    key: key.clone(),
                    task: Some(self.complete_unload(key.clone(), unload)),
                }
                .await
            }
        }
    }

    /// Gives back one reference to `key` without waiting for the unload.
    ///
    /// Used when the caller cannot await, such as from `Drop`.
    pub(crate) fn release_detached(&self, key: &BundleKey) {
        if let Ok(Some(unload)) = self.drop_reference(key) {
            let task = self.complete_unload(key.clone(), unload);
            spawn_detached(key, task.map(|_| ()).boxed());
        }
    }

    /// Decrements the count; on the last reference switches the slot to
    /// `Unloading` and returns the unload to drive.
    fn drop_reference(&self, key: &BundleKey) -> Result<Option<UnloadFuture>, LoaderError> {
        let mut slots = self.slots.lock();
        match slots.get_mut(key) {
            Some(Slot::Loaded { content, ref_count }) => {
                if *ref_count > 1 {
                    *ref_count -= 1;
                    debug!("Bundle {} released (refs: {})", key, ref_count);
                    return Ok(None);
                }

                let unload = start_unload(&self.provider, Arc::clone(content));
                slots.insert(key.clone(), Slot::Unloading(unload.clone()));
                Ok(Some(unload))
            }
            _ => {
                warn!("Rejected release of bundle {} with no outstanding reference", key);
                Err(LoaderError::ReleaseOnUnacquired(key.clone()))
            }
        }
    }

    /// Drives an unload to completion, then clears the slot and reports.
    fn complete_unload(
        &self,
        key: BundleKey,
        unload: UnloadFuture,
    ) -> BoxFuture<'static, Result<(), LoaderError>> {
        let slots = Arc::clone(&self.slots);
        let events = self.events.clone();

        async move {
            debug!("Unloading bundle {}", key);
            let result = unload.clone().await;
            clear_unloading(&slots, &key, &unload);

            match result {
                Ok(()) => {
                    events.publish(NavigationEvent::BundleUnloaded { key });
                    Ok(())
                }
                Err(cause) => {
                    warn!("Bundle {} failed to unload: {}", key, cause);
                    events.publish(NavigationEvent::UnloadFailed {
                        key: key.clone(),
                        cause: cause.clone(),
                    });
                    Err(LoaderError::UnloadFailed { key, cause })
                }
            }
        }
        .boxed()
    }

    //--- Query API --------------------------------------------------------

    /// Outstanding references to `key` (0 when not loaded).
    pub fn ref_count(&self, key: &BundleKey) -> u32 {
        match self.slots.lock().get(key) {
            Some(Slot::Loaded { ref_count, .. }) => *ref_count,
            _ => 0,
        }
    }

    pub fn is_loaded(&self, key: &BundleKey) -> bool {
        matches!(self.slots.lock().get(key), Some(Slot::Loaded { .. }))
    }

    pub fn is_loading(&self, key: &BundleKey) -> bool {
        matches!(self.slots.lock().get(key), Some(Slot::Loading(_)))
    }

    /// Keys currently loaded, sorted.
    pub fn loaded_keys(&self) -> Vec<BundleKey> {
        let mut keys: Vec<BundleKey> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Loaded { .. }))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// True when no key has a load or unload in flight or live references.
    pub fn is_idle(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

//=========================================================================
// Tests
//=========================================================================
