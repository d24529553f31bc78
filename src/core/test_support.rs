//=========================================================================
// Test Support
//=========================================================================
//
// Scripted collaborators shared by the unit tests:
// - ScriptedProvider: in-memory BundleProvider with call counters,
//   injectable delays and failures
// - RecordingElement: animated or static element that counts every
//   hook invocation
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

//=== Internal Dependencies ===============================================

use crate::core::bundle::{BundleContent, BundleKey, BundleProvider};
use crate::core::element::{
    AnimatedElement, AnimationPreset, ElementId, ElementRef, NavigationContext, Pose, UiElement,
    Viewport,
};
use crate::core::error::ProviderError;

//=== ScriptedProvider ====================================================

#[derive(Default)]
struct ProviderCounters {
    loads: HashMap<BundleKey, usize>,
    unloads: HashMap<BundleKey, usize>,
    loads_in_flight: HashMap<BundleKey, usize>,
    max_loads_in_flight: HashMap<BundleKey, usize>,
    ops_in_flight: HashMap<BundleKey, usize>,
    max_ops_in_flight: HashMap<BundleKey, usize>,
}

#[derive(Default)]
pub(crate) struct ScriptedProvider {
    bundles: Mutex<HashMap<BundleKey, Vec<ElementRef>>>,
    aliases: Mutex<HashMap<BundleKey, BundleKey>>,
    failing_loads: Mutex<HashSet<BundleKey>>,
    failing_unloads: Mutex<HashSet<BundleKey>>,
    load_delay: Duration,
    unload_delay: Duration,
    counters: Mutex<ProviderCounters>,
}

impl ScriptedProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_bundle(self, key: &str, elements: Vec<ElementRef>) -> Self {
        self.insert_bundle(key, elements);
        self
    }

    /// Serves `alias` with the content registered under `target`.
    pub(crate) fn with_alias(self, alias: &str, target: &str) -> Self {
        self.aliases.lock().insert(alias.into(), target.into());
        self
    }

    pub(crate) fn with_failing_load(self, key: &str) -> Self {
        self.failing_loads.lock().insert(key.into());
        self
    }

    pub(crate) fn with_failing_unload(self, key: &str) -> Self {
        self.failing_unloads.lock().insert(key.into());
        self
    }

    pub(crate) fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub(crate) fn with_unload_delay(mut self, delay: Duration) -> Self {
        self.unload_delay = delay;
        self
    }

    pub(crate) fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub(crate) fn insert_bundle(&self, key: &str, elements: Vec<ElementRef>) {
        self.bundles.lock().insert(key.into(), elements);
    }

    pub(crate) fn clear_failures(&self) {
        self.failing_loads.lock().clear();
        self.failing_unloads.lock().clear();
    }

    pub(crate) fn load_count(&self, key: &BundleKey) -> usize {
        self.counters.lock().loads.get(key).copied().unwrap_or(0)
    }

    pub(crate) fn unload_count(&self, key: &BundleKey) -> usize {
        self.counters.lock().unloads.get(key).copied().unwrap_or(0)
    }

    /// Highest number of simultaneous `load` calls ever seen for `key`.
    pub(crate) fn max_concurrent_loads(&self, key: &BundleKey) -> usize {
        self.counters.lock().max_loads_in_flight.get(key).copied().unwrap_or(0)
    }

    /// Highest number of simultaneous `load`/`unload` calls for `key`.
    pub(crate) fn max_overlap(&self, key: &BundleKey) -> usize {
        self.counters.lock().max_ops_in_flight.get(key).copied().unwrap_or(0)
    }

    fn enter_op(&self, key: &BundleKey, is_load: bool) {
        let mut counters = self.counters.lock();
        let counters = &mut *counters;

        let ops = counters.ops_in_flight.entry(key.clone()).or_default();
        *ops += 1;
        let max_ops = counters.max_ops_in_flight.entry(key.clone()).or_default();
        *max_ops = (*max_ops).max(*ops);

        if is_load {
            *counters.loads.entry(key.clone()).or_default() += 1;
            let loads = counters.loads_in_flight.entry(key.clone()).or_default();
            *loads += 1;
            let max_loads = counters.max_loads_in_flight.entry(key.clone()).or_default();
            *max_loads = (*max_loads).max(*loads);
        } else {
            *counters.unloads.entry(key.clone()).or_default() += 1;
        }
    }

    fn exit_op(&self, key: &BundleKey, is_load: bool) {
        let mut counters = self.counters.lock();
        if let Some(ops) = counters.ops_in_flight.get_mut(key) {
            *ops -= 1;
        }
        if is_load {
            if let Some(loads) = counters.loads_in_flight.get_mut(key) {
                *loads -= 1;
            }
        }
    }

    async fn pause(delay: Duration) {
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl BundleProvider for ScriptedProvider {
    async fn load(&self, key: &BundleKey) -> Result<BundleContent, ProviderError> {
        self.enter_op(key, true);
        Self::pause(self.load_delay).await;
        self.exit_op(key, true);

        if self.failing_loads.lock().contains(key) {
            return Err(ProviderError::Other(format!("scripted load failure for {}", key)));
        }

        let served_key = self.aliases.lock().get(key).cloned().unwrap_or_else(|| key.clone());
        let elements = self
            .bundles
            .lock()
            .get(&served_key)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(key.clone()))?;

        Ok(BundleContent::new(served_key, elements))
    }

    async fn unload(&self, content: Arc<BundleContent>) -> Result<(), ProviderError> {
        let key = content.key().clone();
        self.enter_op(&key, false);
        Self::pause(self.unload_delay).await;
        self.exit_op(&key, false);

        if self.failing_unloads.lock().contains(&key) {
            return Err(ProviderError::Other(format!("scripted unload failure for {}", key)));
        }
        Ok(())
    }
}

//=== RecordingElement ====================================================

pub(crate) struct RecordingElement {
    id: ElementId,
    animated: bool,
    preset: AnimationPreset,
    animation_time: Duration,
    enters: AtomicUsize,
    exits: AtomicUsize,
    prepares: AtomicUsize,
    populates: AtomicUsize,
    last_context: Mutex<Option<String>>,
    pose: Mutex<Pose>,
}

impl RecordingElement {
    fn build(animated: bool, preset: AnimationPreset, animation_time: Duration) -> Arc<Self> {
        Arc::new(Self {
            id: ElementId::next(),
            animated,
            preset,
            animation_time,
            enters: AtomicUsize::new(0),
            exits: AtomicUsize::new(0),
            prepares: AtomicUsize::new(0),
            populates: AtomicUsize::new(0),
            last_context: Mutex::new(None),
            pose: Mutex::new(Pose::default()),
        })
    }

    /// Fading element whose animations complete on the next poll.
    pub(crate) fn animated() -> Arc<Self> {
        Self::build(true, AnimationPreset::Fade, Duration::ZERO)
    }

    /// Fading element whose animations take `animation_time`.
    pub(crate) fn timed(animation_time: Duration) -> Arc<Self> {
        Self::build(true, AnimationPreset::Fade, animation_time)
    }

    pub(crate) fn with_preset(preset: AnimationPreset) -> Arc<Self> {
        Self::build(true, preset, Duration::ZERO)
    }

    /// Element without the animation capability.
    pub(crate) fn inert() -> Arc<Self> {
        Self::build(false, AnimationPreset::None, Duration::ZERO)
    }

    pub(crate) fn element_id(&self) -> ElementId {
        self.id
    }

    pub(crate) fn enters(&self) -> usize {
        self.enters.load(Ordering::SeqCst)
    }

    pub(crate) fn exits(&self) -> usize {
        self.exits.load(Ordering::SeqCst)
    }

    pub(crate) fn prepares(&self) -> usize {
        self.prepares.load(Ordering::SeqCst)
    }

    pub(crate) fn populates(&self) -> usize {
        self.populates.load(Ordering::SeqCst)
    }

    pub(crate) fn last_context(&self) -> Option<String> {
        self.last_context.lock().clone()
    }

    pub(crate) fn pose(&self) -> Pose {
        *self.pose.lock()
    }

    async fn play(&self) {
        if !self.animation_time.is_zero() {
            tokio::time::sleep(self.animation_time).await;
        }
    }
}

impl UiElement for RecordingElement {
    fn id(&self) -> ElementId {
        self.id
    }

    fn populate(&self, context: &NavigationContext) {
        self.populates.fetch_add(1, Ordering::SeqCst);
        *self.last_context.lock() = context.downcast_ref::<String>().cloned();
    }

    fn as_animated(&self) -> Option<&dyn AnimatedElement> {
        if self.animated {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl AnimatedElement for RecordingElement {
    fn prepare_for_enter(&self) {
        self.prepares.fetch_add(1, Ordering::SeqCst);
        let viewport = Viewport {
            width: 1280.0,
            height: 720.0,
        };
        *self.pose.lock() = self.preset.enter_start_pose(Pose::default(), Some(viewport));
    }

    async fn play_enter(&self) {
        self.play().await;
        *self.pose.lock() = Pose::default();
        self.enters.fetch_add(1, Ordering::SeqCst);
    }

    async fn play_exit(&self) {
        self.play().await;
        self.pose.lock().opacity = 0.0;
        self.exits.fetch_add(1, Ordering::SeqCst);
    }
}

/// Upcasts recording elements for bundle registration.
pub(crate) fn refs(elements: &[Arc<RecordingElement>]) -> Vec<ElementRef> {
    elements
        .iter()
        .map(|element| Arc::clone(element) as ElementRef)
        .collect()
}
