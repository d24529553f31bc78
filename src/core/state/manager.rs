//=========================================================================
// UI State Manager
//=========================================================================
//
// Stack of active UI states, with bundle loading and transition
// sequencing for every change.
//
// Architecture:
//   UiStateManager
//     ├─ registry:  name → bundle keys
//     ├─ loader:    single-flight, ref-counted bundles
//     ├─ stack:     arena HashMap<StateId, StateEntity> + order Vec<StateId>
//     ├─ commits:   FIFO gate, one stack mutation at a time
//     └─ events:    NavigationEvent feed
//
// show() flow:
//   resolve ─> load (overlaps other calls) ─> wait for turn ─> shared set
//     ─> prepare_for_enter ─> animate ─> commit stack ─> release popped
//
// hide() flow:
//   wait for turn ─> pop ─> exit animation ─> release ─> dispose
//
// A navigation future dropped part way never leaves anything behind: an
// uncommitted entity leaves the arena, popped entities still get their
// bundles released, and the phase returns to idle.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use log::{debug, error, info, warn};
use parking_lot::Mutex;

//=== Internal Dependencies ===============================================

use super::builder::{BusyPolicy, UiStateManagerBuilder};
use super::commit_queue::{CommitQueue, CommitTicket};
use super::registry::StateRegistry;
use super::state_entity::{StateEntity, StateId};
use crate::core::bundle::{BundleKey, BundleLoader, BundleProvider};
use crate::core::element::{ElementId, ElementRef, NavigationContext};
use crate::core::error::{LoaderError, NavigationError};
use crate::core::events::{EventBus, NavigationEvent};
use crate::core::transition::{TransitionDirection, TransitionOrchestrator};

//=== ManagerPhase ========================================================

/// Coarse state of the manager's transition machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerPhase {
    /// Nothing is loading or animating.
    Idle,

    /// At least one show is acquiring bundles.
    Loading,

    /// A stack change is animating.
    Transitioning,
}

//=== StateSnapshot =======================================================

/// Whether a snapshot describes a committed state or one not yet shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatePhase {
    Loading,
    Active,
}

/// Read-only copy of a state entity at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    pub id: StateId,
    pub name: String,
    pub phase: StatePhase,
    pub elements: Vec<ElementId>,
    pub bundles: Vec<BundleKey>,
}

impl StateSnapshot {
    fn of(entity: &StateEntity, phase: StatePhase) -> Self {
        Self {
            id: entity.id(),
            name: entity.name().to_string(),
            phase,
            elements: entity.active_elements().iter().map(|e| e.id()).collect(),
            bundles: entity.acquired_bundles(),
        }
    }
}

//=== StateStack ==========================================================

/// Arena of live entities plus the committed stack order.
///
/// Entities of shows not yet committed live in the arena and in
/// `pending`, oldest call first, but not in `order`.
#[derive(Default)]
struct StateStack {
    entities: HashMap<StateId, StateEntity>,
    order: Vec<StateId>,
    pending: Vec<StateId>,
    loads_in_progress: usize,
    transitioning: bool,
}

impl StateStack {
    fn top(&self) -> Option<&StateEntity> {
        self.order.last().and_then(|id| self.entities.get(id))
    }

    /// Ids of every element on screen across the committed stack.
    fn visible_element_ids(&self) -> HashSet<ElementId> {
        self.order
            .iter()
            .filter_map(|id| self.entities.get(id))
            .flat_map(|entity| entity.element_ids().iter().copied())
            .collect()
    }

    /// Elements of every committed state, top of the stack first.
    fn stacked_elements(&self) -> Vec<ElementRef> {
        self.order
            .iter()
            .rev()
            .filter_map(|id| self.entities.get(id))
            .flat_map(|entity| entity.active_elements().iter().cloned())
            .collect()
    }

    fn forget_pending(&mut self, id: StateId) {
        self.pending.retain(|pending| *pending != id);
    }
}

//=== PendingShow =========================================================

/// A shown entity between its `show()` call starting and its commit.
///
/// Dropped uncommitted, it takes the entity back out of the arena and
/// releases whatever bundles it had acquired.
struct PendingShow<'a> {
    manager: &'a UiStateManager,
    id: StateId,
    loading: bool,
    settled: bool,
}

impl<'a> PendingShow<'a> {
    fn begin(manager: &'a UiStateManager, entity: StateEntity) -> Self {
        let id = entity.id();
        let mut stack = manager.stack.lock();
        stack.entities.insert(id, entity);
        stack.pending.push(id);
        stack.loads_in_progress += 1;

        Self {
            manager,
            id,
            loading: true,
            settled: false,
        }
    }

    fn finish_loading(&mut self, stack: &mut StateStack) {
        if std::mem::take(&mut self.loading) {
            stack.loads_in_progress = stack.loads_in_progress.saturating_sub(1);
        }
    }

    fn loaded(&mut self) {
        let manager = self.manager;
        self.finish_loading(&mut manager.stack.lock());
    }

    /// The entity is on the stack; nothing is left to undo.
    fn commit(mut self, stack: &mut StateStack) {
        self.finish_loading(stack);
        stack.forget_pending(self.id);
        self.settled = true;
    }

    /// Takes the entity back out of the arena.
    fn withdraw(&mut self) -> Option<StateEntity> {
        self.settled = true;
        let manager = self.manager;
        let mut stack = manager.stack.lock();
        self.finish_loading(&mut stack);
        stack.forget_pending(self.id);
        stack.entities.remove(&self.id)
    }
}

impl Drop for PendingShow<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        if let Some(entity) = self.withdraw() {
            warn!("UI state '{}' ({}) was dropped before it was shown", entity.name(), self.id);
            self.manager.release_detached(entity);
        }
    }
}

//=== TransitionFlag ======================================================

/// Holds the manager in `ManagerPhase::Transitioning` while alive.
struct TransitionFlag<'a>(&'a Mutex<StateStack>);

impl<'a> TransitionFlag<'a> {
    fn raise(stack: &'a Mutex<StateStack>) -> Self {
        stack.lock().transitioning = true;
        Self(stack)
    }
}

impl Drop for TransitionFlag<'_> {
    fn drop(&mut self) {
        self.0.lock().transitioning = false;
    }
}

//=== PoppedStates ========================================================

/// Entities off the stack whose bundles are still held, next first.
///
/// Whatever is left when dropped is released without waiting.
struct PoppedStates<'a> {
    manager: &'a UiStateManager,
    entities: VecDeque<StateEntity>,
}

impl<'a> PoppedStates<'a> {
    fn new(manager: &'a UiStateManager, entities: Vec<StateEntity>) -> Self {
        Self {
            manager,
            entities: entities.into(),
        }
    }
}

impl Drop for PoppedStates<'_> {
    fn drop(&mut self) {
        while let Some(entity) = self.entities.pop_front() {
            warn!("Releasing UI state '{}' after its caller went away", entity.name());
            self.manager.release_detached(entity);
        }
    }
}

//=== Prepared Transition =================================================

/// Everything a show needs to animate, captured at the start of its turn.
struct PlannedShow {
    name: String,
    exclusive: bool,
    entering: Vec<ElementRef>,
    leaving: Vec<ElementRef>,
    shared: HashSet<ElementId>,
}

//=== UiStateManager ======================================================

/// Navigation controller for stacked UI states.
///
/// One instance per UI root; share it behind an `Arc` when several tasks
/// navigate. Calls may overlap: their bundle loads run concurrently, but
/// stack changes are applied one at a time in call order.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use aetheric_ui::prelude::*;
/// # async fn run(provider: Arc<dyn BundleProvider>) -> Result<(), NavigationError> {
/// let registry = RegistryTable::new()
///     .with_state("Main", ["bundle-x"])
///     .with_state("Store", ["bundle-x", "bundle-y"]);
///
/// let manager = UiStateManager::builder(registry, provider).build();
///
/// manager.show("Main", NavigationContext::none(), false).await?;
/// manager.show("Store", NavigationContext::none(), false).await?;
/// assert!(manager.is_top_state("Store"));
///
/// manager.hide().await?;
/// # Ok(())
/// # }
/// ```
pub struct UiStateManager {
    registry: Arc<dyn StateRegistry>,
    loader: BundleLoader,
    orchestrator: TransitionOrchestrator,
    stack: Mutex<StateStack>,
    commits: CommitQueue,
    events: EventBus,
    busy_policy: BusyPolicy,
    next_state_id: AtomicU64,
}

impl UiStateManager {
    //--- Construction -----------------------------------------------------

    /// Starts building a manager over `registry` and `provider`.
    pub fn builder<R>(registry: R, provider: Arc<dyn BundleProvider>) -> UiStateManagerBuilder
    where
        R: StateRegistry + 'static,
    {
        UiStateManagerBuilder::new(registry, provider)
    }

    pub(crate) fn from_parts(
        registry: Arc<dyn StateRegistry>,
        provider: Arc<dyn BundleProvider>,
        events: EventBus,
        busy_policy: BusyPolicy,
    ) -> Self {
        Self {
            registry,
            loader: BundleLoader::with_events(provider, events.clone()),
            orchestrator: TransitionOrchestrator::new(),
            stack: Mutex::new(StateStack::default()),
            commits: CommitQueue::new(),
            events,
            busy_policy,
            next_state_id: AtomicU64::new(1),
        }
    }

    //--- Show -------------------------------------------------------------

    /// Shows the state `name`, loading its bundles first.
    ///
    /// - `additive == false` on a non-empty stack replaces the whole stack.
    ///   Old states animate out while the new one animates in; elements
    ///   visible on both sides are not animated at all.
    /// - Otherwise the state is pushed on top and only animates in.
    ///
    /// `context` is handed unchanged to every element the state populates.
    ///
    /// On error the stack is unchanged and every bundle reference taken by
    /// this call has been released. Dropping the future before it commits
    /// has the same effect, with the releases finishing in the background.
    pub async fn show(
        &self,
        name: &str,
        context: NavigationContext,
        additive: bool,
    ) -> Result<StateId, NavigationError> {
        let bundles = self
            .registry
            .resolve(name)
            .ok_or_else(|| NavigationError::UnknownState(name.to_string()))?;

        let ticket = self.take_ticket()?;
        let id = StateId(self.next_state_id.fetch_add(1, Ordering::Relaxed));
        let mut pending = PendingShow::begin(self, StateEntity::new(id, name, bundles.clone()));

        debug!("Loading UI state '{}' ({}, {} bundles)", name, id, bundles.len());
        self.events.publish(NavigationEvent::StateLoading {
            name: name.to_string(),
        });

        if let Err(err) = self.load_bundles(id, &bundles, &context).await {
            if let Some(entity) = pending.withdraw() {
                debug!("Rolling back UI state '{}' ({})", name, id);
                self.release_popped(PoppedStates::new(self, vec![entity]), false)
                    .await;
            }
            error!("Failed to show UI state '{}': {}", name, err);
            self.events.publish(NavigationEvent::NavigationFailed {
                name: name.to_string(),
                error: err.clone(),
            });
            return Err(err);
        }
        pending.loaded();

        let _turn = ticket.turn().await;
        self.commit_show(pending, additive).await;
        Ok(id)
    }

    /// Acquires every bundle of the entity and populates its elements.
    async fn load_bundles(
        &self,
        id: StateId,
        bundles: &[BundleKey],
        context: &NavigationContext,
    ) -> Result<(), NavigationError> {
        for key in bundles {
            if self.entity_holds(id, key) {
                debug!("{} lists bundle {} more than once, skipping", id, key);
                continue;
            }

            let handle = self.loader.acquire(key).await?;

            let registered = {
                let mut stack = self.stack.lock();
                stack
                    .entities
                    .get_mut(&id)
                    .map(|entity| entity.register_loaded_bundle(key, handle.content(), context))
                    .unwrap_or(false)
            };

            if !registered {
                // The entity already held this key; give back the extra reference.
                self.loader.release(key).await?;
            }
        }

        Ok(())
    }

    fn entity_holds(&self, id: StateId, key: &BundleKey) -> bool {
        self.stack
            .lock()
            .entities
            .get(&id)
            .map(|entity| entity.has_acquired(key))
            .unwrap_or(false)
    }

    async fn commit_show(&self, pending: PendingShow<'_>, additive: bool) {
        let id = pending.id;
        let Some(plan) = self.plan_show(id, additive) else {
            warn!("{} vanished before its transition", id);
            return;
        };

        self.orchestrator.prepare_for_enter(&plan.entering, &plan.shared);
        let _transition = TransitionFlag::raise(&self.stack);

        if plan.exclusive {
            // Old states leave while the new one enters
            futures::join!(
                self.orchestrator
                    .play_transition(&plan.leaving, TransitionDirection::Exit, &plan.shared),
                self.orchestrator
                    .play_transition(&plan.entering, TransitionDirection::Enter, &plan.shared),
            );

            let popped = {
                let mut stack = self.stack.lock();
                let popped_ids = std::mem::take(&mut stack.order);
                stack.order.push(id);
                pending.commit(&mut stack);
                popped_ids
                    .into_iter()
                    .rev()
                    .filter_map(|popped| stack.entities.remove(&popped))
                    .collect::<Vec<_>>()
            };

            info!(
                "Showing UI state '{}' ({} replaced, {} shared elements)",
                plan.name,
                popped.len(),
                plan.shared.len()
            );
            self.announce_shown(&plan.name, additive);

            self.release_popped(PoppedStates::new(self, popped), true).await;
        } else {
            {
                let mut stack = self.stack.lock();
                stack.order.push(id);
                pending.commit(&mut stack);
            }

            info!("Showing UI state '{}' ({} shared elements)", plan.name, plan.shared.len());
            self.announce_shown(&plan.name, additive);

            self.orchestrator
                .play_transition(&plan.entering, TransitionDirection::Enter, &plan.shared)
                .await;
        }
    }

    /// Captures the elements to animate against the stack as it is now.
    fn plan_show(&self, id: StateId, additive: bool) -> Option<PlannedShow> {
        let stack = self.stack.lock();

        let visible_before = stack.visible_element_ids();
        let exclusive = !additive && !stack.order.is_empty();
        let leaving = if exclusive {
            stack.stacked_elements()
        } else {
            Vec::new()
        };

        let entity = stack.entities.get(&id)?;
        let shared: HashSet<ElementId> = entity
            .element_ids()
            .intersection(&visible_before)
            .copied()
            .collect();

        Some(PlannedShow {
            name: entity.name().to_string(),
            exclusive,
            entering: entity.active_elements().to_vec(),
            leaving,
            shared,
        })
    }

    fn announce_shown(&self, name: &str, additive: bool) {
        self.events.publish(NavigationEvent::StateShown {
            name: name.to_string(),
            additive,
        });
    }

    //--- Hide -------------------------------------------------------------

    /// Pops the top state, plays its exit animation, then releases it.
    ///
    /// Returns the popped state's name, or `None` on an empty stack.
    /// Unload failures are logged and published but do not fail the call.
    pub async fn hide(&self) -> Result<Option<String>, NavigationError> {
        let ticket = self.take_ticket()?;
        let _turn = ticket.turn().await;

        let popped = {
            let mut stack = self.stack.lock();
            let Some(id) = stack.order.pop() else {
                debug!("Hide requested on an empty UI stack");
                return Ok(None);
            };
            stack.entities.remove(&id)
        };

        let Some(entity) = popped else {
            return Ok(None);
        };

        let name = entity.name().to_string();
        let popped = PoppedStates::new(self, vec![entity]);
        let _transition = TransitionFlag::raise(&self.stack);

        if let Some(entity) = popped.entities.front() {
            self.orchestrator
                .play_transition(entity.active_elements(), TransitionDirection::Exit, &HashSet::new())
                .await;
        }
        self.release_popped(popped, true).await;

        info!("Hid UI state '{}'", name);
        Ok(Some(name))
    }

    //--- Reset / Teardown -------------------------------------------------

    /// Hides every state, top first, each with its exit animation.
    ///
    /// Returns the number of states removed.
    pub async fn clear(&self) -> Result<usize, NavigationError> {
        self.unload_all(true).await
    }

    /// Removes and releases every state without animating.
    ///
    /// Call before dropping the manager so no bundle stays loaded.
    pub async fn shutdown(&self) -> Result<usize, NavigationError> {
        self.unload_all(false).await
    }

    async fn unload_all(&self, animate: bool) -> Result<usize, NavigationError> {
        let ticket = self.take_ticket()?;
        let _turn = ticket.turn().await;

        let entities = {
            let mut stack = self.stack.lock();
            let ids = std::mem::take(&mut stack.order);
            ids.into_iter()
                .rev()
                .filter_map(|id| stack.entities.remove(&id))
                .collect::<Vec<_>>()
        };

        let count = entities.len();
        let mut popped = PoppedStates::new(self, entities);
        let _transition = (animate && count > 0).then(|| TransitionFlag::raise(&self.stack));

        while let Some(entity) = popped.entities.front_mut() {
            info!("Unloading UI state '{}'", entity.name());

            if animate {
                self.orchestrator
                    .play_transition(entity.active_elements(), TransitionDirection::Exit, &HashSet::new())
                    .await;
            }

            self.release_entity(entity).await;
            if let Some(entity) = popped.entities.pop_front() {
                self.events.publish(NavigationEvent::StateHidden {
                    name: entity.name().to_string(),
                });
            }
        }

        Ok(count)
    }

    //--- Release ----------------------------------------------------------

    /// Releases popped entities in order, optionally announcing each.
    async fn release_popped(&self, mut popped: PoppedStates<'_>, announce: bool) {
        while let Some(entity) = popped.entities.front_mut() {
            self.release_entity(entity).await;

            if let Some(entity) = popped.entities.pop_front() {
                if announce {
                    self.events.publish(NavigationEvent::StateHidden {
                        name: entity.name().to_string(),
                    });
                }
            }
        }
    }

    /// Releases each bundle the entity acquired, exactly once, then disposes it.
    ///
    /// Keys leave the entity one at a time, so an interrupted release
    /// leaves the unreleased ones with it.
    async fn release_entity(&self, entity: &mut StateEntity) {
        while let Some(key) = entity.take_next_acquired() {
            match self.loader.release(&key).await {
                Ok(()) => {}
                Err(LoaderError::UnloadFailed { key, cause }) => {
                    warn!("UI state '{}' released {} but unload failed: {}", entity.name(), key, cause);
                }
                Err(err) => {
                    error!("UI state '{}' could not release {}: {}", entity.name(), key, err);
                }
            }
        }
        entity.dispose();
    }

    /// Releases an entity's bundles without waiting for the unloads.
    fn release_detached(&self, mut entity: StateEntity) {
        for key in entity.take_acquired_bundles() {
            self.loader.release_detached(&key);
        }
        entity.dispose();
    }

    //--- Scheduling -------------------------------------------------------

    fn take_ticket(&self) -> Result<CommitTicket, NavigationError> {
        match self.busy_policy {
            BusyPolicy::Queue => Ok(self.commits.enqueue()),
            BusyPolicy::Reject => self
                .commits
                .enqueue_if_idle()
                .ok_or(NavigationError::AlreadyInTransition),
        }
    }

    //--- Query API --------------------------------------------------------

    /// True if `name` is the committed top of the stack.
    pub fn is_top_state(&self, name: &str) -> bool {
        self.stack
            .lock()
            .top()
            .map(|entity| entity.name() == name)
            .unwrap_or(false)
    }

    /// The state the UI is converging on.
    ///
    /// While shows are pending this is the most recently requested one
    /// (phase `Loading`); otherwise the top of the stack, or `None` when
    /// empty.
    pub fn current_state(&self) -> Option<StateSnapshot> {
        let stack = self.stack.lock();

        let newest_pending = stack
            .pending
            .last()
            .and_then(|id| stack.entities.get(id));
        if let Some(entity) = newest_pending {
            return Some(StateSnapshot::of(entity, StatePhase::Loading));
        }

        stack.top().map(|entity| StateSnapshot::of(entity, StatePhase::Active))
    }

    /// Committed state names, bottom of the stack first.
    pub fn stack_names(&self) -> Vec<String> {
        let stack = self.stack.lock();
        stack
            .order
            .iter()
            .filter_map(|id| stack.entities.get(id))
            .map(|entity| entity.name().to_string())
            .collect()
    }

    pub fn depth(&self) -> usize {
        self.stack.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.lock().order.is_empty()
    }

    pub fn phase(&self) -> ManagerPhase {
        let stack = self.stack.lock();
        if stack.transitioning {
            ManagerPhase::Transitioning
        } else if stack.loads_in_progress > 0 {
            ManagerPhase::Loading
        } else {
            ManagerPhase::Idle
        }
    }

    /// Navigation calls started but not yet committed.
    pub fn pending_calls(&self) -> usize {
        self.commits.pending()
    }

    /// The bundle loader, for reference-count diagnostics.
    pub fn loader(&self) -> &BundleLoader {
        &self.loader
    }

    /// Subscribes to navigation and bundle events.
    pub fn subscribe(&self) -> Receiver<NavigationEvent> {
        self.events.subscribe()
    }
}

//=========================================================================
// Tests
//=========================================================================
