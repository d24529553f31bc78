//=========================================================================
// UiStateManager Builder
//=========================================================================
//
//   UiStateManagerBuilder  ──build()──>  UiStateManager
//         │
//         ├─ with_event_capacity()
//         └─ with_busy_policy()
//
//=========================================================================

//=== External Dependencies ===============================================

use std::sync::Arc;

use log::info;

//=== Internal Dependencies ===============================================

use super::manager::UiStateManager;
use super::registry::StateRegistry;
use crate::core::bundle::BundleProvider;
use crate::core::events::EventBus;

//=== BusyPolicy ==========================================================

/// What a navigation call does while earlier calls are still in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BusyPolicy {
    /// Wait behind earlier calls and commit in call order.
    #[default]
    Queue,

    /// Fail immediately with `NavigationError::AlreadyInTransition`.
    Reject,
}

//=== UiStateManagerBuilder ===============================================

/// Builder for configuring and constructing a [`UiStateManager`].
///
/// # Default Values
///
/// - **Event capacity**: 64 events per subscriber
/// - **Busy policy**: [`BusyPolicy::Queue`]
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use aetheric_ui::prelude::*;
/// # fn build(provider: Arc<dyn BundleProvider>) -> Result<(), NavigationError> {
/// let registry = RegistryTable::from_json(
///     r#"{ "entries": [ { "state_key": "Main", "bundles": ["hud"] } ] }"#,
/// )?;
///
/// let manager = UiStateManagerBuilder::new(registry, provider)
///     .with_event_capacity(256)
///     .with_busy_policy(BusyPolicy::Reject)
///     .build();
/// # Ok(())
/// # }
/// ```
pub struct UiStateManagerBuilder {
    registry: Arc<dyn StateRegistry>,
    provider: Arc<dyn BundleProvider>,
    event_capacity: usize,
    busy_policy: BusyPolicy,
}

impl UiStateManagerBuilder {
    /// Creates a new builder with default settings.
    pub fn new<R>(registry: R, provider: Arc<dyn BundleProvider>) -> Self
    where
        R: StateRegistry + 'static,
    {
        Self::with_shared_registry(Arc::new(registry), provider)
    }

    /// Like [`new`](Self::new), for a registry that is shared elsewhere.
    pub fn with_shared_registry(registry: Arc<dyn StateRegistry>, provider: Arc<dyn BundleProvider>) -> Self {
        Self {
            registry,
            provider,
            event_capacity: 64,
            busy_policy: BusyPolicy::Queue,
        }
    }

    /// Sets the per-subscriber buffer of the navigation event feed.
    ///
    /// A subscriber that falls this far behind misses newer events.
    ///
    /// Default: 64
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "Event channel capacity must be positive");
        self.event_capacity = capacity;
        self
    }

    /// Sets how overlapping navigation calls are handled.
    ///
    /// Default: [`BusyPolicy::Queue`]
    pub fn with_busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.busy_policy = policy;
        self
    }

    /// Builds the manager with an empty stack.
    pub fn build(self) -> UiStateManager {
        info!(
            "Building UI state manager (events: {}, policy: {:?})",
            self.event_capacity, self.busy_policy
        );

        UiStateManager::from_parts(
            self.registry,
            self.provider,
            EventBus::new(self.event_capacity),
            self.busy_policy,
        )
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::RegistryTable;
    use crate::core::test_support::ScriptedProvider;

    fn provider() -> Arc<dyn BundleProvider> {
        ScriptedProvider::new().into_arc()
    }

    #[test]
    fn defaults_queue_overlapping_calls() {
        let builder = UiStateManagerBuilder::new(RegistryTable::new(), provider());
        assert_eq!(builder.busy_policy, BusyPolicy::Queue);
        assert_eq!(builder.event_capacity, 64);

        let manager = builder.build();
        assert!(manager.is_empty());
        assert!(manager.current_state().is_none());
    }

    #[test]
    fn options_are_applied() {
        let builder = UiStateManagerBuilder::new(RegistryTable::new(), provider())
            .with_event_capacity(8)
            .with_busy_policy(BusyPolicy::Reject);

        assert_eq!(builder.event_capacity, 8);
        assert_eq!(builder.busy_policy, BusyPolicy::Reject);
    }

    #[test]
    #[should_panic(expected = "Event channel capacity must be positive")]
    fn zero_event_capacity_panics() {
        let _ = UiStateManagerBuilder::new(RegistryTable::new(), provider()).with_event_capacity(0);
    }

    #[test]
    fn shared_registry_is_used_as_is() {
        let registry: Arc<dyn StateRegistry> = Arc::new(RegistryTable::new().with_state("Main", ["x"]));
        let _manager = UiStateManagerBuilder::with_shared_registry(Arc::clone(&registry), provider()).build();

        assert_eq!(Arc::strong_count(&registry), 2);
    }
}
