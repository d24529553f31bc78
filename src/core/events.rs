//=========================================================================
// Navigation Events
//=========================================================================
//
// Fan-out feed of navigation lifecycle events.
//
// Architecture:
//   UiStateManager / BundleLoader ── publish() ──> EventBus
//                                                    ├─ Sender → Receiver (subscriber 1)
//                                                    └─ Sender → Receiver (subscriber N)
//
// Channels are bounded. A full subscriber loses the event (with a
// warning); a disconnected one is pruned on the next publish.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::warn;
use parking_lot::Mutex;

//=== Internal Dependencies ===============================================

use crate::core::bundle::BundleKey;
use crate::core::error::{NavigationError, ProviderError};

//=== NavigationEvent =====================================================

/// Lifecycle notifications published while navigating.
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationEvent {
    /// A show request resolved and started loading its bundles.
    StateLoading { name: String },

    /// A state was committed to the stack.
    StateShown { name: String, additive: bool },

    /// A state was popped and its bundles released.
    StateHidden { name: String },

    /// A show request failed; the stack was left untouched.
    NavigationFailed { name: String, error: NavigationError },

    /// A bundle finished loading for the first time.
    BundleLoaded { key: BundleKey },

    /// A bundle's last reference was released and it was unloaded.
    BundleUnloaded { key: BundleKey },

    /// A bundle's last reference was released but unloading failed.
    UnloadFailed { key: BundleKey, cause: ProviderError },
}

//=== EventBus ============================================================

/// Cloneable publisher shared by the manager and its loader.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<NavigationEvent>>>>,
    capacity: usize,
}

impl EventBus {
    /// Creates a bus whose subscriber channels hold `capacity` events.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Event channel capacity must be positive");
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            capacity,
        }
    }

    /// Opens a new subscription. Only events published afterwards arrive.
    pub fn subscribe(&self) -> Receiver<NavigationEvent> {
        let (tx, rx) = bounded(self.capacity);
        self.subscribers.lock().push(tx);
        rx
    }

    /// Delivers `event` to every live subscriber without blocking.
    pub fn publish(&self, event: NavigationEvent) {
        let mut subscribers = self.subscribers.lock();

        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                warn!("Navigation event subscriber is full, dropping {:?}", dropped);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

//=========================================================================
// Tests
//=========================================================================
