//=========================================================================
// UI Elements
//=========================================================================
//
// Capability interface between the navigation core and the visual
// elements a bundle contains.
//
// Architecture:
//   BundleContent
//     └─ elements: Vec<ElementRef>      (Arc<dyn UiElement>)
//          ├─ id()                      identity for skip-sets / dedup
//          ├─ populate(context)         state payload from show()
//          └─ as_animated()             Option<&dyn AnimatedElement>
//                ├─ prepare_for_enter() synchronous pre-pass
//                ├─ play_enter()        async
//                └─ play_exit()         async
//
// Elements without the animation capability are static: the orchestrator
// skips them silently.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

//=== Module Declarations =================================================

pub mod preset;

//=== Public API ==========================================================

pub use preset::{AnimationPreset, Pose, Viewport};

/// Shared handle to an element living inside a loaded bundle.
pub type ElementRef = Arc<dyn UiElement>;

//=== ElementId ===========================================================

/// Stable identity of an element instance.
///
/// Two `ElementRef`s with the same id are the same on-screen element,
/// even when reached through different states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

impl ElementId {
    /// Allocates a process-unique id for a freshly instantiated element.
    pub fn next() -> Self {
        Self(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//=== NavigationContext ===================================================

/// Opaque payload handed from `show()` to every populated element.
///
/// The core never inspects it; elements downcast to the type their
/// state expects.
#[derive(Clone, Default)]
pub struct NavigationContext(Option<Arc<dyn Any + Send + Sync>>);

impl NavigationContext {
    /// A context carrying no payload.
    pub fn none() -> Self {
        Self(None)
    }

    /// Wraps `value` as the payload.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Returns the payload if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|payload| payload.downcast_ref::<T>())
    }
}

impl fmt::Debug for NavigationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("NavigationContext(<payload>)"),
            None => f.write_str("NavigationContext(None)"),
        }
    }
}

//=== UiElement Trait =====================================================

/// A populated unit of UI owned by a state.
///
/// Only `id()` is required.
///
/// ```rust
/// # use aetheric_ui::prelude::*;
/// struct Banner {
///     id: ElementId,
/// }
///
/// impl UiElement for Banner {
///     fn id(&self) -> ElementId {
///         self.id
///     }
/// }
/// ```
pub trait UiElement: Send + Sync {
    /// Identity used for skip-sets and duplicate suppression.
    fn id(&self) -> ElementId;

    /// Receives the context passed to `show()` when its state loads.
    ///
    /// Elements use interior mutability to store what they need.
    fn populate(&self, _context: &NavigationContext) {}

    /// Animation capability, if the element has one.
    fn as_animated(&self) -> Option<&dyn AnimatedElement> {
        None
    }
}

//=== AnimatedElement Trait ===============================================

/// Enter/exit animation hooks invoked by the transition orchestrator.
#[async_trait]
pub trait AnimatedElement: Send + Sync {
    /// Applies the enter preset's starting pose before the first frame
    /// is shown. Must not suspend.
    fn prepare_for_enter(&self) {}

    /// Plays the enter animation; resolves when it has finished.
    async fn play_enter(&self);

    /// Plays the exit animation; resolves when it has finished.
    async fn play_exit(&self);
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Static(ElementId);

    impl UiElement for Static {
        fn id(&self) -> ElementId {
            self.0
        }
    }

    #[test]
    fn element_ids_are_unique() {
        let a = ElementId::next();
        let b = ElementId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn static_elements_have_no_animation_capability() {
        let element: ElementRef = Arc::new(Static(ElementId::next()));
        assert!(element.as_animated().is_none());
    }

    #[test]
    fn context_downcasts_to_payload_type() {
        #[derive(Debug, PartialEq)]
        struct Profile {
            user: &'static str,
        }

        let context = NavigationContext::new(Profile { user: "ada" });
        assert_eq!(context.downcast_ref::<Profile>(), Some(&Profile { user: "ada" }));
        assert!(context.downcast_ref::<String>().is_none());
        assert!(!context.is_empty());
    }

    #[test]
    fn empty_context_yields_nothing() {
        let context = NavigationContext::none();
        assert!(context.is_empty());
        assert!(context.downcast_ref::<u32>().is_none());
    }
}
