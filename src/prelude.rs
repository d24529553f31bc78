//=========================================================================
// Prelude
//=========================================================================
//
// Convenience module that re-exports commonly used types and traits.
//
// Usage:
//   use aetheric_ui::prelude::*;
//
//=========================================================================

//=== Public API ==========================================================

// Navigation
pub use crate::core::state::{
    BusyPolicy, ManagerPhase, RegistryConfig, RegistryTable, StatePhase, StateRegistry, StateSnapshot,
    UiStateManager, UiStateManagerBuilder,
};

// Bundles
pub use crate::core::bundle::{BundleContent, BundleHandle, BundleKey, BundleLoader, BundleProvider};

// Elements
pub use crate::core::element::{
    AnimatedElement, AnimationPreset, ElementId, ElementRef, NavigationContext, Pose, UiElement, Viewport,
};

// Events and errors
pub use crate::core::error::{LoaderError, NavigationError, ProviderError};
pub use crate::core::events::{EventBus, NavigationEvent};

// Async trait support for implementors
pub use async_trait::async_trait;
