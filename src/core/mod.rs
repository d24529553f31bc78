//=========================================================================
// Core Systems
//=========================================================================
//
// Everything behind the navigation facade.
//
// Layout:
//   element     UiElement / AnimatedElement capabilities, enter presets
//   bundle      BundleKey, BundleProvider, ref-counted BundleLoader
//   transition  concurrent enter/exit playback with skip-sets
//   state       registry, StateEntity, UiStateManager
//   events      NavigationEvent feed
//   error       error types for every layer
//
//=========================================================================

pub mod bundle;
pub mod element;
pub mod error;
pub mod events;
pub mod state;
pub mod transition;

#[cfg(test)]
pub(crate) mod test_support;
