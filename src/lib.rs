//=========================================================================
// Aetheric UI: Library Root
//
// Stack-based navigation between UI states, with reference-counted
// bundle loading and coordinated enter/exit transitions.
//
// Responsibilities:
// - Expose the navigation facade (`UiStateManager`)
// - Define the capability traits hosts implement (`BundleProvider`,
//   `UiElement`, `AnimatedElement`)
// - Keep loading, scheduling and animation plumbing behind that facade
//
// Typical usage:
// ```no_run
// use aetheric_ui::prelude::*;
//
// async fn open_store(manager: &UiStateManager) -> Result<(), NavigationError> {
//     manager.show("Store", NavigationContext::none(), false).await?;
//     Ok(())
// }
// ```
//
//=========================================================================

//--- Public Modules ------------------------------------------------------
//
// `core` holds every subsystem (bundles, elements, transitions, state
// stack). Most applications only need the re-exports below or the
// prelude.
//
pub mod core;
pub mod prelude;

//--- Public Exports ------------------------------------------------------

pub use crate::core::error::NavigationError;
pub use crate::core::state::{UiStateManager, UiStateManagerBuilder};
