//=========================================================================
// UI State Stack
//=========================================================================
//
// Named UI states, their bundle requirements, and the controller that
// stacks them.
//
// Architecture:
//   UiStateManagerBuilder ──build()──> UiStateManager
//                                        ├─ StateRegistry  (name → bundle keys)
//                                        ├─ StateEntity    (one per shown state)
//                                        └─ CommitQueue    (FIFO stack mutations)
//
//=========================================================================

//=== Module Declarations =================================================

mod builder;
mod commit_queue;
mod manager;
mod registry;
mod state_entity;

//=== Public API ==========================================================

pub use builder::{BusyPolicy, UiStateManagerBuilder};
pub use manager::{ManagerPhase, StatePhase, StateSnapshot, UiStateManager};
pub use registry::{RegistryConfig, RegistryTable, StateEntryConfig, StateRegistry};
pub use state_entity::{StateEntity, StateId};
