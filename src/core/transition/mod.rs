//=========================================================================
// Transition System
//=========================================================================
//
// Enter/exit animation playback for state changes.
//
// Architecture:
//   UiStateManager
//     └─ TransitionOrchestrator
//          ├─ prepare_for_enter(elements, skip)
//          └─ play_transition(elements, direction, skip)
//
//=========================================================================

//=== Module Declarations =================================================

mod orchestrator;

//=== Public API ==========================================================

pub use orchestrator::TransitionOrchestrator;

//=== TransitionDirection =================================================

/// Which animation an element plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionDirection {
    /// The element is being revealed.
    Enter,

    /// The element is being concealed.
    Exit,
}
