//=========================================================================
// Transition Orchestrator
//=========================================================================
//
// Plays enter/exit animations for a set of elements.
//
// Flow:
//   prepare_for_enter()  sync pre-pass, before anything is shown
//   play_transition()    fan-out: one animation per element
//                        fan-in:  resolves when all have finished
//
// Skipped: duplicates (by id), ids in the skip-set, and elements
// without the animation capability.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::HashSet;

use futures::future::join_all;
use log::debug;

//=== Internal Dependencies ===============================================

use super::TransitionDirection;
use crate::core::element::{AnimatedElement, ElementId, ElementRef};

//=== TransitionOrchestrator ==============================================

/// Runs element animations concurrently and waits for all of them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransitionOrchestrator;

impl TransitionOrchestrator {
    pub fn new() -> Self {
        Self
    }

    /// Puts every non-skipped animated element into its enter start pose.
    ///
    /// Returns the number of elements prepared.
    pub fn prepare_for_enter(&self, elements: &[ElementRef], skip: &HashSet<ElementId>) -> usize {
        let targets = Self::animation_targets(elements, skip);
        for target in &targets {
            target.prepare_for_enter();
        }
        targets.len()
    }

    /// Plays `direction` on every non-skipped animated element at once.
    ///
    /// Resolves after the slowest animation. Returns the number played.
    pub async fn play_transition(
        &self,
        elements: &[ElementRef],
        direction: TransitionDirection,
        skip: &HashSet<ElementId>,
    ) -> usize {
        let targets = Self::animation_targets(elements, skip);
        if targets.is_empty() {
            return 0;
        }

        debug!("Playing {:?} on {} elements ({} skipped)", direction, targets.len(), skip.len());

        let count = targets.len();
        join_all(targets.into_iter().map(|target| async move {
            match direction {
                TransitionDirection::Enter => target.play_enter().await,
                TransitionDirection::Exit => target.play_exit().await,
            }
        }))
        .await;

        count
    }

    fn animation_targets<'a>(
        elements: &'a [ElementRef],
        skip: &HashSet<ElementId>,
    ) -> Vec<&'a dyn AnimatedElement> {
        let mut visited = HashSet::with_capacity(elements.len());

        elements
            .iter()
            .filter(|element| visited.insert(element.id()))
            .filter(|element| !skip.contains(&element.id()))
            .filter_map(|element| element.as_animated())
            .collect()
    }
}

//=========================================================================
// Tests
//=========================================================================
