//=========================================================================
// State Entity
//=========================================================================
//
// One navigation target instance: the bundles it acquired and the
// elements it populated from them.
//
// The entity only records what it holds. Acquiring and releasing bundle
// references is the manager's job, so release timing can follow the
// transition animations.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::HashSet;
use std::fmt;

use log::debug;

//=== Internal Dependencies ===============================================

use crate::core::bundle::{BundleContent, BundleKey};
use crate::core::element::{ElementId, ElementRef, NavigationContext};

//=== StateId =============================================================

/// Arena id of a state entity, stable for the entity's whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub(crate) u64);

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "state#{}", self.0)
    }
}

//=== StateEntity =========================================================

/// A named UI state with the bundles and elements it owns.
pub struct StateEntity {
    id: StateId,
    name: String,
    required_bundles: Vec<BundleKey>,
    acquired_bundles: HashSet<BundleKey>,
    active_elements: Vec<ElementRef>,
    element_ids: HashSet<ElementId>,
}

impl StateEntity {
    /// Creates an empty entity for `name` requiring `required_bundles`.
    pub fn new(id: StateId, name: impl Into<String>, required_bundles: Vec<BundleKey>) -> Self {
        Self {
            id,
            name: name.into(),
            required_bundles,
            acquired_bundles: HashSet::new(),
            active_elements: Vec::new(),
            element_ids: HashSet::new(),
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bundle keys from the registry entry, in registry order.
    pub fn required_bundles(&self) -> &[BundleKey] {
        &self.required_bundles
    }

    pub fn has_acquired(&self, key: &BundleKey) -> bool {
        self.acquired_bundles.contains(key)
    }

    /// Keys this entity holds a loader reference for, sorted.
    pub fn acquired_bundles(&self) -> Vec<BundleKey> {
        let mut keys: Vec<BundleKey> = self.acquired_bundles.iter().cloned().collect();
        keys.sort();
        keys
    }

    //--- Loading ----------------------------------------------------------

    /// Records a freshly acquired bundle and populates its elements.
    ///
    /// Every element in `content` receives `context`; elements not yet
    /// active are appended in bundle order. Registering a key that is
    /// already recorded does nothing and returns `false`.
    pub fn register_loaded_bundle(
        &mut self,
        key: &BundleKey,
        content: &BundleContent,
        context: &NavigationContext,
    ) -> bool {
        if !self.acquired_bundles.insert(key.clone()) {
            debug!("State '{}' already holds bundle {}, skipping", self.name, key);
            return false;
        }

        for element in content.elements() {
            element.populate(context);

            if self.element_ids.insert(element.id()) {
                self.active_elements.push(element.clone());
            }
        }

        debug!(
            "State '{}' registered bundle {} ({} active elements)",
            self.name,
            key,
            self.active_elements.len()
        );
        true
    }

    //--- Query API --------------------------------------------------------

    pub fn active_elements(&self) -> &[ElementRef] {
        &self.active_elements
    }

    pub fn element_ids(&self) -> &HashSet<ElementId> {
        &self.element_ids
    }

    pub fn contains_element(&self, id: ElementId) -> bool {
        self.element_ids.contains(&id)
    }

    //--- Teardown ---------------------------------------------------------

    /// Removes and returns the acquired keys so they can be released once.
    pub(crate) fn take_acquired_bundles(&mut self) -> Vec<BundleKey> {
        let mut keys: Vec<BundleKey> = self.acquired_bundles.drain().collect();
        keys.sort();
        keys
    }

    /// Hands out one acquired key for release, smallest first.
    ///
    /// Keys not yet handed out stay owned by the entity, so a release
    /// loop that stops early leaves the rest accounted for.
    pub(crate) fn take_next_acquired(&mut self) -> Option<BundleKey> {
        let key = self.acquired_bundles.iter().min().cloned()?;
        self.acquired_bundles.remove(&key);
        Some(key)
    }

    /// Forgets every bundle and element. Does not release anything.
    pub fn dispose(&mut self) {
        self.acquired_bundles.clear();
        self.active_elements.clear();
        self.element_ids.clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.acquired_bundles.is_empty() && self.active_elements.is_empty()
    }
}

impl fmt::Debug for StateEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateEntity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("acquired_bundles", &self.acquired_bundles)
            .field("active_elements", &self.active_elements.len())
            .finish()
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{refs, RecordingElement};

    fn entity() -> StateEntity {
        StateEntity::new(StateId(1), "Main", vec![BundleKey::from("x")])
    }

    fn active_ids(entity: &StateEntity) -> Vec<ElementId> {
        entity.active_elements().iter().map(|e| e.id()).collect()
    }

    #[test]
    fn register_populates_and_collects_elements() {
        let a = RecordingElement::animated();
        let b = RecordingElement::inert();
        let content = BundleContent::new(BundleKey::from("x"), refs(&[a.clone(), b.clone()]));
        let context = NavigationContext::new(String::from("payload"));

        let mut state = entity();
        assert!(state.register_loaded_bundle(&BundleKey::from("x"), &content, &context));

        assert_eq!(active_ids(&state), vec![a.element_id(), b.element_id()]);
        assert_eq!(a.populates(), 1);
        assert_eq!(b.last_context().as_deref(), Some("payload"));
        assert!(state.has_acquired(&BundleKey::from("x")));
    }

    #[test]
    fn registering_same_key_twice_is_a_no_op() {
        let a = RecordingElement::animated();
        let content = BundleContent::new(BundleKey::from("x"), refs(&[a.clone()]));

        let mut state = entity();
        state.register_loaded_bundle(&BundleKey::from("x"), &content, &NavigationContext::none());
        let once = active_ids(&state);

        assert!(!state.register_loaded_bundle(
            &BundleKey::from("x"),
            &content,
            &NavigationContext::none()
        ));
        assert_eq!(active_ids(&state), once);
        assert_eq!(a.populates(), 1);
    }

    #[test]
    fn elements_shared_between_bundles_appear_once() {
        let shared = RecordingElement::animated();
        let only_y = RecordingElement::animated();
        let x = BundleContent::new(BundleKey::from("x"), refs(&[shared.clone()]));
        let y = BundleContent::new(BundleKey::from("y"), refs(&[shared.clone(), only_y.clone()]));

        let mut state = entity();
        state.register_loaded_bundle(&BundleKey::from("x"), &x, &NavigationContext::none());
        state.register_loaded_bundle(&BundleKey::from("y"), &y, &NavigationContext::none());

        assert_eq!(active_ids(&state), vec![shared.element_id(), only_y.element_id()]);
        assert!(state.contains_element(only_y.element_id()));
    }

    #[test]
    fn dispose_clears_everything() {
        let content = BundleContent::new(BundleKey::from("x"), refs(&[RecordingElement::animated()]));

        let mut state = entity();
        state.register_loaded_bundle(&BundleKey::from("x"), &content, &NavigationContext::none());
        state.dispose();

        assert!(state.is_disposed());
        assert!(state.active_elements().is_empty());
        assert!(state.element_ids().is_empty());
        assert!(state.acquired_bundles().is_empty());
    }

    #[test]
    fn take_acquired_bundles_hands_out_keys_once() {
        let x = BundleContent::new(BundleKey::from("x"), vec![]);
        let y = BundleContent::new(BundleKey::from("y"), vec![]);

        let mut state = entity();
        state.register_loaded_bundle(&BundleKey::from("y"), &y, &NavigationContext::none());
        state.register_loaded_bundle(&BundleKey::from("x"), &x, &NavigationContext::none());

        assert_eq!(
            state.take_acquired_bundles(),
            vec![BundleKey::from("x"), BundleKey::from("y")]
        );
        assert!(state.take_acquired_bundles().is_empty());
    }

    #[test]
    fn take_next_acquired_hands_out_keys_one_at_a_time() {
        let x = BundleContent::new(BundleKey::from("x"), vec![]);
        let y = BundleContent::new(BundleKey::from("y"), vec![]);

        let mut state = entity();
        state.register_loaded_bundle(&BundleKey::from("y"), &y, &NavigationContext::none());
        state.register_loaded_bundle(&BundleKey::from("x"), &x, &NavigationContext::none());

        assert_eq!(state.take_next_acquired(), Some(BundleKey::from("x")));
        assert_eq!(state.acquired_bundles(), vec![BundleKey::from("y")]);
        assert_eq!(state.take_next_acquired(), Some(BundleKey::from("y")));
        assert_eq!(state.take_next_acquired(), None);
    }
}
