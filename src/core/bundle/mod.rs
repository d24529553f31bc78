//=========================================================================
// Bundles
//=========================================================================
//
// Loadable groups of UI elements, identified by a stable content key.
//
// Architecture:
//   BundleProvider (external)  ── load(key) / unload(content) ──┐
//                                                               ↓
//   BundleLoader ── single-flight + ref counting per BundleKey ─┘
//     └─ acquire(key) → BundleHandle      release(key)
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

//=== Internal Dependencies ===============================================

use crate::core::element::ElementRef;
use crate::core::error::ProviderError;

//=== Module Declarations =================================================

pub mod loader;

//=== Public API ==========================================================

pub use loader::BundleLoader;

//=== BundleKey ===========================================================

/// Opaque, content-addressed identifier of a bundle.
///
/// Not the human-readable state name: several states may list the same
/// key, and they then share one loaded instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleKey(String);

impl BundleKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BundleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BundleKey {
    fn from(key: &str) -> Self {
        Self(key.to_owned())
    }
}

impl From<String> for BundleKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

//=== BundleContent =======================================================

/// What a provider hands back for a loaded bundle: the elements it holds.
pub struct BundleContent {
    key: BundleKey,
    elements: Vec<ElementRef>,
}

impl BundleContent {
    pub fn new(key: BundleKey, elements: Vec<ElementRef>) -> Self {
        Self { key, elements }
    }

    pub fn key(&self) -> &BundleKey {
        &self.key
    }

    /// Every element-capable instance found in the bundle.
    pub fn elements(&self) -> &[ElementRef] {
        &self.elements
    }
}

impl fmt::Debug for BundleContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleContent")
            .field("key", &self.key)
            .field("elements", &self.elements.len())
            .finish()
    }
}

//=== BundleHandle ========================================================

/// Reference to a loaded bundle returned by [`BundleLoader::acquire`].
///
/// Holding a handle does not keep the bundle alive; the reference taken
/// by `acquire` must be given back with [`BundleLoader::release`].
#[derive(Debug, Clone)]
pub struct BundleHandle {
    content: Arc<BundleContent>,
}

impl BundleHandle {
    pub(crate) fn new(content: Arc<BundleContent>) -> Self {
        Self { content }
    }

    pub fn key(&self) -> &BundleKey {
        self.content.key()
    }

    pub fn content(&self) -> &Arc<BundleContent> {
        &self.content
    }

    /// True when both handles point at the same loaded instance.
    pub fn same_instance(&self, other: &BundleHandle) -> bool {
        Arc::ptr_eq(&self.content, &other.content)
    }
}

//=== BundleProvider Trait ================================================

/// Backend that actually loads and unloads bundle content.
///
/// The loader guarantees at most one `load` per key in flight and never
/// overlaps `load` and `unload` for the same key, so implementations
/// need not be reentrant per key.
#[async_trait]
pub trait BundleProvider: Send + Sync {
    /// Loads the bundle identified by `key`.
    async fn load(&self, key: &BundleKey) -> Result<BundleContent, ProviderError>;

    /// Tears down a bundle whose last reference was released.
    async fn unload(&self, content: Arc<BundleContent>) -> Result<(), ProviderError>;
}
