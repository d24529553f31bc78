//=========================================================================
// Error Taxonomy
//=========================================================================
//
// Errors raised at the three boundaries of the navigation core.
//
// Layers:
//   BundleProvider ──ProviderError──> BundleLoader ──LoaderError──>
//   UiStateManager ──NavigationError──> caller
//
// Provider and loader errors are Clone: a single-flight load hands the
// same failure to every task that was waiting on it.
//
//=========================================================================

//=== External Dependencies ===============================================

use thiserror::Error;

//=== Internal Dependencies ===============================================

use super::bundle::BundleKey;

//=== ProviderError =======================================================

/// Failure reported by a [`BundleProvider`](super::bundle::BundleProvider).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider has no bundle for this key.
    #[error("bundle {0} not found")]
    NotFound(BundleKey),

    /// The bundle exists but its content could not be used.
    #[error("bundle {key} is malformed: {reason}")]
    Malformed { key: BundleKey, reason: String },

    /// Any other provider-side failure.
    #[error("{0}")]
    Other(String),
}

//=== LoaderError =========================================================

/// Errors produced by the [`BundleLoader`](super::bundle::BundleLoader).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoaderError {
    /// The provider failed to load the bundle. No handle was registered.
    #[error("failed to load bundle {key}: {cause}")]
    LoadFailed { key: BundleKey, cause: ProviderError },

    /// A release for a key that holds no outstanding reference.
    #[error("release of bundle {0} that was never acquired")]
    ReleaseOnUnacquired(BundleKey),

    /// The handle was dropped but the provider failed to unload it.
    #[error("failed to unload bundle {key}: {cause}")]
    UnloadFailed { key: BundleKey, cause: ProviderError },
}

//=== NavigationError =====================================================

/// Errors surfaced by [`UiStateManager`](super::state::UiStateManager).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    /// The registry has no entry for the requested state.
    #[error("unknown UI state '{0}'")]
    UnknownState(String),

    /// A bundle required by the state failed to load; the show was rolled back.
    #[error("failed to load bundle {key}: {cause}")]
    LoadFailed { key: BundleKey, cause: ProviderError },

    /// Another navigation call is pending and the manager rejects instead of queueing.
    #[error("another UI transition is already in progress")]
    AlreadyInTransition,

    /// A state tried to release a bundle it never acquired.
    #[error("release of bundle {0} that was never acquired")]
    ReleaseOnUnacquired(BundleKey),

    /// The provider failed to unload a released bundle.
    ///
    /// Never returned by `hide`; unload failures there are only reported
    /// through the event feed.
    #[error("failed to unload bundle {key}: {cause}")]
    UnloadFailed { key: BundleKey, cause: ProviderError },

    /// The registry configuration could not be used.
    #[error("invalid UI configuration: {0}")]
    InvalidConfig(String),
}

impl From<LoaderError> for NavigationError {
    fn from(err: LoaderError) -> Self {
        match err {
            LoaderError::LoadFailed { key, cause } => Self::LoadFailed { key, cause },
            LoaderError::ReleaseOnUnacquired(key) => Self::ReleaseOnUnacquired(key),
            LoaderError::UnloadFailed { key, cause } => Self::UnloadFailed { key, cause },
        }
    }
}

//=========================================================================
// Tests
//=========================================================================
