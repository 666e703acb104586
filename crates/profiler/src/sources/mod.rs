//! Per-capability source clients. Each `fetch_*` wraps one upstream call in the
//! retry loop and never fails: exhaustion yields the capability's degraded default.

pub mod analytics;
pub mod api;
pub mod balance;
pub mod dex;
pub mod holdings;
pub mod nft;
pub mod provider_impls;
pub mod recent;
pub mod retry;
pub mod tokens;

pub use api::ActivityApi;
pub use provider_impls::LiveProviders;
pub use retry::RetryPolicy;

use serde::{Deserialize, Serialize};

/// A concurrent sub-result: the value, or the `{ "error": … }` marker that
/// replaces it when the data is absent or the source gave up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Analysis<T> {
    Unavailable { error: String },
    Available(T),
}

impl<T> Analysis<T> {
    pub fn unavailable(error: impl Into<String>) -> Self {
        Self::Unavailable {
            error: error.into(),
        }
    }

    pub fn available(&self) -> Option<&T> {
        match self {
            Self::Available(v) => Some(v),
            Self::Unavailable { .. } => None,
        }
    }
}
