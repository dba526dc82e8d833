mod error;
mod mutations;
pub mod overlap;
mod queries;
mod store;
mod suggest;

pub use error::EngineError;
pub use overlap::{conflicts, overlaps, shares_participant};
pub use store::EventStore;
pub use suggest::{shifted, SuggestMode, SuggestOptions, DEFAULT_MAX_ATTEMPTS};

use tokio::sync::RwLock;

use crate::model::*;

/// How the registry treats `end <= start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntervalPolicy {
    /// Reject with `EngineError::MalformedInterval`.
    #[default]
    Strict,
    /// Store and compare inverted spans with the plain overlap inequality.
    Permissive,
}

impl std::str::FromStr for IntervalPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(IntervalPolicy::Strict),
            "permissive" => Ok(IntervalPolicy::Permissive),
            other => Err(format!("unknown interval policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Gap enforced around every stored event, in minutes.
    pub buffer_minutes: i64,
    pub interval_policy: IntervalPolicy,
    /// Used when a suggestion request leaves parameters unset.
    pub suggest: SuggestOptions,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            buffer_minutes: 0,
            interval_policy: IntervalPolicy::Strict,
            suggest: SuggestOptions::default(),
        }
    }
}

impl RegistryConfig {
    pub fn buffer_ms(&self) -> Ms {
        self.buffer_minutes.max(0) * MINUTE_MS
    }
}

/// Result of a check-and-add or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The candidate was stored.
    Accepted { event: Event },
    /// Every stored event the candidate collides with. Nothing was stored.
    Conflict { conflicts: Vec<Event> },
}

impl CheckOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, CheckOutcome::Conflict { .. })
    }
}

/// The conflict registry of one calendar.
///
/// Every scan-then-mutate sequence runs under the store's write lock, so two
/// overlapping candidates for the same participant can never both be accepted.
pub struct Registry {
    pub(super) config: RegistryConfig,
    pub(super) store: RwLock<EventStore>,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            store: RwLock::new(EventStore::new()),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

/// Collect every stored event `candidate` conflicts with, skipping `exclude`.
fn find_conflicts(
    store: &EventStore,
    candidate: &Candidate,
    buffer: Ms,
    exclude: Option<ulid::Ulid>,
) -> Vec<Event> {
    store
        .reachable(&candidate.span, buffer)
        .filter(|e| Some(e.id) != exclude)
        .filter(|e| conflicts(candidate, e, buffer))
        .cloned()
        .collect()
}
