use tracing::debug;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::overlap::{validate_participants, validate_span};
use super::{find_conflicts, CheckOutcome, EngineError, Registry};

impl Registry {
    /// Store `candidate` unless it conflicts with an event sharing a participant.
    ///
    /// All conflicting events are reported, not just the first. The registry is
    /// only mutated on the accept path.
    pub async fn check_and_maybe_add(&self, candidate: Candidate) -> Result<CheckOutcome, EngineError> {
        validate_span(&candidate.span, self.config.interval_policy)?;
        validate_participants(&candidate.participants)?;

        let mut guard = self.store.write().await;
        let conflicts = find_conflicts(&guard, &candidate, self.config.buffer_ms(), None);
        if !conflicts.is_empty() {
            debug!(
                participants = %candidate.participants,
                conflicts = conflicts.len(),
                "candidate rejected"
            );
            metrics::counter!(crate::observability::CONFLICTS_TOTAL).increment(1);
            return Ok(CheckOutcome::Conflict { conflicts });
        }
        if guard.len() >= MAX_EVENTS_PER_CALENDAR {
            return Err(EngineError::LimitExceeded("too many events in calendar"));
        }

        let event = Event {
            id: Ulid::new(),
            span: candidate.span,
            participants: candidate.participants,
        };
        guard.insert(event.clone());
        debug!(id = %event.id, participants = %event.participants, "event accepted");
        metrics::counter!(crate::observability::EVENTS_ACCEPTED_TOTAL).increment(1);
        metrics::gauge!(crate::observability::EVENTS_STORED).increment(1.0);
        Ok(CheckOutcome::Accepted { event })
    }

    /// Move an existing event to `span`, optionally replacing its participants.
    ///
    /// The event is checked against every other stored event; on conflict the
    /// original stays in place unchanged. The id survives the update.
    pub async fn update(
        &self,
        id: Ulid,
        span: Span,
        participants: Option<Participants>,
    ) -> Result<CheckOutcome, EngineError> {
        validate_span(&span, self.config.interval_policy)?;
        if let Some(p) = &participants {
            validate_participants(p)?;
        }

        let mut guard = self.store.write().await;
        let current = guard.get(&id).ok_or(EngineError::NotFound(id))?;
        let candidate = Candidate::new(span, participants.unwrap_or_else(|| current.participants.clone()));
        let conflicts = find_conflicts(&guard, &candidate, self.config.buffer_ms(), Some(id));
        if !conflicts.is_empty() {
            debug!(%id, conflicts = conflicts.len(), "update rejected");
            metrics::counter!(crate::observability::CONFLICTS_TOTAL).increment(1);
            return Ok(CheckOutcome::Conflict { conflicts });
        }

        guard.remove(&id);
        let event = Event {
            id,
            span: candidate.span,
            participants: candidate.participants,
        };
        guard.insert(event.clone());
        debug!(%id, "event updated");
        Ok(CheckOutcome::Accepted { event })
    }

    pub async fn remove(&self, id: Ulid) -> Result<Event, EngineError> {
        let mut guard = self.store.write().await;
        let event = guard.remove(&id).ok_or(EngineError::NotFound(id))?;
        debug!(%id, "event removed");
        metrics::gauge!(crate::observability::EVENTS_STORED).decrement(1.0);
        Ok(event)
    }
}
