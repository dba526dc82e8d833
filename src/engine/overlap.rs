use crate::limits::*;
use crate::model::*;

use super::{EngineError, IntervalPolicy};

/// Strict-inequality overlap. Intervals touching at an endpoint do not overlap.
/// Inverted spans get no special case.
pub fn overlaps(a: &Span, b: &Span) -> bool {
    a.overlaps(b)
}

pub fn shares_participant(a: &Participants, b: &Participants) -> bool {
    a.shares_any(b)
}

/// A candidate conflicts with a stored event when they share a participant and
/// the candidate overlaps the stored interval widened by `buffer` on both ends.
pub fn conflicts(candidate: &Candidate, stored: &Event, buffer: Ms) -> bool {
    shares_participant(&candidate.participants, &stored.participants)
        && overlaps(&candidate.span, &stored.span.widened(buffer))
}

pub(crate) fn validate_span(span: &Span, policy: IntervalPolicy) -> Result<(), EngineError> {
    if policy == IntervalPolicy::Strict && !span.is_well_formed() {
        return Err(EngineError::MalformedInterval {
            start: span.start,
            end: span.end,
        });
    }
    for t in [span.start, span.end] {
        if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&t) {
            return Err(EngineError::LimitExceeded("timestamp out of range"));
        }
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("event too long"));
    }
    Ok(())
}

pub(crate) fn validate_participants(participants: &Participants) -> Result<(), EngineError> {
    if participants.is_empty() {
        return Err(EngineError::InvalidInput("participant set is empty".into()));
    }
    if participants.len() > MAX_PARTICIPANTS_PER_EVENT {
        return Err(EngineError::LimitExceeded("too many participants"));
    }
    if participants.iter().any(|p| p.len() > MAX_PARTICIPANT_ID_LEN) {
        return Err(EngineError::LimitExceeded("participant id too long"));
    }
    Ok(())
}
