use tracing::debug;

use crate::limits::*;
use crate::model::*;

use super::overlap::{overlaps, shares_participant, validate_span};
use super::{EngineError, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestMode {
    /// Return the shifted slots as-is, without looking at the registry.
    Fixed,
    /// Skip shifted slots that would conflict, trying at most `max_attempts` shifts.
    Validated { max_attempts: usize },
}

/// Shifts tried by validated suggestions unless configured otherwise.
pub const DEFAULT_MAX_ATTEMPTS: usize = 48;

impl Default for SuggestMode {
    fn default() -> Self {
        SuggestMode::Validated {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuggestOptions {
    pub count: usize,
    pub step_minutes: i64,
    pub mode: SuggestMode,
}

impl Default for SuggestOptions {
    fn default() -> Self {
        Self {
            count: 3,
            step_minutes: 30,
            mode: SuggestMode::default(),
        }
    }
}

impl SuggestOptions {
    fn validate(&self) -> Result<(), EngineError> {
        if self.count == 0 {
            return Err(EngineError::InvalidInput("suggestion count must be positive".into()));
        }
        if self.count > MAX_SUGGESTIONS {
            return Err(EngineError::LimitExceeded("too many suggestions requested"));
        }
        if self.step_minutes <= 0 {
            return Err(EngineError::InvalidInput("suggestion step must be positive".into()));
        }
        if self.step_minutes > MAX_STEP_MINUTES {
            return Err(EngineError::LimitExceeded("suggestion step too wide"));
        }
        if let SuggestMode::Validated { max_attempts } = self.mode {
            if max_attempts == 0 {
                return Err(EngineError::InvalidInput("max attempts must be positive".into()));
            }
            if max_attempts > MAX_SUGGEST_ATTEMPTS {
                return Err(EngineError::LimitExceeded("too many suggestion attempts"));
            }
        }
        Ok(())
    }
}

/// `count` copies of `span`, the i-th moved forward by `i * step` (i from 1).
pub fn shifted(span: &Span, count: usize, step: Ms) -> Vec<Span> {
    (1..=count as Ms).map(|i| span.shifted(i * step)).collect()
}

impl Registry {
    /// Alternate slots for `span`, same duration, later in time.
    ///
    /// In validated mode a slot is kept only if it would not conflict: with
    /// `participants` given the usual conflict rule applies, without them any
    /// overlap with any stored event disqualifies the slot. May return fewer
    /// than `count` slots once `max_attempts` shifts were tried.
    pub async fn suggest(
        &self,
        span: Span,
        participants: Option<&Participants>,
        opts: SuggestOptions,
    ) -> Result<Vec<Span>, EngineError> {
        validate_span(&span, self.config.interval_policy)?;
        opts.validate()?;
        let step = opts.step_minutes * MINUTE_MS;

        let max_attempts = match opts.mode {
            SuggestMode::Fixed => return Ok(shifted(&span, opts.count, step)),
            SuggestMode::Validated { max_attempts } => max_attempts,
        };

        let buffer = self.config.buffer_ms();
        let guard = self.store.read().await;
        let mut found = Vec::with_capacity(opts.count);
        for i in 1..=max_attempts as Ms {
            let slot = span.shifted(i * step);
            let blocked = guard.reachable(&slot, buffer).any(|e| {
                participants.is_none_or(|p| shares_participant(p, &e.participants))
                    && overlaps(&slot, &e.span.widened(buffer))
            });
            if !blocked {
                found.push(slot);
                if found.len() == opts.count {
                    break;
                }
            }
        }
        if found.len() < opts.count {
            debug!(found = found.len(), wanted = opts.count, max_attempts, "suggestion search exhausted");
        }
        Ok(found)
    }
}
