//! Transport-neutral request/response shapes for the two public operations.
//!
//! Field names are camelCase and timestamps are ISO-8601 text, so these types
//! can be handed to any JSON transport unchanged. The SQL front end in `wire`
//! builds its candidates through the same helpers.

use serde::{Deserialize, Serialize};

use crate::engine::{CheckOutcome, EngineError, Registry, SuggestOptions};
use crate::model::*;

pub const CONFLICT_MESSAGE: &str = "Conflict found for this user!";
pub const ACCEPTED_MESSAGE: &str = "Event added successfully!";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub participants: Option<ParticipantsInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub conflict: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<EventView>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: String,
    pub start_time: String,
    pub end_time: String,
    pub participants: Vec<String>,
}

impl From<&Event> for EventView {
    fn from(e: &Event) -> Self {
        Self {
            id: e.id.to_string(),
            start_time: format_timestamp(e.span.start),
            end_time: format_timestamp(e.span.end),
            participants: e.participants.iter().map(str::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestRequest {
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub participants: Option<ParticipantsInput>,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub step_minutes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub start_time: String,
    pub end_time: String,
}

impl From<Span> for SlotView {
    fn from(s: Span) -> Self {
        Self {
            start_time: format_timestamp(s.start),
            end_time: format_timestamp(s.end),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestResponse {
    pub suggestions: Vec<SlotView>,
}

pub fn parse_time(text: &str) -> Result<Ms, EngineError> {
    parse_timestamp(text).ok_or_else(|| EngineError::InvalidInput(format!("unparseable timestamp: {text:?}")))
}

pub fn parse_span(start: &str, end: &str) -> Result<Span, EngineError> {
    Ok(Span::new(parse_time(start)?, parse_time(end)?))
}

pub fn participants(input: Option<ParticipantsInput>) -> Result<Participants, EngineError> {
    normalize_participants(input).map_err(EngineError::InvalidInput)
}

pub fn parse_candidate(
    start: &str,
    end: &str,
    input: Option<ParticipantsInput>,
) -> Result<Candidate, EngineError> {
    Ok(Candidate::new(parse_span(start, end)?, participants(input)?))
}

impl From<&CheckOutcome> for CheckResponse {
    fn from(outcome: &CheckOutcome) -> Self {
        match outcome {
            CheckOutcome::Conflict { conflicts } => CheckResponse {
                conflict: true,
                message: CONFLICT_MESSAGE.into(),
                conflicts: Some(conflicts.iter().map(EventView::from).collect()),
                id: None,
            },
            CheckOutcome::Accepted { event } => CheckResponse {
                conflict: false,
                message: ACCEPTED_MESSAGE.into(),
                conflicts: None,
                id: Some(event.id.to_string()),
            },
        }
    }
}

/// Check-and-add. A conflict is a normal response, not an error.
pub async fn check_conflicts(registry: &Registry, req: CheckRequest) -> Result<CheckResponse, EngineError> {
    let candidate = parse_candidate(&req.start_time, &req.end_time, req.participants)?;
    tracing::debug!(
        start = %req.start_time,
        end = %req.end_time,
        participants = %candidate.participants,
        "incoming event"
    );
    let outcome = registry.check_and_maybe_add(candidate).await?;
    Ok(CheckResponse::from(&outcome))
}

/// Alternate slots. Unset parameters fall back to the registry's defaults.
pub async fn suggest_times(registry: &Registry, req: SuggestRequest) -> Result<SuggestResponse, EngineError> {
    let span = parse_span(&req.start_time, &req.end_time)?;
    let who = match req.participants {
        Some(input) => Some(participants(Some(input))?),
        None => None,
    };
    let defaults = registry.config().suggest;
    let opts = SuggestOptions {
        count: req.count.unwrap_or(defaults.count),
        step_minutes: req.step_minutes.unwrap_or(defaults.step_minutes),
        mode: defaults.mode,
    };
    let slots = registry.suggest(span, who.as_ref(), opts).await?;
    tracing::debug!(count = slots.len(), mode = ?opts.mode, "suggested alternate times");
    Ok(SuggestResponse {
        suggestions: slots.into_iter().map(SlotView::from).collect(),
    })
}
