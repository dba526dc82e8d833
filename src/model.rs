use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, UTC.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;

/// Participant substituted when a candidate names nobody.
pub const DEFAULT_PARTICIPANT: &str = "default";

/// Half-open interval `[start, end)`.
///
/// Construction never rejects an inverted span: the permissive interval policy
/// stores them and evaluates them with the plain overlap inequality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn is_well_formed(&self) -> bool {
        self.start < self.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Same duration, moved `by` milliseconds (negative moves backwards).
    pub fn shifted(&self, by: Ms) -> Span {
        Span::new(self.start.saturating_add(by), self.end.saturating_add(by))
    }

    /// Grow both ends by `margin`.
    pub fn widened(&self, margin: Ms) -> Span {
        Span::new(self.start.saturating_sub(margin), self.end.saturating_add(margin))
    }
}

/// Set of participant ids. Ordered so listings and JSON output are stable.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Participants(BTreeSet<String>);

impl Participants {
    pub fn single(id: impl Into<String>) -> Self {
        Self(BTreeSet::from([id.into()]))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    /// True iff at least one id is in both sets. Exact, case-sensitive match.
    pub fn shares_any(&self, other: &Participants) -> bool {
        let (small, large) = if self.0.len() <= other.0.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.0.iter().any(|p| large.0.contains(p))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Participants {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Participants {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(p)?;
        }
        Ok(())
    }
}

/// Participants as callers send them: one id or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParticipantsInput {
    One(String),
    Many(Vec<String>),
}

/// Coerce caller input into a participant set.
///
/// A single value is wrapped; a list collapses duplicates. Absent input, an
/// empty list or a single empty string becomes `{DEFAULT_PARTICIPANT}`. An
/// empty string inside a list is rejected.
pub fn normalize_participants(input: Option<ParticipantsInput>) -> Result<Participants, String> {
    let ids = match input {
        None => Vec::new(),
        Some(ParticipantsInput::One(id)) if id.is_empty() => Vec::new(),
        Some(ParticipantsInput::One(id)) => vec![id],
        Some(ParticipantsInput::Many(ids)) => ids,
    };
    if ids.iter().any(|id| id.is_empty()) {
        return Err("participant id must not be empty".into());
    }
    if ids.is_empty() {
        return Ok(Participants::single(DEFAULT_PARTICIPANT));
    }
    Ok(ids.into_iter().collect())
}

/// An accepted event. Never mutated in place; updates replace it wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: Ulid,
    pub span: Span,
    pub participants: Participants,
}

/// A proposed event not yet accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub span: Span,
    pub participants: Participants,
}

impl Candidate {
    pub fn new(span: Span, participants: Participants) -> Self {
        Self { span, participants }
    }
}

// ── Timestamps ───────────────────────────────────────────────────

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Minute precision with a numeric offset, which RFC 3339 does not allow.
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M%:z", "%Y-%m-%dT%H:%M%z"];

/// Parse an ISO-8601 timestamp. Values without an offset are read as UTC and
/// a bare date means midnight UTC.
pub fn parse_timestamp(text: &str) -> Option<Ms> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_millis());
    }
    if let Some(dt) = OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(text, fmt).ok())
    {
        return Some(dt.timestamp_millis());
    }
    // A trailing `Z` on a form RFC 3339 rejected, e.g. `2024-01-01T10:00Z`
    let local = text.strip_suffix(['Z', 'z']).unwrap_or(text);
    if let Some(naive) = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(local, fmt).ok())
    {
        return Some(naive.and_utc().timestamp_millis());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Format as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn format_timestamp(ms: Ms) -> String {
    match DateTime::<Utc>::from_timestamp_millis(ms) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => ms.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.is_well_formed());
        assert!(!Span::new(200, 200).is_well_formed());
        assert!(!Span::new(300, 200).is_well_formed());
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn span_shift_and_widen() {
        let s = Span::new(1000, 2000);
        assert_eq!(s.shifted(500), Span::new(1500, 2500));
        assert_eq!(s.shifted(500).duration_ms(), s.duration_ms());
        assert_eq!(s.widened(100), Span::new(900, 2100));
        assert_eq!(s.widened(0), s);
    }

    #[test]
    fn participants_intersection() {
        let a: Participants = ["alice", "bob"].into_iter().collect();
        let b: Participants = ["carol", "bob"].into_iter().collect();
        let c: Participants = ["Alice"].into_iter().collect();
        assert!(a.shares_any(&b));
        assert!(b.shares_any(&a));
        assert!(!a.shares_any(&c)); // case-sensitive
    }

    #[test]
    fn participants_display_sorted() {
        let p: Participants = ["zed", "amy", "amy"].into_iter().collect();
        assert_eq!(p.len(), 2);
        assert_eq!(p.to_string(), "amy,zed");
    }

    #[test]
    fn normalize_single_value_is_wrapped() {
        let p = normalize_participants(Some(ParticipantsInput::One("user1".into()))).unwrap();
        assert_eq!(p, Participants::single("user1"));
    }

    #[test]
    fn normalize_list_collapses_duplicates() {
        let p = normalize_participants(Some(ParticipantsInput::Many(vec![
            "user1".into(),
            "user2".into(),
            "user1".into(),
        ])))
        .unwrap();
        assert_eq!(p.len(), 2);
        assert!(p.contains("user1"));
        assert!(p.contains("user2"));
    }

    #[test]
    fn normalize_absent_or_empty_uses_default() {
        assert_eq!(normalize_participants(None).unwrap(), Participants::single(DEFAULT_PARTICIPANT));
        assert_eq!(
            normalize_participants(Some(ParticipantsInput::Many(vec![]))).unwrap(),
            Participants::single(DEFAULT_PARTICIPANT)
        );
    }

    #[test]
    fn normalize_single_empty_string_uses_default() {
        assert_eq!(
            normalize_participants(Some(ParticipantsInput::One(String::new()))).unwrap(),
            Participants::single(DEFAULT_PARTICIPANT)
        );
    }

    #[test]
    fn normalize_rejects_empty_id_in_list() {
        assert!(normalize_participants(Some(ParticipantsInput::Many(vec!["a".into(), "".into()]))).is_err());
    }

    #[test]
    fn participants_input_json_shapes() {
        let one: ParticipantsInput = serde_json::from_str(r#""user1""#).unwrap();
        assert_eq!(one, ParticipantsInput::One("user1".into()));
        let many: ParticipantsInput = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(many, ParticipantsInput::Many(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn parse_timestamp_forms() {
        let utc = parse_timestamp("2024-01-01T10:00:00Z").unwrap();
        assert_eq!(parse_timestamp("2024-01-01T10:00").unwrap(), utc);
        assert_eq!(parse_timestamp("2024-01-01T10:00:00").unwrap(), utc);
        assert_eq!(parse_timestamp("2024-01-01T10:00:00.000").unwrap(), utc);
        assert_eq!(parse_timestamp("2024-01-01 10:00:00").unwrap(), utc);
        assert_eq!(parse_timestamp("2024-01-01T12:00:00+02:00").unwrap(), utc);
        assert_eq!(utc, 1_704_103_200_000);
    }

    #[test]
    fn parse_timestamp_minute_precision_with_offset() {
        let utc = parse_timestamp("2024-01-01T10:00:00Z").unwrap();
        assert_eq!(parse_timestamp("2024-01-01T10:00Z"), Some(utc));
        assert_eq!(parse_timestamp("2024-01-01T12:00+02:00"), Some(utc));
        assert_eq!(parse_timestamp("2024-01-01T12:00+0200"), Some(utc));
        assert_eq!(parse_timestamp("2024-01-01T05:00-05:00"), Some(utc));
    }

    #[test]
    fn parse_timestamp_bare_date_is_midnight_utc() {
        assert_eq!(parse_timestamp("2024-01-01"), Some(1_704_067_200_000));
        assert_eq!(parse_timestamp("1969-12-31"), Some(-86_400_000));
        assert!(parse_timestamp("2024-02-30").is_none());
    }

    #[test]
    fn parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("tomorrow").is_none());
        assert!(parse_timestamp("2024-13-01T10:00").is_none());
    }

    #[test]
    fn format_timestamp_is_iso_utc_with_millis() {
        let ms = parse_timestamp("2024-01-01T10:30").unwrap();
        assert_eq!(format_timestamp(ms), "2024-01-01T10:30:00.000Z");
        assert_eq!(parse_timestamp(&format_timestamp(ms)), Some(ms));
    }
}
