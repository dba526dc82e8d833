use crate::model::Ms;

pub const MAX_EVENTS_PER_CALENDAR: usize = 100_000;
pub const MAX_PARTICIPANTS_PER_EVENT: usize = 256;
pub const MAX_PARTICIPANT_ID_LEN: usize = 256;

pub const MAX_CALENDARS: usize = 10_000;
pub const MAX_CALENDAR_NAME_LEN: usize = 256;

/// 0001-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = -62_135_596_800_000;
/// 9999-12-31T23:59:59.999Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;
/// One year.
pub const MAX_SPAN_DURATION_MS: Ms = 366 * 24 * 3_600_000;

pub const MAX_SUGGESTIONS: usize = 50;
pub const MAX_SUGGEST_ATTEMPTS: usize = 10_000;
/// One week.
pub const MAX_STEP_MINUTES: i64 = 7 * 24 * 60;
/// One day.
pub const MAX_BUFFER_MINUTES: i64 = 24 * 60;
