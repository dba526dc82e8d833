use ulid::Ulid;

use crate::model::*;

/// Accepted events of one calendar, sorted by `span.start`.
///
/// Not synchronized. The owning `Registry` wraps it in a lock and is the only
/// writer.
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn get(&self, id: &Ulid) -> Option<&Event> {
        self.events.iter().find(|e| e.id == *id)
    }

    /// Insert maintaining sort order by span.start. Equal starts keep arrival order.
    pub fn insert(&mut self, event: Event) {
        let pos = self
            .events
            .partition_point(|e| e.span.start <= event.span.start);
        self.events.insert(pos, event);
    }

    pub fn remove(&mut self, id: &Ulid) -> Option<Event> {
        let pos = self.events.iter().position(|e| e.id == *id)?;
        Some(self.events.remove(pos))
    }

    /// Events that could overlap `query` once widened by `margin`.
    ///
    /// Everything starting at or after `query.end + margin` is skipped; the rest
    /// is returned unfiltered so the caller applies the exact predicate. The
    /// prefix cut never drops a match, inverted spans included.
    pub fn reachable(&self, query: &Span, margin: Ms) -> impl Iterator<Item = &Event> {
        let bound = query.end.saturating_add(margin);
        let right = self.events.partition_point(|e| e.span.start < bound);
        self.events[..right].iter()
    }
}
