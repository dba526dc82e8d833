use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::engine::{Registry, RegistryConfig};
use crate::limits::*;

/// Independent registries, one per calendar.
/// Calendar = database name from the pgwire connection.
pub struct CalendarManager {
    registries: DashMap<String, Arc<Registry>>,
    config: RegistryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    NameTooLong,
    EmptyName,
    TooManyCalendars,
}

impl std::fmt::Display for CalendarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalendarError::NameTooLong => write!(f, "calendar name too long"),
            CalendarError::EmptyName => write!(f, "empty calendar name"),
            CalendarError::TooManyCalendars => write!(f, "too many calendars"),
        }
    }
}

impl std::error::Error for CalendarError {}

/// Name rules shared by registry creation and the startup handshake.
pub fn validate_name(calendar: &str) -> Result<(), CalendarError> {
    if calendar.len() > MAX_CALENDAR_NAME_LEN {
        return Err(CalendarError::NameTooLong);
    }
    if calendar.trim().is_empty() {
        return Err(CalendarError::EmptyName);
    }
    Ok(())
}

impl CalendarManager {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            registries: DashMap::new(),
            config,
        }
    }

    /// Get or lazily create the registry for `calendar`.
    pub fn get_or_create(&self, calendar: &str) -> Result<Arc<Registry>, CalendarError> {
        if let Some(registry) = self.registries.get(calendar) {
            return Ok(registry.value().clone());
        }
        validate_name(calendar)?;
        if self.registries.len() >= MAX_CALENDARS {
            return Err(CalendarError::TooManyCalendars);
        }

        // Two connections racing on a new calendar must end up sharing one registry.
        let registry = match self.registries.entry(calendar.to_string()) {
            Entry::Occupied(e) => e.get().clone(),
            Entry::Vacant(e) => {
                tracing::info!("calendar created: {calendar}");
                e.insert(Arc::new(Registry::new(self.config.clone()))).clone()
            }
        };
        metrics::gauge!(crate::observability::CALENDARS_ACTIVE).set(self.registries.len() as f64);
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.registries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }
}
