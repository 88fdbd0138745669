//! The generic event handed to calendar hosts.
//!
//! [`EventInput`] is source-agnostic: an adapter fills in the promoted fields
//! (`id`, `title`, `url`, `start`, `end`) and puts everything else into
//! [`ExtendedProps`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::time::EventTime;

/// Free-form properties attached to an event, keyed by property name.
pub type ExtendedProps = BTreeMap<String, Value>;

/// A single event as consumed by a calendar host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInput {
    /// Source identifier of the event (not unique across occurrences).
    pub id: Option<String>,

    /// Display title.
    pub title: Option<String>,

    /// Link to the event, empty when the source has none.
    pub url: String,

    /// When the event starts.
    pub start: EventTime,

    /// When the event ends. `None` lets the host pick a default duration.
    pub end: Option<EventTime>,

    /// Whether the event is a date-only (all-day) event.
    pub all_day: bool,

    /// Every other piece of source data.
    #[serde(default)]
    pub extended_props: ExtendedProps,
}

impl EventInput {
    /// Creates an event starting at `start` with no other data.
    pub fn new(start: EventTime) -> Self {
        Self {
            id: None,
            title: None,
            url: String::new(),
            start,
            end: None,
            all_day: start.is_all_day(),
            extended_props: ExtendedProps::new(),
        }
    }

    /// Builder method to set the identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builder method to set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Builder method to set the URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Builder method to set the end.
    pub fn with_end(mut self, end: EventTime) -> Self {
        self.end = Some(end);
        self
    }

    /// Builder method to set one extended property.
    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extended_props.insert(name.into(), value.into());
        self
    }

    /// Returns the title, or "(No title)" when empty.
    pub fn effective_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("(No title)")
    }

    /// Returns a string extended property.
    pub fn prop_str(&self, name: &str) -> Option<&str> {
        self.extended_props.get(name).and_then(Value::as_str)
    }
}
