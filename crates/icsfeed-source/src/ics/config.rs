//! ICS feed configuration.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;
use url::Url;

use crate::source::SourceInput;

/// The format tag that selects the ICS handler.
pub const ICS_FORMAT: &str = "ics";

/// Configuration of one ICS feed.
///
/// Immutable once created. Also serves as the feed's identity in the
/// adapter's cache, so two registrations with the same URL and headers share
/// one download.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IcsFeedMeta {
    /// Location of the feed.
    pub url: Url,
    /// Request headers sent with every download, verbatim.
    pub headers: BTreeMap<String, String>,
}

impl IcsFeedMeta {
    /// Creates a configuration for the given URL with no headers.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(url: impl AsRef<str>) -> Result<Self, url::ParseError> {
        Ok(Self {
            url: Url::parse(url.as_ref())?,
            headers: BTreeMap::new(),
        })
    }

    /// Builder method to add a request header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Returns the format tag, always [`ICS_FORMAT`].
    pub fn format(&self) -> &'static str {
        ICS_FORMAT
    }

    /// Claims a raw input if it names a URL and the `ics` format.
    ///
    /// Headers are read from `extra_params["headers"]`.
    pub fn from_input(input: &SourceInput) -> Option<Self> {
        if input.format.as_deref() != Some(ICS_FORMAT) {
            return None;
        }
        let raw_url = input.url.as_deref().filter(|u| !u.trim().is_empty())?;

        let url = match Url::parse(raw_url.trim()) {
            Ok(url) => url,
            Err(e) => {
                warn!(url = %raw_url, error = %e, "Ignoring ICS feed with invalid URL");
                return None;
            }
        };

        Some(Self {
            url,
            headers: headers_from_param(input.extra_params.get("headers")),
        })
    }
}

/// Reads a header mapping from the `headers` extra parameter.
///
/// Strings are taken verbatim, numbers and booleans are stringified, anything
/// else is dropped.
fn headers_from_param(value: Option<&Value>) -> BTreeMap<String, String> {
    let Some(value) = value else {
        return BTreeMap::new();
    };

    let Some(map) = value.as_object() else {
        warn!("Ignoring ICS feed headers: expected an object");
        return BTreeMap::new();
    };

    map.iter()
        .filter_map(|(name, value)| match value {
            Value::String(s) => Some((name.clone(), s.clone())),
            Value::Number(n) => Some((name.clone(), n.to_string())),
            Value::Bool(b) => Some((name.clone(), b.to_string())),
            _ => {
                warn!(header = %name, "Ignoring ICS feed header with non-scalar value");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn claims_ics_input() {
        let input = SourceInput::new("https://example.com/team.ics", "ics").with_extra_param(
            "headers",
            json!({ "Authorization": "Bearer abc", "X-Retry": 3, "X-Debug": true }),
        );

        let meta = IcsFeedMeta::from_input(&input).unwrap();
        assert_eq!(meta.url.as_str(), "https://example.com/team.ics");
        assert_eq!(meta.format(), "ics");
        assert_eq!(meta.headers["Authorization"], "Bearer abc");
        assert_eq!(meta.headers["X-Retry"], "3");
        assert_eq!(meta.headers["X-Debug"], "true");
    }

    #[test]
    fn declines_other_formats() {
        let input = SourceInput::new("https://example.com/feed.json", "json");
        assert!(IcsFeedMeta::from_input(&input).is_none());

        let input = SourceInput::new("https://example.com/team.ics", "ICS");
        assert!(IcsFeedMeta::from_input(&input).is_none());
    }

    #[test]
    fn declines_missing_or_invalid_url() {
        let input = SourceInput {
            format: Some("ics".to_string()),
            ..Default::default()
        };
        assert!(IcsFeedMeta::from_input(&input).is_none());

        let input = SourceInput::new("   ", "ics");
        assert!(IcsFeedMeta::from_input(&input).is_none());

        let input = SourceInput::new("not a url", "ics");
        assert!(IcsFeedMeta::from_input(&input).is_none());
    }

    #[test]
    fn headers_are_optional() {
        let meta = IcsFeedMeta::from_input(&SourceInput::new("https://example.com/a.ics", "ics"))
            .unwrap();
        assert!(meta.headers.is_empty());

        let input = SourceInput::new("https://example.com/a.ics", "ics")
            .with_extra_param("headers", json!(["not", "a", "map"]));
        assert!(IcsFeedMeta::from_input(&input).unwrap().headers.is_empty());
    }

    #[test]
    fn non_scalar_header_values_are_dropped() {
        let input = SourceInput::new("https://example.com/a.ics", "ics")
            .with_extra_param("headers", json!({ "Accept": "text/calendar", "X-List": [1] }));
        let meta = IcsFeedMeta::from_input(&input).unwrap();
        assert_eq!(meta.headers.len(), 1);
        assert_eq!(meta.headers["Accept"], "text/calendar");
    }

    #[test]
    fn identical_configs_are_equal() {
        let a = IcsFeedMeta::new("https://example.com/a.ics")
            .unwrap()
            .with_header("Accept", "text/calendar");
        let b = IcsFeedMeta::new("https://example.com/a.ics")
            .unwrap()
            .with_header("Accept", "text/calendar");
        assert_eq!(a, b);
        assert_ne!(a, IcsFeedMeta::new("https://example.com/a.ics").unwrap());
    }
}
