//! The event source contract.
//!
//! A host holds a list of [`EventSourceDef`] handlers. For each feed the user
//! registers, the host asks every handler to [`parse_meta`] the raw input; the
//! first handler that claims it is later asked to [`fetch`] events for the
//! visible range.
//!
//! [`parse_meta`]: EventSourceDef::parse_meta
//! [`fetch`]: EventSourceDef::fetch

use std::future::Future;
use std::pin::Pin;

use icsfeed_core::{EventInput, TimeWindow};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SourceResult;

/// A boxed future for async trait methods.
///
/// Boxed so that handlers stay object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Raw feed parameters as registered by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInput {
    /// Location of the feed.
    pub url: Option<String>,
    /// Format tag selecting the handler (e.g. "ics").
    pub format: Option<String>,
    /// Handler-specific parameters (e.g. `headers`).
    #[serde(default)]
    pub extra_params: serde_json::Map<String, serde_json::Value>,
}

impl SourceInput {
    /// Creates an input for the given URL and format tag.
    pub fn new(url: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            format: Some(format.into()),
            extra_params: serde_json::Map::new(),
        }
    }

    /// Builder method to set one extra parameter.
    pub fn with_extra_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra_params.insert(key.into(), value);
        self
    }
}

/// Arguments of one fetch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchArg {
    /// The range the host displays.
    pub range: TimeWindow,
    /// Discard any cached data and fetch again.
    pub is_refetch: bool,
}

impl FetchArg {
    /// Creates a non-forced fetch for `range`.
    pub fn new(range: TimeWindow) -> Self {
        Self {
            range,
            is_refetch: false,
        }
    }

    /// Builder method to force a refetch.
    pub fn with_refetch(mut self, is_refetch: bool) -> Self {
        self.is_refetch = is_refetch;
        self
    }
}

/// What remains of the network response once its body has been read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Final URL after redirects.
    pub url: Url,
    /// Response headers.
    pub headers: HeaderMap,
}

impl FeedResponse {
    /// Returns a header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// The result of a successful fetch.
#[derive(Debug, Clone)]
pub struct FetchSuccess {
    /// Events overlapping the requested range, in source order.
    pub events: Vec<EventInput>,
    /// The response the events were parsed from.
    pub response: FeedResponse,
}

/// A handler for one kind of event source.
///
/// # Example Implementation
///
/// ```ignore
/// impl EventSourceDef for JsonFeedSource {
///     type Meta = JsonFeedMeta;
///
///     fn parse_meta(&self, input: &SourceInput) -> Option<JsonFeedMeta> {
///         (input.format.as_deref() == Some("json")).then(|| /* ... */)
///     }
///
///     fn fetch<'a>(&'a self, meta: &'a JsonFeedMeta, arg: FetchArg)
///         -> BoxFuture<'a, SourceResult<FetchSuccess>> {
///         Box::pin(async move { /* ... */ })
///     }
/// }
/// ```
pub trait EventSourceDef: Send + Sync {
    /// Parsed, immutable feed configuration.
    type Meta: Send + Sync;

    /// Returns the name of this handler (e.g. "ics").
    fn name(&self) -> &str;

    /// Claims `input` if this handler understands it.
    ///
    /// Returning `None` is not an error: another handler may claim the input.
    fn parse_meta(&self, input: &SourceInput) -> Option<Self::Meta>;

    /// Fetches the events of the feed described by `meta` that overlap
    /// `arg.range`.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`](crate::SourceError) if the feed could not be
    /// fetched or parsed. No partial results are returned.
    fn fetch<'a>(
        &'a self,
        meta: &'a Self::Meta,
        arg: FetchArg,
    ) -> BoxFuture<'a, SourceResult<FetchSuccess>>;
}
