//! The ICS event source.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono_tz::Tz;
use futures_util::future::{FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::SourceResult;
use crate::source::{BoxFuture, EventSourceDef, FeedResponse, FetchArg, FetchSuccess, SourceInput};

use super::config::{ICS_FORMAT, IcsFeedMeta};
use super::convert::expand_events;
use super::expander::{ExpanderOptions, IcalExpander};
use super::transport::{FeedTransport, HttpTransport, HttpTransportConfig};

/// A parsed feed together with the response it came from.
#[derive(Debug)]
pub struct LoadedFeed {
    /// The parsed feed.
    pub expander: IcalExpander,
    /// The response the feed was read from.
    pub response: FeedResponse,
}

type SharedLoad = Shared<BoxFuture<'static, SourceResult<Arc<LoadedFeed>>>>;

/// Per-feed cache entry.
struct FeedState {
    /// Distinguishes this load from the ones that replace it.
    generation: u64,
    load: SharedLoad,
}

/// Event source for ICS feeds.
///
/// Each feed is downloaded and parsed at most once per refetch cycle: every
/// fetch issued while a download is pending awaits that same download, and
/// later fetches reuse the parsed feed until a refetch is forced or the load
/// fails.
pub struct IcsEventSource {
    transport: Arc<dyn FeedTransport>,
    /// Zone for floating times and unknown TZIDs.
    floating_zone: Tz,
    max_iterations: u16,
    feeds: Mutex<HashMap<IcsFeedMeta, FeedState>>,
    next_generation: AtomicU64,
}

impl IcsEventSource {
    /// Creates a source that downloads over HTTP with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> SourceResult<Self> {
        Self::with_http_config(&HttpTransportConfig::default())
    }

    /// Creates a source that downloads over HTTP with the given settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_http_config(config: &HttpTransportConfig) -> SourceResult<Self> {
        Ok(Self::with_transport(Arc::new(HttpTransport::new(config)?)))
    }

    /// Creates a source on top of a custom transport.
    pub fn with_transport(transport: Arc<dyn FeedTransport>) -> Self {
        Self {
            transport,
            floating_zone: Tz::UTC,
            max_iterations: ExpanderOptions::DEFAULT_MAX_ITERATIONS,
            feeds: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Sets the zone used for floating times and unknown TZIDs.
    pub fn with_floating_zone(mut self, zone: Tz) -> Self {
        self.floating_zone = zone;
        self
    }

    /// Sets the cap on rule-generated dates per series.
    pub fn with_max_iterations(mut self, max: u16) -> Self {
        self.max_iterations = max;
        self
    }

    /// Drops the cached state of a feed. Returns whether there was any.
    pub async fn invalidate(&self, meta: &IcsFeedMeta) -> bool {
        let removed = self.feeds.lock().await.remove(meta).is_some();
        if removed {
            debug!(url = %meta.url, "Invalidated cached feed");
        }
        removed
    }

    /// Number of feeds with cached or pending state.
    pub async fn cached_feeds(&self) -> usize {
        self.feeds.lock().await.len()
    }

    /// The response of a feed's completed, successful load.
    pub async fn last_response(&self, meta: &IcsFeedMeta) -> Option<FeedResponse> {
        let feeds = self.feeds.lock().await;
        match feeds.get(meta)?.load.peek()? {
            Ok(loaded) => Some(loaded.response.clone()),
            Err(_) => None,
        }
    }

    /// Returns the load for `meta`, starting one when there is none or a
    /// refetch is forced.
    async fn load_for(&self, meta: &IcsFeedMeta, force: bool) -> (u64, SharedLoad) {
        let mut feeds = self.feeds.lock().await;

        if !force {
            if let Some(state) = feeds.get(meta) {
                debug!(url = %meta.url, generation = state.generation, "Reusing feed load");
                return (state.generation, state.load.clone());
            }
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let load = self.start_load(meta.clone());
        debug!(url = %meta.url, generation, refetch = force, "Starting feed load");

        feeds.insert(
            meta.clone(),
            FeedState {
                generation,
                load: load.clone(),
            },
        );
        (generation, load)
    }

    /// Builds the shared download-and-parse computation. Nothing happens until
    /// it is first polled.
    fn start_load(&self, meta: IcsFeedMeta) -> SharedLoad {
        let transport = Arc::clone(&self.transport);
        let options = ExpanderOptions::default()
            .with_skip_invalid_dates(true)
            .with_max_iterations(self.max_iterations)
            .with_floating_zone(self.floating_zone);

        async move {
            let body = transport.get(&meta.url, &meta.headers).await?;
            let expander = IcalExpander::new(&body.text, options)?;
            info!(
                url = %meta.url,
                singles = expander.single_count(),
                series = expander.series_count(),
                "Loaded feed"
            );
            Ok(Arc::new(LoadedFeed {
                expander,
                response: body.response,
            }))
        }
        .boxed()
        .shared()
    }

    /// Removes a failed load, unless it has been replaced already.
    async fn evict(&self, meta: &IcsFeedMeta, generation: u64) {
        let mut feeds = self.feeds.lock().await;
        if feeds.get(meta).is_some_and(|s| s.generation == generation) {
            feeds.remove(meta);
            debug!(url = %meta.url, generation, "Evicted failed feed load");
        }
    }
}

impl EventSourceDef for IcsEventSource {
    type Meta = IcsFeedMeta;

    fn name(&self) -> &str {
        ICS_FORMAT
    }

    fn parse_meta(&self, input: &SourceInput) -> Option<IcsFeedMeta> {
        IcsFeedMeta::from_input(input)
    }

    fn fetch<'a>(
        &'a self,
        meta: &'a IcsFeedMeta,
        arg: FetchArg,
    ) -> BoxFuture<'a, SourceResult<FetchSuccess>> {
        Box::pin(async move {
            let (generation, load) = self.load_for(meta, arg.is_refetch).await;

            let loaded = match load.await {
                Ok(loaded) => loaded,
                Err(e) => {
                    warn!(url = %meta.url, error = %e, "Failed to load feed");
                    self.evict(meta, generation).await;
                    return Err(e.with_source_name(ICS_FORMAT));
                }
            };

            let events = expand_events(&loaded.expander, &arg.range, self.floating_zone);
            debug!(
                url = %meta.url,
                start = %arg.range.start,
                end = %arg.range.end,
                count = events.len(),
                "Expanded feed"
            );

            Ok(FetchSuccess {
                events,
                response: loaded.response.clone(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;

    use chrono::{TimeZone, Utc};
    use icsfeed_core::TimeWindow;
    use reqwest::StatusCode;
    use reqwest::header::HeaderMap;
    use tokio::sync::Semaphore;
    use url::Url;

    use crate::error::{SourceError, SourceErrorCode};
    use crate::ics::transport::FeedBody;

    const FEED: &str = "BEGIN:VCALENDAR\r\n\
                        VERSION:2.0\r\n\
                        PRODID:-//Test//Test//EN\r\n\
                        BEGIN:VEVENT\r\n\
                        UID:review@example.com\r\n\
                        DTSTART:20250205T100000Z\r\n\
                        DTEND:20250205T110000Z\r\n\
                        SUMMARY:Review\r\n\
                        END:VEVENT\r\n\
                        END:VCALENDAR";

    /// Transport that counts requests, optionally holds them until released,
    /// and fails the first `failures` of them. Request `n` is served
    /// `bodies[n]`, the last body once they run out.
    struct FakeTransport {
        calls: AtomicUsize,
        gate: Option<Semaphore>,
        failures: usize,
        bodies: Vec<String>,
    }

    impl FakeTransport {
        fn new(body: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                gate: None,
                failures: 0,
                bodies: vec![body.to_string()],
            }
        }

        fn then(mut self, body: &str) -> Self {
            self.bodies.push(body.to_string());
            self
        }

        fn gated(mut self) -> Self {
            self.gate = Some(Semaphore::new(0));
            self
        }

        fn failing(mut self, failures: usize) -> Self {
            self.failures = failures;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn release(&self) {
            if let Some(gate) = &self.gate {
                gate.add_permits(16);
            }
        }
    }

    impl FeedTransport for FakeTransport {
        fn get<'a>(
            &'a self,
            url: &'a Url,
            _headers: &'a BTreeMap<String, String>,
        ) -> BoxFuture<'a, SourceResult<FeedBody>> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                if let Some(gate) = &self.gate {
                    let _permit = gate.acquire().await.unwrap();
                }
                if call < self.failures {
                    return Err(SourceError::server("Server error (503 Service Unavailable): "));
                }
                Ok(FeedBody {
                    response: FeedResponse {
                        status: StatusCode::OK,
                        url: url.clone(),
                        headers: HeaderMap::new(),
                    },
                    text: self.bodies[call.min(self.bodies.len() - 1)].clone(),
                })
            })
        }
    }

    fn meta() -> IcsFeedMeta {
        IcsFeedMeta::new("https://example.com/team.ics").unwrap()
    }

    fn arg() -> FetchArg {
        FetchArg::new(TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 2, 3, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 2, 10, 0, 0, 0).unwrap(),
        ))
    }

    #[test]
    fn parse_meta_claims_ics_inputs() {
        let source = IcsEventSource::with_transport(Arc::new(FakeTransport::new(FEED)));
        assert_eq!(source.name(), "ics");
        assert!(
            source
                .parse_meta(&SourceInput::new("https://example.com/a.ics", "ics"))
                .is_some()
        );
        assert!(
            source
                .parse_meta(&SourceInput::new("https://example.com/a.json", "json"))
                .is_none()
        );
    }

    #[tokio::test]
    async fn fetch_returns_events_and_response() {
        let source = IcsEventSource::with_transport(Arc::new(FakeTransport::new(FEED)));
        let success = source.fetch(&meta(), arg()).await.unwrap();

        assert_eq!(success.events.len(), 1);
        assert_eq!(success.events[0].title.as_deref(), Some("Review"));
        assert_eq!(success.response.status, StatusCode::OK);
        assert_eq!(success.response.url.as_str(), "https://example.com/team.ics");
        assert_eq!(
            source.last_response(&meta()).await.map(|r| r.status),
            Some(StatusCode::OK)
        );
    }

    #[tokio::test]
    async fn concurrent_fetches_share_one_request() {
        let transport = Arc::new(FakeTransport::new(FEED).gated());
        let source = IcsEventSource::with_transport(transport.clone());
        let meta = meta();

        let release = async {
            // Let both fetches reach the pending download first.
            tokio::task::yield_now().await;
            assert_eq!(transport.calls(), 1);
            transport.release();
        };
        let (first, second, ()) =
            tokio::join!(source.fetch(&meta, arg()), source.fetch(&meta, arg()), release);

        let first = first.unwrap();
        let second = second.unwrap();
        assert_eq!(first.events, second.events);
        assert_eq!(transport.calls(), 1);
        assert_eq!(source.cached_feeds().await, 1);
    }

    #[tokio::test]
    async fn resolved_feed_is_reused() {
        let transport = Arc::new(FakeTransport::new(FEED));
        let source = IcsEventSource::with_transport(transport.clone());

        source.fetch(&meta(), arg()).await.unwrap();
        source.fetch(&meta(), arg()).await.unwrap();
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn refetch_replaces_the_parsed_feed() {
        let updated = FEED.replace("SUMMARY:Review", "SUMMARY:Review (moved)");
        let transport = Arc::new(FakeTransport::new(FEED).then(&updated));
        let source = IcsEventSource::with_transport(transport.clone());

        let before = source.fetch(&meta(), arg()).await.unwrap();
        assert_eq!(before.events[0].title.as_deref(), Some("Review"));

        let refetched = source.fetch(&meta(), arg().with_refetch(true)).await.unwrap();
        assert_eq!(transport.calls(), 2);
        assert_eq!(refetched.events[0].title.as_deref(), Some("Review (moved)"));

        let cached = source.fetch(&meta(), arg()).await.unwrap();
        assert_eq!(transport.calls(), 2);
        assert_eq!(cached.events[0].title.as_deref(), Some("Review (moved)"));
    }

    #[tokio::test]
    async fn failed_load_is_evicted() {
        let transport = Arc::new(FakeTransport::new(FEED).failing(1));
        let source = IcsEventSource::with_transport(transport.clone());

        let err = source.fetch(&meta(), arg()).await.unwrap_err();
        assert_eq!(err.code(), SourceErrorCode::ServerError);
        assert_eq!(err.source_name(), Some("ics"));
        assert_eq!(source.cached_feeds().await, 0);
        assert!(source.last_response(&meta()).await.is_none());

        let success = source.fetch(&meta(), arg()).await.unwrap();
        assert_eq!(success.events.len(), 1);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn parse_failure_is_reported() {
        let transport = Arc::new(FakeTransport::new("<html>Please sign in</html>"));
        let source = IcsEventSource::with_transport(transport.clone());

        let err = source.fetch(&meta(), arg()).await.unwrap_err();
        assert_eq!(err.code(), SourceErrorCode::ParseError);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn feeds_are_cached_separately() {
        let transport = Arc::new(FakeTransport::new(FEED));
        let source = IcsEventSource::with_transport(transport.clone());
        let other = meta().with_header("Authorization", "Bearer other");

        source.fetch(&meta(), arg()).await.unwrap();
        source.fetch(&other, arg()).await.unwrap();
        assert_eq!(transport.calls(), 2);
        assert_eq!(source.cached_feeds().await, 2);

        assert!(source.invalidate(&other).await);
        assert!(!source.invalidate(&other).await);
        assert_eq!(source.cached_feeds().await, 1);
    }
}
