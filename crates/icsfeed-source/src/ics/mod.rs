//! ICS feed adapter.
//!
//! This module provides an [`IcsEventSource`] that turns an iCalendar feed
//! URL into [`EventInput`](icsfeed_core::EventInput)s for any requested
//! range.
//!
//! # Features
//!
//! - Single download and parse per feed, shared by concurrent fetches
//! - Forced refetch and explicit invalidation
//! - RRULE, RDATE, EXDATE and RECURRENCE-ID handling
//! - Wall-clock times moved into their TZID zone (floating zone configurable)
//! - Every non-promoted property kept in `extended_props`
//!
//! # Example
//!
//! ```ignore
//! use icsfeed_source::{EventSourceDef, FetchArg, SourceInput};
//! use icsfeed_source::ics::IcsEventSource;
//!
//! let source = IcsEventSource::new()?;
//! let meta = source
//!     .parse_meta(&SourceInput::new("https://example.com/team.ics", "ics"))
//!     .expect("ics feed");
//! let success = source.fetch(&meta, FetchArg::new(range)).await?;
//! ```

mod config;
pub mod convert;
pub mod expander;
mod source;
mod transport;
pub mod value;

pub use config::{ICS_FORMAT, IcsFeedMeta};
pub use expander::{ExpandResult, ExpanderOptions, IcalExpander, RawEntry, RawOccurrence};
pub use source::{IcsEventSource, LoadedFeed};
pub use transport::{FeedBody, FeedTransport, HttpTransport, HttpTransportConfig};
pub use value::{IcalTime, IcalZone};
