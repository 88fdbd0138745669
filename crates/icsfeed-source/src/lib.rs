//! Event sources for calendar hosts.
//!
//! This crate provides the contract between a calendar host and the handlers
//! that feed it events:
//!
//! - [`EventSourceDef`] - The trait every source handler implements
//! - [`SourceInput`] / [`FetchArg`] - What the host passes in
//! - [`FetchSuccess`] - Events plus the response they were read from
//! - [`SourceError`] - Error types for source operations
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ICS feed URL  │
//! └────────┬────────┘
//!          │ FeedTransport (one GET per refetch cycle)
//!          ▼
//! ┌─────────────────┐
//! │  IcalExpander   │  parse once, expand per range
//! └────────┬────────┘
//!          │ between(range ± 1 day)
//!          ▼
//! ┌─────────────────┐
//! │   EventInput    │  convert::expand_events()
//! └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use icsfeed_source::{EventSourceDef, FetchArg, SourceInput};
//!
//! async fn load<S: EventSourceDef>(source: &S, input: &SourceInput, arg: FetchArg) {
//!     if let Some(meta) = source.parse_meta(input) {
//!         let success = source.fetch(&meta, arg).await?;
//!         println!("{} events", success.events.len());
//!     }
//! }
//! ```

pub mod error;
#[cfg(feature = "ics")]
pub mod ics;
pub mod source;

// Re-export main types at crate root
pub use error::{SourceError, SourceErrorCode, SourceResult};
pub use source::{BoxFuture, EventSourceDef, FeedResponse, FetchArg, FetchSuccess, SourceInput};
