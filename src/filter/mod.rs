//! Audience filtering of list responses.
//!
//! Two variants share the per-element removal decision:
//!
//! - [`stream::StreamFilter`] — the incremental filter that operates on
//!   arbitrary-sized chunks without buffering the response.
//! - [`buffered::filter_document`] — the whole-buffer fallback that parses
//!   and rebuilds the document.

pub mod buffered;
pub mod sink;
pub mod stream;

pub use buffered::filter_document;
pub use sink::{BufferSink, ByteSink, ChunkQueueSink};
pub use stream::{ListFilterSpec, StreamFilter, DEFAULT_PENDING_MAX};

/// Boxed removal predicate used where the filter crosses an object-safe
/// boundary (the HTTP body adapter).
pub type RemovalFn = Box<dyn Fn(&str) -> bool + Send + Sync>;
