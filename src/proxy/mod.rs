//! HTTP plumbing: the reverse-proxy service and the filtering body adapter.

pub mod body;
pub mod service;

pub use body::FilteredBody;
pub use service::{GateBody, GateService};
