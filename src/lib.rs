//! audiencegate — streaming audience-based redaction for MCP capability lists.
//!
//! A sidecar reverse proxy that sits in front of an MCP server and removes
//! entries from `tools/list`, `prompts/list`, and `resources/list` responses
//! according to a per-capability audience policy and the caller's requested
//! audiences. The list array is filtered incrementally as response bytes
//! stream through; everything else passes byte-for-byte.
//!
//! # Components
//!
//! - [`audience`] — resolves the trigger header into a normalized audience set
//! - [`policy`] — the audience policy store, manifest loader, and removal predicate
//! - [`filter`] — the incremental array filter (the core) and the whole-buffer fallback
//! - [`proxy`] — the HTTP service and the filtering response-body adapter
//! - [`config`], [`error`] — runtime configuration and the error taxonomy

pub mod audience;
pub mod config;
pub mod error;
pub mod filter;
pub mod policy;
pub mod proxy;
