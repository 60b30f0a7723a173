//! Requested-audience resolution from the trigger header.
//!
//! This module provides pure parsing only — no header lookup, no I/O. The
//! proxy service extracts the raw header value and hands it to
//! [`RequestedAudiences::from_header`] once per request.

/// The set of audience tags a caller requested for this response.
///
/// Tags are stored in upper-invariant form, first-seen order, de-duplicated.
/// The empty set is a distinct, meaningful value: it means "no audiences
/// requested", not "no restriction".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestedAudiences {
    tags: Vec<String>,
}

impl RequestedAudiences {
    /// Resolve a raw header value into a normalized audience set.
    ///
    /// Splits on comma, trims whitespace, upper-cases, drops empty segments,
    /// preserves first-seen order, and de-duplicates. An absent header yields
    /// the empty set. This function is total and never fails.
    pub fn from_header(raw: Option<&str>) -> Self {
        let mut tags: Vec<String> = Vec::new();
        if let Some(raw) = raw {
            for segment in raw.split(',') {
                let tag = segment.trim().to_uppercase();
                if !tag.is_empty() && !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
        }
        Self { tags }
    }

    /// Whether no audiences were requested.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Number of distinct requested tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Case-insensitive membership test.
    pub fn contains(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Iterate the normalized tags in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }
}
