//! Audience policy store: which audiences may see which capability.
//!
//! The store maps (resource kind, identifier) to the set of audience tags
//! allowed to see that capability. It is populated once at startup from the
//! declarative manifest and treated as read-only afterwards; request handling
//! shares it behind an `Arc`.
//!
//! # Semantics
//!
//! - Re-registering an existing key overwrites it (last registration wins)
//!   and logs a warning. Duplicate registration is never an error.
//! - Looking up an unknown key returns the empty set, meaning "unrestricted".
//!   Unknown and "explicitly no restriction" are deliberately the same
//!   observable value.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use tracing::warn;

/// Category of listable capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Tool,
    Prompt,
    Resource,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Tool => write!(f, "tool"),
            ResourceKind::Prompt => write!(f, "prompt"),
            ResourceKind::Resource => write!(f, "resource"),
        }
    }
}

/// Read-only-after-init mapping from capability identity to allowed audiences.
#[derive(Debug, Default)]
pub struct PolicyStore {
    entries: HashMap<ResourceKind, HashMap<String, Vec<String>>>,
}

impl PolicyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the allowed audiences for one capability.
    ///
    /// Tags are normalized to upper-invariant form and de-duplicated,
    /// preserving first-seen order. An empty audience list means "no
    /// restriction — visible to everyone". Registering a key that already
    /// exists overwrites it with a warning; this is a deliberate
    /// last-write-wins choice, never an error.
    pub fn register<I>(&mut self, kind: ResourceKind, identifier: &str, audiences: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for tag in audiences {
            let tag = tag.as_ref().trim().to_uppercase();
            if !tag.is_empty() && !normalized.contains(&tag) {
                normalized.push(tag);
            }
        }

        let by_id = self.entries.entry(kind).or_default();
        if by_id.insert(identifier.to_string(), normalized).is_some() {
            warn!(
                kind = %kind,
                identifier = identifier,
                "audience policy re-registered, last registration wins"
            );
        }
    }

    /// Look up the allowed audiences for a capability.
    ///
    /// Returns the empty slice for unknown keys: an unregistered capability
    /// is unrestricted. This is never an error.
    pub fn lookup(&self, kind: ResourceKind, identifier: &str) -> &[String] {
        self.entries
            .get(&kind)
            .and_then(|by_id| by_id.get(identifier))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total number of registered capabilities across all kinds.
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    /// Whether no capabilities are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
