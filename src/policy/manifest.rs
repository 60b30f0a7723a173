//! Declarative audience manifest loading.
//!
//! The policy store is populated from a YAML manifest that external tooling
//! generates from the upstream server's capability declarations. Loading is a
//! one-time, startup-only operation: read, parse, validate, then register
//! every entry in order (so duplicate keys exercise the store's
//! last-write-wins semantics).
//!
//! # Example
//!
//! ```yaml
//! schema: 1
//! capabilities:
//!   - kind: tool
//!     name: list_products
//!     audiences: [PRODUCTS]
//!   - kind: resource
//!     uri: "file:///catalog/skus"
//!     audiences: []
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use super::store::{PolicyStore, ResourceKind};

/// Manifest loading and validation errors.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// I/O error reading the manifest file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_saphyr::Error),

    /// Empty manifest file.
    #[error("manifest file is empty")]
    EmptyManifest,

    /// Schema version not supported.
    #[error("unsupported schema version {version}, expected 1")]
    UnsupportedSchemaVersion { version: u32 },

    /// A capability entry is missing its identifying field.
    #[error("capability #{index} (kind: {kind}) is missing its '{field}' field")]
    MissingIdentifier {
        index: usize,
        kind: ResourceKind,
        field: &'static str,
    },
}

/// Root manifest structure.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    /// Schema version (must be 1).
    schema: u32,

    /// Declared capabilities with their audience annotations.
    #[serde(default)]
    capabilities: Vec<CapabilityEntry>,
}

/// One capability declaration.
///
/// Tools and prompts are identified by `name`, resources by `uri`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CapabilityEntry {
    kind: ResourceKind,

    #[serde(default)]
    name: Option<String>,

    #[serde(default)]
    uri: Option<String>,

    /// Allowed audience tags; empty means "no restriction".
    #[serde(default)]
    audiences: Vec<String>,
}

impl CapabilityEntry {
    /// Identifying field value for this entry's kind, if present and non-empty.
    fn identifier(&self) -> Option<&str> {
        let raw = match self.kind {
            ResourceKind::Tool | ResourceKind::Prompt => self.name.as_deref(),
            ResourceKind::Resource => self.uri.as_deref(),
        };
        raw.map(str::trim).filter(|id| !id.is_empty())
    }

    /// Name of the identifying field for this entry's kind.
    fn identifier_field(&self) -> &'static str {
        match self.kind {
            ResourceKind::Tool | ResourceKind::Prompt => "name",
            ResourceKind::Resource => "uri",
        }
    }
}

/// Load an audience manifest and build the policy store from it.
///
/// # Errors
///
/// Returns [`ManifestError`] when the file cannot be read, is empty, fails
/// to parse, declares an unsupported schema version, or contains an entry
/// without its identifying field. Duplicate entries are not an error: the
/// last registration wins (the store logs a warning).
pub fn load_manifest(path: &Path) -> Result<PolicyStore, ManifestError> {
    let contents = std::fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Err(ManifestError::EmptyManifest);
    }

    let manifest: Manifest = serde_saphyr::from_str(&contents)?;
    if manifest.schema != 1 {
        return Err(ManifestError::UnsupportedSchemaVersion {
            version: manifest.schema,
        });
    }

    let mut store = PolicyStore::new();
    for (index, entry) in manifest.capabilities.iter().enumerate() {
        let identifier = entry.identifier().ok_or(ManifestError::MissingIdentifier {
            index,
            kind: entry.kind,
            field: entry.identifier_field(),
        })?;
        store.register(entry.kind, identifier, &entry.audiences);
    }

    info!(
        path = %path.display(),
        capabilities = store.len(),
        "audience manifest loaded"
    );
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<PolicyStore, ManifestError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.yaml");
        std::fs::write(&path, yaml).unwrap();
        load_manifest(&path)
    }

    #[test]
    fn test_load_minimal_manifest() {
        let store = parse(
            r#"
schema: 1
capabilities:
  - kind: tool
    name: list_products
    audiences: [PRODUCTS]
"#,
        )
        .unwrap();
        assert_eq!(store.lookup(ResourceKind::Tool, "list_products"), ["PRODUCTS"]);
    }

    #[test]
    fn test_resource_uses_uri() {
        let store = parse(
            r#"
schema: 1
capabilities:
  - kind: resource
    uri: "file:///catalog/skus"
    audiences: [products, ADMIN]
"#,
        )
        .unwrap();
        assert_eq!(
            store.lookup(ResourceKind::Resource, "file:///catalog/skus"),
            ["PRODUCTS", "ADMIN"]
        );
    }

    #[test]
    fn test_missing_identifier_rejected() {
        let err = parse(
            r#"
schema: 1
capabilities:
  - kind: tool
    audiences: [A]
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ManifestError::MissingIdentifier { index: 0, field: "name", .. }
        ));
    }

    #[test]
    fn test_resource_with_name_only_rejected() {
        // Resources are identified by uri, not name.
        let err = parse(
            r#"
schema: 1
capabilities:
  - kind: resource
    name: not-a-uri
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ManifestError::MissingIdentifier { field: "uri", .. }
        ));
    }

    #[test]
    fn test_empty_file_rejected() {
        let err = parse("   \n").unwrap_err();
        assert!(matches!(err, ManifestError::EmptyManifest));
    }

    #[test]
    fn test_unsupported_schema_rejected() {
        let err = parse("schema: 2\ncapabilities: []\n").unwrap_err();
        assert!(matches!(
            err,
            ManifestError::UnsupportedSchemaVersion { version: 2 }
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = parse("schema: 1\nsurprise: true\n");
        assert!(result.is_err(), "unknown top-level field should be rejected");
    }

    #[test]
    fn test_duplicate_entry_last_wins() {
        let store = parse(
            r#"
schema: 1
capabilities:
  - kind: prompt
    name: greeting
    audiences: [A]
  - kind: prompt
    name: greeting
    audiences: [B]
"#,
        )
        .unwrap();
        assert_eq!(store.lookup(ResourceKind::Prompt, "greeting"), ["B"]);
    }

    #[test]
    fn test_missing_audiences_defaults_to_unrestricted() {
        let store = parse(
            r#"
schema: 1
capabilities:
  - kind: tool
    name: open_tool
"#,
        )
        .unwrap();
        assert!(store.lookup(ResourceKind::Tool, "open_tool").is_empty());
    }
}
