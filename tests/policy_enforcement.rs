//! Manifest loading and policy evaluation against realistic fixtures.

use std::sync::Arc;

use audiencegate::audience::RequestedAudiences;
use audiencegate::policy::{load_manifest, ManifestError, RemovalPredicate, ResourceKind};

fn write_manifest(yaml: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audiences.yaml");
    std::fs::write(&path, yaml).unwrap();
    (dir, path)
}

const MANIFEST: &str = r#"
schema: 1
capabilities:
  - kind: tool
    name: list_products
    audiences: [PRODUCTS]
  - kind: tool
    name: manage_users
    audiences: [ADMIN, SUPPORT]
  - kind: tool
    name: ping
    audiences: []
  - kind: prompt
    name: onboarding
    audiences: [SUPPORT]
  - kind: resource
    uri: "file:///catalog/skus"
    audiences: [products]
"#;

#[test]
fn test_manifest_populates_all_kinds() {
    let (_dir, path) = write_manifest(MANIFEST);
    let store = load_manifest(&path).unwrap();

    assert_eq!(store.len(), 5);
    assert_eq!(store.lookup(ResourceKind::Tool, "list_products"), ["PRODUCTS"]);
    assert_eq!(
        store.lookup(ResourceKind::Tool, "manage_users"),
        ["ADMIN", "SUPPORT"]
    );
    assert!(store.lookup(ResourceKind::Tool, "ping").is_empty());
    assert_eq!(store.lookup(ResourceKind::Prompt, "onboarding"), ["SUPPORT"]);
    // Audience tags are normalized to upper-invariant form on registration.
    assert_eq!(
        store.lookup(ResourceKind::Resource, "file:///catalog/skus"),
        ["PRODUCTS"]
    );
}

#[test]
fn test_predicate_over_loaded_manifest() {
    let (_dir, path) = write_manifest(MANIFEST);
    let store = Arc::new(load_manifest(&path).unwrap());

    let products = RemovalPredicate::new(
        Arc::clone(&store),
        ResourceKind::Tool,
        RequestedAudiences::from_header(Some("products")),
    );
    assert!(!products.should_remove("list_products"));
    assert!(products.should_remove("manage_users"));
    assert!(!products.should_remove("ping")); // unrestricted
    assert!(!products.should_remove("unknown_tool")); // unknown key = unrestricted

    let support = RemovalPredicate::new(
        Arc::clone(&store),
        ResourceKind::Tool,
        RequestedAudiences::from_header(Some("Support, ADMIN")),
    );
    assert!(!support.should_remove("manage_users"));
    assert!(support.should_remove("list_products"));

    // No header at all: fail-closed, every identified tool is hidden.
    let anonymous = RemovalPredicate::new(
        store,
        ResourceKind::Tool,
        RequestedAudiences::from_header(None),
    );
    for tool in ["list_products", "manage_users", "ping", "unknown_tool"] {
        assert!(anonymous.should_remove(tool), "{tool} should be hidden");
    }
    assert!(!anonymous.should_remove(""));
}

#[test]
fn test_duplicate_registration_last_wins() {
    let (_dir, path) = write_manifest(
        r#"
schema: 1
capabilities:
  - kind: tool
    name: dup
    audiences: [FIRST]
  - kind: tool
    name: dup
    audiences: [SECOND]
"#,
    );
    let store = load_manifest(&path).unwrap();
    assert_eq!(store.lookup(ResourceKind::Tool, "dup"), ["SECOND"]);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_missing_manifest_file_is_io_error() {
    let err = load_manifest(std::path::Path::new("/nonexistent/audiences.yaml")).unwrap_err();
    assert!(matches!(err, ManifestError::Io(_)));
}

#[test]
fn test_invalid_yaml_is_parse_error() {
    let (_dir, path) = write_manifest("schema: 1\ncapabilities: [ {kind: tool, name: ");
    let err = load_manifest(&path).unwrap_err();
    assert!(matches!(err, ManifestError::Parse(_)));
}

#[test]
fn test_wrong_schema_version_rejected() {
    let (_dir, path) = write_manifest("schema: 99\ncapabilities: []\n");
    let err = load_manifest(&path).unwrap_err();
    assert!(matches!(
        err,
        ManifestError::UnsupportedSchemaVersion { version: 99 }
    ));
}

#[test]
fn test_entry_without_identifier_rejected() {
    let (_dir, path) = write_manifest(
        r#"
schema: 1
capabilities:
  - kind: prompt
    audiences: [A]
"#,
    );
    let err = load_manifest(&path).unwrap_err();
    assert!(matches!(err, ManifestError::MissingIdentifier { .. }));
}
