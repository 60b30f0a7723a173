//! Audience policy: store, manifest loading, and the removal predicate.

pub mod manifest;
pub mod predicate;
pub mod store;

pub use manifest::{load_manifest, ManifestError};
pub use predicate::RemovalPredicate;
pub use store::{PolicyStore, ResourceKind};
