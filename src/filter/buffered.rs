//! Whole-buffer fallback filtering.
//!
//! Parses the complete response document, locates the target array by
//! structural path rather than by text marker, and rebuilds it without the
//! disallowed elements. Strictly more tolerant of formatting than the
//! streaming filter (key order and whitespace do not matter), but requires
//! the entire body in memory — use it only where streaming delivery is not
//! needed.

use tracing::debug;

use super::stream::ListFilterSpec;

/// Remove disallowed elements from the target array inside `doc`.
///
/// Looks for the array at `result.<field>` first (the JSON-RPC response
/// shape), then at the top-level `<field>`. Elements whose identifying field
/// is missing or not a string are treated as unidentified (empty
/// identifier). Returns the number of elements removed; a document without
/// the target array is left untouched and reports zero.
pub fn filter_document<F>(doc: &mut serde_json::Value, spec: &ListFilterSpec, should_remove: F) -> usize
where
    F: Fn(&str) -> bool,
{
    let Some(items) = locate_array_mut(doc, spec.array_field()) else {
        return 0;
    };

    let before = items.len();
    items.retain(|item| {
        let identifier = item
            .get(spec.element_key())
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        !should_remove(identifier)
    });
    let removed = before - items.len();
    if removed > 0 {
        debug!(
            array = spec.array_field(),
            removed = removed,
            remaining = items.len(),
            "filtered buffered document"
        );
    }
    removed
}

/// Find the target array: `result.<field>` first, then top-level `<field>`.
fn locate_array_mut<'a>(
    doc: &'a mut serde_json::Value,
    field: &str,
) -> Option<&'a mut Vec<serde_json::Value>> {
    let path = format!("/result/{field}");
    if doc.pointer(&path).map(|v| v.is_array()).unwrap_or(false) {
        return doc.pointer_mut(&path).and_then(|v| v.as_array_mut());
    }
    doc.get_mut(field).and_then(|v| v.as_array_mut())
}
