//! Incremental array filtering over an open-ended byte stream.
//!
//! [`StreamFilter`] sits between a producer emitting a response in
//! arbitrary-sized chunks and the real output sink. It locates a named JSON
//! array by literal marker search, extracts complete top-level object
//! elements one at a time as they become fully available, drops the ones the
//! removal predicate rejects, and re-emits a syntactically valid filtered
//! array. Every byte outside the target array passes through unchanged.
//!
//! Marker-based scanning (rather than a full JSON parser driving the whole
//! response) keeps the filter agnostic to the surrounding document shape and
//! lets it operate on a stream that has not finished arriving. The cost is
//! fragility to non-canonical formatting: the array introduction must appear
//! as `"<field>":[` and each element must open with `{"<key>":"`. Input that
//! deviates streams through unfiltered rather than failing.
//!
//! One filter instance serves one response. `consume` calls must be
//! sequential; there is no internal locking because there is no concurrent
//! access to one instance's state.

use bytes::BytesMut;
use tracing::{debug, warn};

use crate::error::GateResult;

use super::sink::ByteSink;

/// Default cap on the pending buffer (matches the response buffering cap
/// used elsewhere in the gate).
pub const DEFAULT_PENDING_MAX: usize = 10 * 1024 * 1024;

/// Configuration for one filterable list shape.
///
/// The three MCP list responses share one filter implementation,
/// parameterized by the array field name and the element-identifying key.
#[derive(Debug, Clone)]
pub struct ListFilterSpec {
    array_field: &'static str,
    element_key: &'static str,
    intro_marker: String,
    element_marker: String,
}

impl ListFilterSpec {
    fn new(array_field: &'static str, element_key: &'static str) -> Self {
        Self {
            array_field,
            element_key,
            intro_marker: format!("\"{array_field}\":["),
            element_marker: format!("{{\"{element_key}\":\""),
        }
    }

    /// The `tools` array, elements identified by `name`.
    pub fn tools() -> Self {
        Self::new("tools", "name")
    }

    /// The `prompts` array, elements identified by `name`.
    pub fn prompts() -> Self {
        Self::new("prompts", "name")
    }

    /// The `resources` array, elements identified by `uri`.
    pub fn resources() -> Self {
        Self::new("resources", "uri")
    }

    /// Name of the array field this spec targets.
    pub fn array_field(&self) -> &'static str {
        self.array_field
    }

    /// Name of the element-identifying field.
    pub fn element_key(&self) -> &'static str {
        self.element_key
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterState {
    OutsideArray,
    InsideArray,
}

/// Streaming filter for one named JSON array inside one response.
///
/// `F` answers "should the element with this identifier be dropped"; `S` is
/// the output sink. Feed input with [`consume`](Self::consume), then call
/// [`finalize`](Self::finalize) exactly once when the stream ends.
pub struct StreamFilter<F, S> {
    spec: ListFilterSpec,
    should_remove: F,
    sink: S,
    state: FilterState,
    first_written: bool,
    /// Not-yet-fully-processed input. Grows at the tail, shrinks from the
    /// head; strict FIFO consumption.
    pending: BytesMut,
    pending_max: usize,
    /// Set when the pending cap was exceeded: filtering is abandoned and all
    /// remaining input passes through verbatim.
    bypass: bool,
    kept: usize,
    removed: usize,
}

impl<F, S> StreamFilter<F, S>
where
    F: Fn(&str) -> bool,
    S: ByteSink,
{
    /// Create a filter with the default pending-buffer cap.
    pub fn new(spec: ListFilterSpec, should_remove: F, sink: S) -> Self {
        Self {
            spec,
            should_remove,
            sink,
            state: FilterState::OutsideArray,
            first_written: false,
            pending: BytesMut::new(),
            pending_max: DEFAULT_PENDING_MAX,
            bypass: false,
            kept: 0,
            removed: 0,
        }
    }

    /// Override the pending-buffer cap.
    pub fn with_pending_max(mut self, pending_max: usize) -> Self {
        self.pending_max = pending_max;
        self
    }

    /// Number of elements emitted so far.
    pub fn kept(&self) -> usize {
        self.kept
    }

    /// Number of elements dropped so far.
    pub fn removed(&self) -> usize {
        self.removed
    }

    /// Mutable access to the sink (the body adapter drains queued output).
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Feed one chunk of input.
    ///
    /// Appends to the pending buffer and processes as far as the data
    /// allows. Bytes that cannot be resolved yet (a partial marker, an
    /// element whose closing brace has not arrived) stay buffered until more
    /// input or [`finalize`](Self::finalize).
    pub fn consume(&mut self, chunk: &[u8]) -> GateResult<()> {
        if self.bypass {
            return self.sink.append(chunk);
        }

        self.pending.extend_from_slice(chunk);
        self.process(false)?;

        if self.pending.len() > self.pending_max {
            warn!(
                array = self.spec.array_field,
                pending = self.pending.len(),
                cap = self.pending_max,
                "pending buffer cap exceeded, passing remainder through unfiltered"
            );
            let rest = self.pending.split_to(self.pending.len());
            self.sink.append(&rest)?;
            self.bypass = true;
        }
        Ok(())
    }

    /// Resolve all remaining state and finalize the sink.
    ///
    /// Any buffer content still unresolved after the final processing pass
    /// is emitted verbatim with a warning: best-effort pass-through,
    /// correctness is not guaranteed for content truncated mid-element.
    pub fn finalize(mut self) -> GateResult<S> {
        if !self.bypass {
            self.process(true)?;
            if !self.pending.is_empty() {
                warn!(
                    array = self.spec.array_field,
                    unresolved = self.pending.len(),
                    "stream ended with unresolved bytes, emitting verbatim"
                );
                let rest = self.pending.split_to(self.pending.len());
                self.sink.append(&rest)?;
            }
            debug!(
                array = self.spec.array_field,
                kept = self.kept,
                removed = self.removed,
                "list filtering complete"
            );
        }
        self.sink.finalize()?;
        Ok(self.sink)
    }

    /// Run the processing loop until no more progress can be made against
    /// the current buffer.
    fn process(&mut self, flushing: bool) -> GateResult<()> {
        loop {
            match self.state {
                FilterState::OutsideArray => {
                    if let Some(pos) = find(&self.pending, self.spec.intro_marker.as_bytes()) {
                        let head = self.pending.split_to(pos + self.spec.intro_marker.len());
                        self.sink.append(&head)?;
                        self.state = FilterState::InsideArray;
                        self.first_written = false;
                        continue;
                    }
                    if flushing {
                        if !self.pending.is_empty() {
                            let rest = self.pending.split_to(self.pending.len());
                            self.sink.append(&rest)?;
                        }
                    } else if let Some(nl) = self.pending.iter().rposition(|&b| b == b'\n') {
                        // Emit up to the last newline: bounds memory while
                        // waiting and cannot split the (newline-free) marker.
                        let head = self.pending.split_to(nl + 1);
                        self.sink.append(&head)?;
                    }
                    return Ok(());
                }
                FilterState::InsideArray => {
                    let elem = find(&self.pending, self.spec.element_marker.as_bytes());
                    let close = self.pending.iter().position(|&b| b == b']');
                    match (elem, close) {
                        // Next element starts before any end marker.
                        (Some(e), c) if c.map_or(true, |c| e < c) => {
                            let Some(obj_end) = find_object_end(&self.pending, e) else {
                                // The element's closing brace has not arrived.
                                return Ok(());
                            };
                            self.handle_element(e, obj_end)?;
                            continue;
                        }
                        // Array end before any further element.
                        (_, Some(c)) => {
                            let head = self.pending.split_to(c + 1);
                            self.sink.append(&head)?;
                            self.state = FilterState::OutsideArray;
                            continue;
                        }
                        // Neither marker yet: await more input.
                        _ => return Ok(()),
                    }
                }
            }
        }
    }

    /// Decide one complete element at `pending[start..=end]` and advance
    /// past it. Separator bytes before the element are dropped; commas are
    /// re-synthesized on emission so removed elements leave no stray
    /// punctuation behind.
    fn handle_element(&mut self, start: usize, end: usize) -> GateResult<()> {
        let identifier = extract_identifier(&self.pending[start..=end], self.spec.element_key);
        if (self.should_remove)(&identifier) {
            self.removed += 1;
            debug!(
                array = self.spec.array_field,
                identifier = %identifier,
                "element removed"
            );
        } else {
            if self.first_written {
                self.sink.append(b",")?;
            }
            self.sink.append(&self.pending[start..=end])?;
            self.first_written = true;
            self.kept += 1;
        }
        let _ = self.pending.split_to(end + 1);
        Ok(())
    }
}

/// Locate the matching close of the object opening at `buf[start]`.
///
/// Counts braces at nesting depth, ignoring braces inside JSON string
/// literals (escape-aware). Returns the index of the closing `}` once the
/// whole object is present, `None` while it is still arriving.
fn find_object_end(buf: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in buf.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract the identifying field from one element's raw JSON.
///
/// A parse failure is non-fatal: the element is treated as unidentified
/// (empty identifier) and the predicate's "only remove identified items"
/// rule applies.
fn extract_identifier(raw: &[u8], key: &str) -> String {
    match serde_json::from_slice::<serde_json::Value>(raw) {
        Ok(value) => value
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        Err(e) => {
            debug!(error = %e, "element JSON unparseable, treating as unidentified");
            String::new()
        }
    }
}

/// First occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
