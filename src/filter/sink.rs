//! Output sink abstraction for the streaming filter.
//!
//! The filter writes filtered bytes onward through a [`ByteSink`], which
//! exposes only "append bytes" and "finalize". This keeps the filter fully
//! decoupled from transport concerns: the same state machine drives an
//! in-memory buffer in tests and the HTTP body adapter in the proxy.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

use crate::error::GateResult;

/// Append-only byte sink with an explicit end-of-stream signal.
///
/// `finalize` must be called exactly once, after the last `append`.
pub trait ByteSink {
    /// Append bytes to the output.
    fn append(&mut self, bytes: &[u8]) -> GateResult<()>;

    /// Signal that no further bytes will be appended.
    fn finalize(&mut self) -> GateResult<()>;
}

/// Sink that accumulates everything into one contiguous buffer.
#[derive(Debug, Default)]
pub struct BufferSink {
    buf: BytesMut,
    finalized: bool,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `finalize` has been called.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Consume the sink and return the accumulated output.
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    /// Borrow the accumulated output so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

impl ByteSink for BufferSink {
    fn append(&mut self, bytes: &[u8]) -> GateResult<()> {
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn finalize(&mut self) -> GateResult<()> {
        self.finalized = true;
        Ok(())
    }
}

/// Sink that queues each append as its own chunk.
///
/// The HTTP body adapter drains the queue into response frames, preserving
/// the boundaries the filter produced.
#[derive(Debug, Default)]
pub struct ChunkQueueSink {
    chunks: VecDeque<Bytes>,
    finalized: bool,
}

impl ChunkQueueSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop the oldest queued chunk, if any.
    pub fn pop_chunk(&mut self) -> Option<Bytes> {
        self.chunks.pop_front()
    }

    /// Whether `finalize` has been called.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

impl ByteSink for ChunkQueueSink {
    fn append(&mut self, bytes: &[u8]) -> GateResult<()> {
        if !bytes.is_empty() {
            self.chunks.push_back(Bytes::copy_from_slice(bytes));
        }
        Ok(())
    }

    fn finalize(&mut self) -> GateResult<()> {
        self.finalized = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_sink_accumulates() {
        let mut sink = BufferSink::new();
        sink.append(b"hello ").unwrap();
        sink.append(b"world").unwrap();
        assert!(!sink.is_finalized());
        sink.finalize().unwrap();
        assert!(sink.is_finalized());
        assert_eq!(&sink.into_bytes()[..], b"hello world");
    }

    #[test]
    fn test_chunk_queue_preserves_boundaries() {
        let mut sink = ChunkQueueSink::new();
        sink.append(b"one").unwrap();
        sink.append(b"").unwrap();
        sink.append(b"two").unwrap();
        sink.finalize().unwrap();

        assert_eq!(sink.pop_chunk().unwrap(), Bytes::from_static(b"one"));
        assert_eq!(sink.pop_chunk().unwrap(), Bytes::from_static(b"two"));
        assert!(sink.pop_chunk().is_none());
        assert!(sink.is_finalized());
    }
}
