#![no_main]

//! Fuzz target for the incremental list filter.
//!
//! # Goal
//! Verify that for arbitrary input bytes and arbitrary chunkings:
//! - The filter never panics
//! - Output is identical regardless of how the input is partitioned
//!   (chunk-boundary invariance)
//! - Input without the target array passes through byte-for-byte

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use audiencegate::filter::{BufferSink, ListFilterSpec, StreamFilter};

/// Fuzz input: raw bytes plus a chunking seed.
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// Raw response bytes to stream through the filter.
    data: Vec<u8>,
    /// Chunk sizes applied round-robin while feeding the filter.
    chunk_sizes: Vec<u8>,
    /// Which identifiers the predicate removes (by first byte).
    remove_mask: u8,
}

fn run(data: &[u8], chunks: &[u8], remove_mask: u8) -> Vec<u8> {
    let mut filter = StreamFilter::new(
        ListFilterSpec::tools(),
        move |id: &str| id.as_bytes().first().map(|b| b & remove_mask != 0).unwrap_or(false),
        BufferSink::new(),
    );
    let mut rest = data;
    let mut i = 0;
    while !rest.is_empty() {
        let size = chunks
            .get(i % chunks.len().max(1))
            .copied()
            .unwrap_or(7)
            .max(1) as usize;
        let take = size.min(rest.len());
        let (head, tail) = rest.split_at(take);
        filter.consume(head).expect("BufferSink appends cannot fail");
        rest = tail;
        i += 1;
    }
    filter
        .finalize()
        .expect("BufferSink finalize cannot fail")
        .into_bytes()
        .to_vec()
}

fuzz_target!(|input: FuzzInput| {
    // Whole-input reference run.
    let reference = run(&input.data, &[u8::MAX], input.remove_mask);

    // Arbitrary chunking must produce identical bytes.
    let chunked = run(&input.data, &input.chunk_sizes, input.remove_mask);
    assert_eq!(reference, chunked, "chunk-boundary invariance violated");

    // Input with no array marker passes through unchanged.
    if !input
        .data
        .windows(b"\"tools\":[".len())
        .any(|w| w == b"\"tools\":[")
    {
        assert_eq!(reference, input.data);
    }
});
