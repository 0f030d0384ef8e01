//! Timestamp ordering of staged blocks and the contiguous-prefix mapping.
//!
//! After a fetch step, some shards hold a staged block ("live") and some
//! hold nothing ("dead": exhausted, or skipped this step). The mapping
//! orders the live blocks by the timestamp of their first frame and finds
//! the longest prefix in which each block continues the one before it
//! without a gap. Only that prefix is safe to emit; the rest stay staged
//! until the stream catches up to them.

use vdif::FrameSpan;

/// Computes the contiguous-prefix mapping over per-shard staged spans
/// (`None` for a dead shard).
///
/// Returns `(k, mapping)` where `mapping` holds signed 1-based shard
/// indices: the first `k` entries are positive and name the contiguous
/// chain in time order starting from the earliest staged block; every
/// remaining entry is negated — first the non-adjacent live shards in time
/// order, then all dead shards in shard order.
///
/// `k == 0` means nothing is staged at all.
#[must_use]
pub fn contiguous_mapping(spans: &[Option<FrameSpan>]) -> (usize, Vec<i32>) {
    let mut live: Vec<(usize, FrameSpan)> = Vec::with_capacity(spans.len());
    let mut dead: Vec<usize> = Vec::new();
    for (i, span) in spans.iter().enumerate() {
        match span {
            Some(sp) => live.push((i, *sp)),
            None => dead.push(i),
        }
    }
    if live.is_empty() {
        let mapping = dead.iter().map(|&i| -(i as i32 + 1)).collect();
        return (0, mapping);
    }

    live.sort_by_key(|&(_, sp)| sp.first);

    // Longest prefix in which each block continues its predecessor.
    let mut k = 1;
    while k < live.len() && live[k - 1].1.continues_with(live[k].1.first) {
        k += 1;
    }

    let mut mapping = Vec::with_capacity(spans.len());
    mapping.extend(live[..k].iter().map(|&(i, _)| i as i32 + 1));
    mapping.extend(live[k..].iter().map(|&(i, _)| -(i as i32 + 1)));
    mapping.extend(dead.iter().map(|&i| -(i as i32 + 1)));
    (k, mapping)
}
