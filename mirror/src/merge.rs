// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{MirrorError, MirrorResult};
use crate::types::ChainEvent;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Merge per-contract event lists, each already ordered by position, into one
/// list ordered by `(block_number, log_index)`.
///
/// Two events at the same position cannot both be real logs of one chain, so a
/// duplicate is reported instead of silently picking one.
pub fn merge_event_streams(streams: Vec<Vec<ChainEvent>>) -> MirrorResult<Vec<ChainEvent>> {
    let total = streams.iter().map(Vec::len).sum();
    let mut iters = streams
        .into_iter()
        .map(Vec::into_iter)
        .collect::<Vec<_>>();

    let mut heap = BinaryHeap::new();
    let mut heads = Vec::with_capacity(iters.len());
    for (index, iter) in iters.iter_mut().enumerate() {
        let head = iter.next();
        if let Some(event) = &head {
            heap.push(Reverse((event.position(), index)));
        }
        heads.push(head);
    }

    let mut merged: Vec<ChainEvent> = Vec::with_capacity(total);
    while let Some(Reverse((position, index))) = heap.pop() {
        let Some(event) = heads[index].take() else {
            continue;
        };
        if merged.last().map(ChainEvent::position) == Some(position) {
            return Err(MirrorError::DuplicateEventPosition {
                block_number: position.0,
                log_index: position.1,
            });
        }
        merged.push(event);
        if let Some(next) = iters[index].next() {
            heap.push(Reverse((next.position(), index)));
            heads[index] = Some(next);
        }
    }
    Ok(merged)
}
