//! Healthy-partition layouts for the selection strategies.

use super::config::StrategyKind;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Heap entry for least-response-time selection.
///
/// Ordered so that `BinaryHeap::pop` yields the slot with the smallest
/// response time; ties resolve to the earliest insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapSlot {
    slot: usize,
    response_time_ms: u64,
    seq: u64,
}

impl Ord for HeapSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .response_time_ms
            .cmp(&self.response_time_ms)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for HeapSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The healthy partition of the pool, laid out per selection strategy.
///
/// Round robin keeps an ordered slot sequence with a rotating cursor and
/// leaves a selected slot in place. Least response time keeps a min-heap and
/// pops the selected slot out of the partition, so two overlapping requests
/// cannot both land on the nominally fastest backend.
#[derive(Debug)]
pub(crate) enum HealthyPartition {
    /// Ordered sequence with a rotating cursor.
    RoundRobin { order: Vec<usize>, cursor: usize },
    /// Min-heap keyed by the last measured response time.
    LeastResponseTime { heap: BinaryHeap<HeapSlot>, seq: u64 },
}

impl HealthyPartition {
    /// Create a partition holding the given slots.
    pub(crate) fn new(kind: StrategyKind, slots: Vec<usize>) -> Self {
        match kind {
            StrategyKind::RoundRobin => Self::RoundRobin {
                order: slots,
                cursor: 0,
            },
            StrategyKind::LeastResponseTime => {
                let mut partition = Self::LeastResponseTime {
                    heap: BinaryHeap::new(),
                    seq: 0,
                };
                for slot in slots {
                    partition.insert(slot, 0);
                }
                partition
            },
        }
    }

    /// Pick the next slot, or `None` when the partition is empty.
    pub(crate) fn select(&mut self) -> Option<usize> {
        match self {
            Self::RoundRobin { order, cursor } => {
                if order.is_empty() {
                    return None;
                }
                let position = *cursor % order.len();
                let slot = order[position];
                *cursor = (position + 1) % order.len();
                Some(slot)
            },
            Self::LeastResponseTime { heap, .. } => heap.pop().map(|entry| entry.slot),
        }
    }

    /// Whether `select` removes the chosen slot from the partition.
    pub(crate) fn pops_on_select(&self) -> bool {
        matches!(self, Self::LeastResponseTime { .. })
    }

    /// Add a slot; `response_time_ms` keys the heap and is ignored by
    /// round robin.
    pub(crate) fn insert(&mut self, slot: usize, response_time_ms: u64) {
        match self {
            Self::RoundRobin { order, .. } => {
                if !order.contains(&slot) {
                    order.push(slot);
                }
            },
            Self::LeastResponseTime { heap, seq } => {
                if !heap.iter().any(|entry| entry.slot == slot) {
                    *seq += 1;
                    heap.push(HeapSlot {
                        slot,
                        response_time_ms,
                        seq: *seq,
                    });
                }
            },
        }
    }

    /// Remove a slot. Returns whether it was present.
    pub(crate) fn remove(&mut self, slot: usize) -> bool {
        match self {
            Self::RoundRobin { order, cursor } => {
                let Some(position) = order.iter().position(|s| *s == slot) else {
                    return false;
                };
                order.remove(position);
                if order.is_empty() {
                    *cursor = 0;
                } else {
                    if position < *cursor {
                        *cursor -= 1;
                    }
                    *cursor %= order.len();
                }
                true
            },
            Self::LeastResponseTime { heap, .. } => {
                let before = heap.len();
                heap.retain(|entry| entry.slot != slot);
                heap.len() != before
            },
        }
    }

    /// Check membership.
    pub(crate) fn contains(&self, slot: usize) -> bool {
        match self {
            Self::RoundRobin { order, .. } => order.contains(&slot),
            Self::LeastResponseTime { heap, .. } => heap.iter().any(|entry| entry.slot == slot),
        }
    }

    /// Current members, selection order not implied.
    pub(crate) fn slots(&self) -> Vec<usize> {
        match self {
            Self::RoundRobin { order, .. } => order.clone(),
            Self::LeastResponseTime { heap, .. } => {
                heap.iter().map(|entry| entry.slot).collect()
            },
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Self::RoundRobin { order, .. } => order.len(),
            Self::LeastResponseTime { heap, .. } => heap.len(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
