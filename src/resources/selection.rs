//! Lease selection strategies.
//!
//! Candidates handed to the selector are already filtered to allocatable,
//! not-checked-out, not-excluded leases for one (platform, kind).

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::{AccountStrategy, ResourceKind, ResourceLease};

/// Least-recently-used first; never-used leases before used ones
pub fn lru_order(a: &ResourceLease, b: &ResourceLease) -> Ordering {
    match (a.last_used_at, b.last_used_at) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(&y),
    }
    .then_with(|| a.created_at.cmp(&b.created_at))
    .then_with(|| a.lease_id.cmp(&b.lease_id))
}

fn creation_order(a: &ResourceLease, b: &ResourceLease) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.lease_id.cmp(&b.lease_id))
}

#[derive(Debug, Default)]
pub struct LeaseSelector {
    cursors: Mutex<HashMap<(String, ResourceKind), usize>>,
}

impl LeaseSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(
        &self,
        strategy: AccountStrategy,
        platform: &str,
        kind: ResourceKind,
        mut candidates: Vec<ResourceLease>,
    ) -> Option<ResourceLease> {
        if candidates.is_empty() {
            return None;
        }

        match strategy {
            AccountStrategy::Lru => {
                candidates.sort_by(lru_order);
                candidates.into_iter().next()
            }
            AccountStrategy::Random => {
                let mut rng = rand::thread_rng();
                candidates.choose(&mut rng).cloned()
            }
            AccountStrategy::RoundRobin => {
                candidates.sort_by(creation_order);
                let index = {
                    let mut cursors = self.cursors.lock();
                    let cursor = cursors.entry((platform.to_string(), kind)).or_insert(0);
                    let index = *cursor % candidates.len();
                    *cursor = cursor.wrapping_add(1);
                    index
                };
                Some(candidates.swap_remove(index))
            }
            AccountStrategy::Priority => {
                candidates.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| lru_order(a, b)));
                candidates.into_iter().next()
            }
            AccountStrategy::Smart => {
                candidates.sort_by(|a, b| {
                    a.fail_count
                        .cmp(&b.fail_count)
                        .then_with(|| b.created_at.cmp(&a.created_at))
                        .then_with(|| lru_order(a, b))
                });
                candidates.into_iter().next()
            }
            AccountStrategy::Single => {
                candidates.sort_by(creation_order);
                candidates.into_iter().next()
            }
        }
    }
}
