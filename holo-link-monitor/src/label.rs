//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use holo_utils::task::TimeoutTask;

use crate::debug::Debug;
use crate::error::Error;
use crate::kv::KvStoreClient;

// Per-area range allocator claiming a unique small integer node label by
// probing the key-value store (§4.8). Allocation only begins once the
// adjacency hold timer has fired, and a previously-persisted label is
// preferred to keep the node's label stable across restarts.
#[derive(Default)]
pub struct Allocator {
    // The retry timer, owned for the allocator's lifetime so it is
    // cancelled automatically when the Link Monitor stops (§9 open
    // question #3).
    retry_task: Option<TimeoutTask>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AllocationResult {
    Allocated(u32),
    RangeExhausted,
}

impl Allocator {
    pub fn new() -> Allocator {
        Allocator::default()
    }

    pub fn set_retry_task(&mut self, task: Option<TimeoutTask>) {
        self.retry_task = task;
    }

    pub fn cancel_retry(&mut self) {
        self.retry_task = None;
    }

    // Attempts to claim a node label for `area`, preferring `preferred`
    // (the label persisted in `LinkMonitorState` from a previous run, if
    // any) and otherwise scanning `range` linearly.
    pub async fn try_allocate(
        kv: &dyn KvStoreClient,
        node_id: &str,
        area: &str,
        range: (u32, u32),
        preferred: Option<u32>,
    ) -> Result<AllocationResult, Error> {
        if let Some(label) = preferred {
            match Self::probe(kv, node_id, area, label).await? {
                true => {
                    Debug::LabelAllocated(area, label).log();
                    return Ok(AllocationResult::Allocated(label));
                }
                false => {}
            }
        }

        for label in range.0..=range.1 {
            if Some(label) == preferred {
                continue;
            }
            if Self::probe(kv, node_id, area, label).await? {
                Debug::LabelAllocated(area, label).log();
                return Ok(AllocationResult::Allocated(label));
            }
        }

        Ok(AllocationResult::RangeExhausted)
    }

    // Probes and, if free, claims a single label reservation key. Returns
    // whether the label is now (or already was) owned by this node.
    async fn probe(
        kv: &dyn KvStoreClient,
        node_id: &str,
        area: &str,
        label: u32,
    ) -> Result<bool, Error> {
        let key = format!("label/{area}/{label}");
        match kv.get(&key).await? {
            None => {
                kv.put(
                    &key,
                    node_id.as_bytes().to_vec(),
                    Duration::from_secs(3600),
                    true,
                )
                .await?;
                Ok(true)
            }
            Some(owner) => Ok(owner == node_id.as_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKvStore;

    #[tokio::test]
    async fn prefers_persisted_label_when_still_free() {
        let kv = InMemoryKvStore::new();
        let result =
            Allocator::try_allocate(&kv, "N1", "0", (1, 10), Some(5))
                .await
                .unwrap();
        assert_eq!(result, AllocationResult::Allocated(5));
    }

    #[tokio::test]
    async fn falls_back_to_scan_when_preferred_taken() {
        let kv = InMemoryKvStore::new();
        kv.put(
            "label/0/5",
            b"N3".to_vec(),
            Duration::from_secs(60),
            true,
        )
        .await
        .unwrap();

        let result =
            Allocator::try_allocate(&kv, "N1", "0", (1, 10), Some(5))
                .await
                .unwrap();
        assert!(matches!(result, AllocationResult::Allocated(n) if n != 5));
    }

    #[tokio::test]
    async fn exhausted_range_reports_failure() {
        let kv = InMemoryKvStore::new();
        for n in 1..=3 {
            kv.put(
                &format!("label/0/{n}"),
                b"other".to_vec(),
                Duration::from_secs(60),
                true,
            )
            .await
            .unwrap();
        }
        let result =
            Allocator::try_allocate(&kv, "N1", "0", (1, 3), None)
                .await
                .unwrap();
        assert_eq!(result, AllocationResult::RangeExhausted);
    }
}
