//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;

use crate::adjacency::{self, PeerSpec, Table as AdjacencyTable};
use crate::debug::Debug;

// Result of a single reconciliation pass for one area (§4.3).
#[derive(Clone, Debug, Default)]
pub struct PeerDelta {
    pub add_or_update: BTreeMap<String, PeerSpec>,
    pub delete: Vec<String>,
}

impl PeerDelta {
    pub fn is_empty(&self) -> bool {
        self.add_or_update.is_empty() && self.delete.is_empty()
    }
}

// Tracks, per area, the peer map most recently announced to the key-value
// store, so that reconciliation emits a delta instead of a full snapshot
// (§3 "PeerSpec-per-area", §4.3).
#[derive(Debug, Default)]
pub struct Reconciler {
    announced: BTreeMap<String, BTreeMap<String, PeerSpec>>,
}

impl Reconciler {
    pub fn new() -> Reconciler {
        Reconciler::default()
    }

    // Computes the desired peer map for `area`, diffs it against the
    // previously announced map, and updates the announced map to match.
    //
    // If `up_peers` is non-empty, those peers are unioned into the
    // add-or-update set and into the announced map regardless of whether
    // they actually changed, to recover from a missed restart signal
    // (§4.3).
    pub fn reconcile(
        &mut self,
        area: &str,
        adjacencies: &AdjacencyTable,
        usable: impl Fn(&str) -> bool,
        up_peers: &BTreeMap<String, PeerSpec>,
    ) -> PeerDelta {
        let mut desired = adjacency::peers_from_adjacencies(
            adjacencies,
            area,
            usable,
        );
        for (node, spec) in up_peers {
            desired.insert(node.clone(), spec.clone());
        }

        let previous = self.announced.entry(area.to_owned()).or_default();

        let mut add_or_update = BTreeMap::new();
        for (node, spec) in &desired {
            let changed = previous.get(node) != Some(spec);
            if changed || up_peers.contains_key(node) {
                add_or_update.insert(node.clone(), spec.clone());
                Debug::PeerAdd(area, node).log();
            }
        }
        let delete: Vec<String> = previous
            .keys()
            .filter(|node| !desired.contains_key(*node))
            .cloned()
            .collect();
        for node in &delete {
            Debug::PeerDelete(area, node).log();
        }

        *previous = desired;

        PeerDelta {
            add_or_update,
            delete,
        }
    }

    pub fn announced(&self, area: &str) -> Option<&BTreeMap<String, PeerSpec>> {
        self.announced.get(area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjacency::AdjacencyKey;
    use chrono::Utc;

    fn spec() -> PeerSpec {
        PeerSpec {
            remote_addr: "fe80::1".parse().unwrap(),
            port: 1,
            identifier: "N2".to_owned(),
        }
    }

    #[test]
    fn reconcile_emits_add_then_delete_on_removal() {
        let mut adjacencies = AdjacencyTable::new();
        let key = AdjacencyKey {
            remote_node: "N2".to_owned(),
            local_ifname: "et1".to_owned(),
        };
        adjacencies.upsert(
            key.clone(),
            spec(),
            "et1".to_owned(),
            "0".to_owned(),
            10,
            Utc::now(),
        );

        let mut reconciler = Reconciler::new();
        let delta = reconciler.reconcile(
            "0",
            &adjacencies,
            |_| true,
            &BTreeMap::new(),
        );
        assert_eq!(delta.add_or_update.len(), 1);
        assert!(delta.delete.is_empty());

        adjacencies.remove(&key);
        let delta = reconciler.reconcile(
            "0",
            &adjacencies,
            |_| true,
            &BTreeMap::new(),
        );
        assert!(delta.add_or_update.is_empty());
        assert_eq!(delta.delete, vec!["N2".to_owned()]);
    }
}
