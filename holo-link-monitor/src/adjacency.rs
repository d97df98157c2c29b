//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::debug::Debug;
use crate::error::Error;

// (remote node name, local interface name) — the adjacency's natural
// compound key (§3 "AdjacencyKey").
#[derive(
    Clone, Debug, Eq, Ord, PartialEq, PartialOrd, Deserialize, Serialize,
)]
pub struct AdjacencyKey {
    pub remote_node: String,
    pub local_ifname: String,
}

// The remote control-plane counterpart's reachability information,
// independent of which local interface reaches it (§3 "PeerSpec-per-area",
// GLOSSARY "Peer").
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct PeerSpec {
    pub remote_addr: IpAddr,
    pub port: u16,
    pub identifier: String,
}

// An adjacency record (§3 "AdjacencyValue"). The area is immutable for the
// life of the entry.
#[derive(Clone, Debug)]
pub struct AdjacencyValue {
    pub peer_spec: PeerSpec,
    pub remote_ifname: String,
    pub area: String,
    pub base_metric: u32,
    pub metric_override: Option<u32>,
    pub restarting: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AdjacencyValue {
    // Effective metric for this adjacency, before the interface-level
    // override is layered on top (§4.6).
    pub fn metric(&self) -> u32 {
        self.metric_override.unwrap_or(self.base_metric)
    }
}

// The adjacency table (C2).
#[derive(Debug, Default)]
pub struct Table {
    entries: BTreeMap<AdjacencyKey, AdjacencyValue>,
}

impl Table {
    pub fn new() -> Table {
        Table::default()
    }

    // Inserts or updates an adjacency following a neighbor-up event (§4.2,
    // §4.4). If an entry already exists with an identical peer spec, its
    // restarting flag is cleared and its timestamps refreshed; otherwise a
    // new entry is created.
    pub fn upsert(
        &mut self,
        key: AdjacencyKey,
        peer_spec: PeerSpec,
        remote_ifname: String,
        area: String,
        base_metric: u32,
        now: DateTime<Utc>,
    ) {
        match self.entries.get_mut(&key) {
            Some(entry) if entry.peer_spec == peer_spec => {
                if entry.restarting {
                    Debug::AdjacencyRestartCleared(&key).log();
                }
                entry.restarting = false;
                entry.updated_at = now;
            }
            _ => {
                Debug::AdjacencyCreate(&key).log();
                self.entries.insert(
                    key,
                    AdjacencyValue {
                        peer_spec,
                        remote_ifname,
                        area,
                        base_metric,
                        metric_override: None,
                        restarting: false,
                        created_at: now,
                        updated_at: now,
                    },
                );
            }
        }
    }

    // Marks an adjacency as restarting without removing it (§4.2 "Restart
    // window").
    pub fn mark_restarting(&mut self, key: &AdjacencyKey) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.restarting = true;
            Debug::AdjacencyRestarting(key).log();
        }
    }

    // Removes an adjacency following a neighbor-down event (§4.2).
    pub fn remove(&mut self, key: &AdjacencyKey) -> Option<AdjacencyValue> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            Debug::AdjacencyDelete(key).log();
        }
        removed
    }

    pub fn update_rtt_metric(
        &mut self,
        key: &AdjacencyKey,
        metric: u32,
    ) -> bool {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.base_metric = metric;
            true
        } else {
            false
        }
    }

    pub fn set_metric_override(
        &mut self,
        key: &AdjacencyKey,
        metric: Option<u32>,
    ) -> Result<(), Error> {
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| Error::UnknownAdjacency(key.clone()))?;
        entry.metric_override = metric;
        Ok(())
    }

    pub fn get(&self, key: &AdjacencyKey) -> Option<&AdjacencyValue> {
        self.entries.get(key)
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&AdjacencyKey, &AdjacencyValue)> + '_ {
        self.entries.iter()
    }

    pub fn iter_area<'a>(
        &'a self,
        area: &'a str,
    ) -> impl Iterator<Item = (&'a AdjacencyKey, &'a AdjacencyValue)> + 'a
    {
        self.entries
            .iter()
            .filter(move |(_, value)| value.area == area)
    }
}

// Derives the desired peer map for an area from the current adjacency
// table, applying the deterministic tie-break rule of §3/§4.3: when a
// remote node is reachable over multiple interfaces in the same area, the
// lexicographically smallest local interface name wins.
pub fn peers_from_adjacencies<'a>(
    adjacencies: &'a Table,
    area: &str,
    usable: impl Fn(&str) -> bool + 'a,
) -> BTreeMap<String, PeerSpec> {
    let mut result: BTreeMap<String, PeerSpec> = BTreeMap::new();
    let mut winning_ifname: BTreeMap<String, &str> = BTreeMap::new();

    for (key, value) in adjacencies.iter_area(area) {
        if !usable(&key.local_ifname) {
            continue;
        }
        match winning_ifname.get(&key.remote_node) {
            Some(current) if *current <= key.local_ifname.as_str() => {}
            _ => {
                winning_ifname
                    .insert(key.remote_node.clone(), &key.local_ifname);
                result.insert(key.remote_node.clone(), value.peer_spec.clone());
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(port: u16) -> PeerSpec {
        PeerSpec {
            remote_addr: "fe80::1".parse().unwrap(),
            port,
            identifier: "N2".to_owned(),
        }
    }

    #[test]
    fn tie_break_picks_smallest_ifname() {
        let mut table = Table::new();
        let now = Utc::now();
        table.upsert(
            AdjacencyKey {
                remote_node: "N2".to_owned(),
                local_ifname: "et2".to_owned(),
            },
            spec(1),
            "et2".to_owned(),
            "0".to_owned(),
            10,
            now,
        );
        table.upsert(
            AdjacencyKey {
                remote_node: "N2".to_owned(),
                local_ifname: "et1".to_owned(),
            },
            spec(2),
            "et1".to_owned(),
            "0".to_owned(),
            10,
            now,
        );

        let peers = peers_from_adjacencies(&table, "0", |_| true);
        assert_eq!(peers.len(), 1);
        assert_eq!(peers["N2"].port, 2);
    }

    #[test]
    fn restarting_adjacency_stays_in_peer_map() {
        let mut table = Table::new();
        let now = Utc::now();
        let key = AdjacencyKey {
            remote_node: "N2".to_owned(),
            local_ifname: "et1".to_owned(),
        };
        table.upsert(
            key.clone(),
            spec(1),
            "et1".to_owned(),
            "0".to_owned(),
            10,
            now,
        );
        table.mark_restarting(&key);
        assert!(table.get(&key).unwrap().restarting);

        let peers = peers_from_adjacencies(&table, "0", |_| true);
        assert_eq!(peers.len(), 1);
    }
}
