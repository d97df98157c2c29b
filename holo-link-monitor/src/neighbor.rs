//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use chrono::{DateTime, Utc};

use crate::adjacency::{self, AdjacencyKey, PeerSpec};
use crate::config::ResolvedConfig;

// Tag of an inbound neighbor event (§6).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NeighborEventKind {
    Up,
    Down,
    Restarting,
    RttChange,
}

// An inbound neighbor event, dispatched by explicit match on `kind` (§9
// "Polymorphic event dispatch" re-architecture note).
#[derive(Clone, Debug)]
pub struct NeighborEvent {
    pub kind: NeighborEventKind,
    pub remote_node: String,
    pub remote_ifname: String,
    pub local_ifname: String,
    pub peer_spec: PeerSpec,
    pub rtt_micros: u64,
    pub area: String,
}

impl NeighborEvent {
    pub fn key(&self) -> AdjacencyKey {
        AdjacencyKey {
            remote_node: self.remote_node.clone(),
            local_ifname: self.local_ifname.clone(),
        }
    }
}

// What the caller (the instance event loop) must do in response to
// processing a neighbor event (§4.4).
#[derive(Clone, Debug)]
pub enum NeighborEventOutcome {
    // Publish a single peer add/update immediately, and schedule a
    // throttled adjacency-database advertisement.
    Up {
        key: AdjacencyKey,
        area: String,
        peer: PeerSpec,
    },
    // No peer or advertisement action.
    Restarting,
    // Schedule peer reconciliation and adjacency advertisement for `area`.
    Down {
        area: String,
    },
    // Schedule a throttled adjacency-database advertisement only.
    RttChange,
}

// Default link metric used when RTT-based metrics are disabled or no
// sample is yet available (§4.1 "Numeric semantics").
fn rtt_metric(rtt_micros: u64) -> u32 {
    ((rtt_micros / 1000).max(1)) as u32
}

// Processes a single neighbor event against the adjacency table (§4.4).
pub fn process(
    adjacencies: &mut adjacency::Table,
    config: &ResolvedConfig,
    event: &NeighborEvent,
    now: DateTime<Utc>,
) -> NeighborEventOutcome {
    let key = event.key();

    match event.kind {
        NeighborEventKind::Up => {
            let base_metric = if config.config.use_rtt_metric {
                rtt_metric(event.rtt_micros)
            } else {
                config.config.default_metric
            };
            adjacencies.upsert(
                key.clone(),
                event.peer_spec.clone(),
                event.remote_ifname.clone(),
                event.area.clone(),
                base_metric,
                now,
            );
            NeighborEventOutcome::Up {
                key,
                area: event.area.clone(),
                peer: event.peer_spec.clone(),
            }
        }
        NeighborEventKind::Restarting => {
            adjacencies.mark_restarting(&key);
            NeighborEventOutcome::Restarting
        }
        NeighborEventKind::Down => {
            adjacencies.remove(&key);
            NeighborEventOutcome::Down {
                area: event.area.clone(),
            }
        }
        NeighborEventKind::RttChange => {
            if config.config.use_rtt_metric {
                adjacencies
                    .update_rtt_metric(&key, rtt_metric(event.rtt_micros));
            }
            NeighborEventOutcome::RttChange
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AreaConfig, Config, PrefixForwardingAlgorithm, PrefixForwardingType,
    };
    use std::time::Duration;

    fn test_config(use_rtt_metric: bool) -> ResolvedConfig {
        ResolvedConfig::new(Config {
            node_id: "N1".to_owned(),
            domain_id: "default".to_owned(),
            ipv4_enable: true,
            sr_enable: false,
            prefix_forwarding_type: PrefixForwardingType::Ip,
            prefix_forwarding_algorithm:
                PrefixForwardingAlgorithm::ShortestPath,
            use_rtt_metric,
            flap_init_backoff: Duration::from_millis(100),
            flap_max_backoff: Duration::from_secs(10),
            kv_key_ttl: Duration::from_secs(60),
            include_regex: vec!["et.*".to_owned()],
            exclude_regex: vec![],
            redistribute_regex: vec![],
            areas: vec![AreaConfig {
                id: "0".to_owned(),
                neighbor_regex: ".*".to_owned(),
                interface_regex: "et.*".to_owned(),
            }],
            assume_drained: false,
            override_drain_state: false,
            adjacency_hold_time: Duration::from_secs(5),
            default_metric: 10,
            node_label_range: (1, 1000),
        })
        .unwrap()
    }

    fn event(kind: NeighborEventKind) -> NeighborEvent {
        NeighborEvent {
            kind,
            remote_node: "N2".to_owned(),
            remote_ifname: "et1".to_owned(),
            local_ifname: "et1".to_owned(),
            peer_spec: crate::adjacency::PeerSpec {
                remote_addr: "fe80::2".parse().unwrap(),
                port: 60002,
                identifier: "N2".to_owned(),
            },
            rtt_micros: 1000,
            area: "0".to_owned(),
        }
    }

    #[test]
    fn up_creates_entry_and_requests_immediate_publish() {
        let config = test_config(false);
        let mut table = adjacency::Table::new();
        let outcome = process(
            &mut table,
            &config,
            &event(NeighborEventKind::Up),
            Utc::now(),
        );
        assert!(matches!(outcome, NeighborEventOutcome::Up { .. }));
        let key = AdjacencyKey {
            remote_node: "N2".to_owned(),
            local_ifname: "et1".to_owned(),
        };
        assert_eq!(table.get(&key).unwrap().metric(), 10);
    }

    #[test]
    fn restarting_keeps_entry_and_sets_flag() {
        let config = test_config(false);
        let mut table = adjacency::Table::new();
        process(&mut table, &config, &event(NeighborEventKind::Up), Utc::now());
        process(
            &mut table,
            &config,
            &event(NeighborEventKind::Restarting),
            Utc::now(),
        );
        let key = AdjacencyKey {
            remote_node: "N2".to_owned(),
            local_ifname: "et1".to_owned(),
        };
        assert!(table.get(&key).unwrap().restarting);
    }

    #[test]
    fn up_after_restarting_clears_flag() {
        let config = test_config(false);
        let mut table = adjacency::Table::new();
        process(&mut table, &config, &event(NeighborEventKind::Up), Utc::now());
        process(
            &mut table,
            &config,
            &event(NeighborEventKind::Restarting),
            Utc::now(),
        );
        process(&mut table, &config, &event(NeighborEventKind::Up), Utc::now());
        let key = AdjacencyKey {
            remote_node: "N2".to_owned(),
            local_ifname: "et1".to_owned(),
        };
        assert!(!table.get(&key).unwrap().restarting);
    }

    #[test]
    fn rtt_change_updates_metric_only_when_enabled() {
        let config = test_config(true);
        let mut table = adjacency::Table::new();
        process(&mut table, &config, &event(NeighborEventKind::Up), Utc::now());
        let mut rtt_event = event(NeighborEventKind::RttChange);
        rtt_event.rtt_micros = 5000;
        process(&mut table, &config, &rtt_event, Utc::now());
        let key = AdjacencyKey {
            remote_node: "N2".to_owned(),
            local_ifname: "et1".to_owned(),
        };
        assert_eq!(table.get(&key).unwrap().metric(), 5);
    }
}
