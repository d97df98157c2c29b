//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use ipnetwork::IpNetwork;
use serde::Serialize;

use crate::adjacency::Table as AdjacencyTable;
use crate::config::ResolvedConfig;
use crate::debug::Debug;
use crate::interface::Table as InterfaceTable;
use crate::state::LinkMonitorState;

// One entry in a published adjacency database (§4.6).
#[derive(Clone, Debug, Serialize)]
pub struct AdjacencyRecord {
    pub remote_node: String,
    pub local_ifname: String,
    pub remote_ifname: String,
    pub metric: u32,
    pub interface_overload: bool,
    pub restarting: bool,
}

// The per-area adjacency database published to the key-value store
// (§4.6, §6 "Key-value store keys written").
#[derive(Clone, Debug, Serialize)]
pub struct AdjacencyDatabase {
    pub node_id: String,
    pub node_overload: bool,
    pub adjacencies: Vec<AdjacencyRecord>,
}

// A full interface database snapshot (§6 "Interface-update queue").
#[derive(Clone, Debug, Serialize)]
pub struct InterfaceSnapshot {
    pub name: String,
    pub up: bool,
    pub usable: bool,
    pub addresses: Vec<IpNetwork>,
    pub metric: u32,
}

// A redistribute-add or redistribute-withdraw operation (§6
// "Prefix-update queue").
#[derive(Clone, Debug, Serialize)]
pub enum PrefixOp {
    Add { prefix: IpNetwork, source: String },
    Withdraw { prefix: IpNetwork, source: String },
}

// Effective adjacency metric: adjacency override, else interface override,
// else base metric (§4.6).
fn effective_metric(
    metric_override: Option<u32>,
    iface_metric_override: Option<u32>,
    base_metric: u32,
) -> u32 {
    metric_override
        .or(iface_metric_override)
        .unwrap_or(base_metric)
}

// Builds the adjacency database for a single area (§4.6).
pub fn build_adjacency_database(
    node_id: &str,
    area: &str,
    adjacencies: &AdjacencyTable,
    interfaces: &InterfaceTable,
    state: &LinkMonitorState,
) -> AdjacencyDatabase {
    let mut records: Vec<AdjacencyRecord> = adjacencies
        .iter_area(area)
        .map(|(key, value)| {
            let iface = interfaces.get(&key.local_ifname);
            let iface_overload = iface.map(|i| i.overload).unwrap_or(false);
            let iface_metric_override = iface.and_then(|i| i.metric_override);
            AdjacencyRecord {
                remote_node: key.remote_node.clone(),
                local_ifname: key.local_ifname.clone(),
                remote_ifname: value.remote_ifname.clone(),
                metric: effective_metric(
                    value.metric_override,
                    iface_metric_override,
                    value.base_metric,
                ),
                interface_overload: iface_overload,
                restarting: value.restarting,
            }
        })
        .collect();
    records.sort_by(|a, b| {
        (a.remote_node.as_str(), a.local_ifname.as_str())
            .cmp(&(b.remote_node.as_str(), b.local_ifname.as_str()))
    });

    Debug::AdvertiseAdjacencies(area, records.len()).log();

    AdjacencyDatabase {
        node_id: node_id.to_owned(),
        node_overload: state.node_overload,
        adjacencies: records,
    }
}

// Builds the full interface database snapshot (§4.6).
pub fn build_interface_snapshot(
    interfaces: &InterfaceTable,
    now: std::time::Instant,
    default_metric: u32,
) -> Vec<InterfaceSnapshot> {
    let snapshots: Vec<InterfaceSnapshot> = interfaces
        .iter()
        .map(|iface| InterfaceSnapshot {
            name: iface.name.clone(),
            up: iface.oper_up,
            usable: iface.usable(now),
            addresses: iface.addresses.iter().copied().collect(),
            metric: iface.metric_override.unwrap_or(default_metric),
        })
        .collect();

    Debug::AdvertiseInterfaces(snapshots.len()).log();
    snapshots
}

// Builds the redistributed-prefix operation set: addresses of interfaces
// matching the redistribute regex set, filtered by IPv4/IPv6 enablement
// (§4.6).
pub fn build_redistributed_prefixes(
    interfaces: &InterfaceTable,
    config: &ResolvedConfig,
    source: &str,
) -> Vec<PrefixOp> {
    let ops: Vec<PrefixOp> = interfaces
        .iter()
        .filter(|iface| config.interface_redistributed(&iface.name))
        .flat_map(|iface| iface.addresses.iter())
        .filter(|addr| match addr {
            IpNetwork::V4(_) => config.config.ipv4_enable,
            IpNetwork::V6(_) => true,
        })
        .map(|addr| PrefixOp::Add {
            prefix: *addr,
            source: source.to_owned(),
        })
        .collect();

    Debug::AdvertisePrefixes(ops.len()).log();
    ops
}

// Tracks the previously-announced redistributed prefix set so that
// `build_redistributed_prefixes` can emit withdrawals for prefixes that
// are no longer present (§6 "Prefix-update queue").
#[derive(Debug, Default)]
pub struct PrefixTracker {
    announced: std::collections::BTreeSet<IpNetwork>,
}

impl PrefixTracker {
    pub fn new() -> PrefixTracker {
        PrefixTracker::default()
    }

    pub fn reconcile(
        &mut self,
        interfaces: &InterfaceTable,
        config: &ResolvedConfig,
        source: &str,
    ) -> Vec<PrefixOp> {
        let current: std::collections::BTreeSet<IpNetwork> = interfaces
            .iter()
            .filter(|iface| config.interface_redistributed(&iface.name))
            .flat_map(|iface| iface.addresses.iter().copied())
            .filter(|addr| match addr {
                IpNetwork::V4(_) => config.config.ipv4_enable,
                IpNetwork::V6(_) => true,
            })
            .collect();

        let mut ops = Vec::new();
        for prefix in current.difference(&self.announced) {
            ops.push(PrefixOp::Add {
                prefix: *prefix,
                source: source.to_owned(),
            });
        }
        for prefix in self.announced.difference(&current) {
            ops.push(PrefixOp::Withdraw {
                prefix: *prefix,
                source: source.to_owned(),
            });
        }

        Debug::AdvertisePrefixes(ops.len()).log();
        self.announced = current;
        ops
    }
}
