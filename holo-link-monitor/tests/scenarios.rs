//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use holo_link_monitor::adjacency::{
    self, AdjacencyKey, PeerSpec, Table as AdjacencyTable,
};
use holo_link_monitor::advertise::{self, PrefixOp};
use holo_link_monitor::config::{
    AreaConfig, Config, PrefixForwardingAlgorithm, PrefixForwardingType,
    ResolvedConfig,
};
use holo_link_monitor::instance::Master;
use holo_link_monitor::interface::Table as InterfaceTable;
use holo_link_monitor::kv::InMemoryKvStore;
use holo_link_monitor::neighbor::{self, NeighborEvent, NeighborEventKind};
use holo_link_monitor::netlink::NetlinkEvent;
use holo_link_monitor::peer::Reconciler;
use holo_link_monitor::state::LinkMonitorState;
use holo_link_monitor::store::{InMemoryStore, PersistentStore};

fn config(redistribute: Vec<&str>) -> ResolvedConfig {
    ResolvedConfig::new(Config {
        node_id: "N1".to_owned(),
        domain_id: "default".to_owned(),
        ipv4_enable: true,
        sr_enable: false,
        prefix_forwarding_type: PrefixForwardingType::Ip,
        prefix_forwarding_algorithm: PrefixForwardingAlgorithm::ShortestPath,
        use_rtt_metric: false,
        flap_init_backoff: Duration::from_millis(100),
        flap_max_backoff: Duration::from_secs(10),
        kv_key_ttl: Duration::from_secs(60),
        include_regex: vec!["et.*".to_owned()],
        exclude_regex: vec![],
        redistribute_regex: redistribute.into_iter().map(str::to_owned).collect(),
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

fn peer_spec(port: u16) -> PeerSpec {
    PeerSpec {
        remote_addr: "fe80::2".parse().unwrap(),
        port,
        identifier: "N2".to_owned(),
    }
}

// Scenario 1 (spec §8): cold start, one neighbor. Models what
// `Master::handle_hold_timer_expired` does once the hold timer fires: a
// full per-area reconcile followed by building the adjacency database,
// after the neighbor-up event has already been folded into C2.
#[test]
fn scenario_cold_start_one_neighbor() {
    let config = config(vec![]);
    let now = Instant::now();

    let mut interfaces =
        InterfaceTable::new(config.config.flap_init_backoff, config.config.flap_max_backoff);
    interfaces.link_event(&config, "et1", 3, true, now);
    interfaces.addr_event(3, "fe80::1/64".parse().unwrap(), true);

    let mut adjacencies = AdjacencyTable::new();
    let event = NeighborEvent {
        kind: NeighborEventKind::Up,
        remote_node: "N2".to_owned(),
        remote_ifname: "et1".to_owned(),
        local_ifname: "et1".to_owned(),
        peer_spec: peer_spec(60002),
        rtt_micros: 1000,
        area: "0".to_owned(),
    };
    neighbor::process(&mut adjacencies, &config, &event, Utc::now());

    // The hold timer (§4.8) only fires `adjacency_hold_time` after cold
    // start, by which point `et1`'s initial flap backoff has long expired.
    let now = now + config.config.adjacency_hold_time;

    let mut reconciler = Reconciler::new();
    let delta = reconciler.reconcile(
        "0",
        &adjacencies,
        |ifname| interfaces.get(ifname).map(|e| e.usable(now)).unwrap_or(false),
        &BTreeMap::new(),
    );
    assert_eq!(delta.add_or_update.len(), 1);
    assert_eq!(delta.add_or_update["N2"].port, 60002);
    assert!(delta.delete.is_empty());

    let db = advertise::build_adjacency_database(
        "N1",
        "0",
        &adjacencies,
        &interfaces,
        &LinkMonitorState::default(),
    );
    assert_eq!(db.adjacencies.len(), 1);
    assert_eq!(db.adjacencies[0].remote_node, "N2");
    assert_eq!(db.adjacencies[0].metric, 10);
}

// Scenario 2 (spec §8): flap. The interface enters backoff on the first
// up transition and only becomes usable again once `initBackoff`
// elapses; a flap within `2*initBackoff` doubles the interval.
#[test]
fn scenario_flap_backoff_then_double() {
    let config = config(vec![]);
    let mut interfaces =
        InterfaceTable::new(config.config.flap_init_backoff, config.config.flap_max_backoff);
    let mut now = Instant::now();

    interfaces.link_event(&config, "et1", 3, true, now);
    assert!(!interfaces.get("et1").unwrap().usable(now));

    now += Duration::from_millis(150);
    assert!(interfaces.get("et1").unwrap().usable(now));

    // Flap down then up again 50ms later, as the scenario specifies.
    interfaces.link_event(&config, "et1", 3, false, now);
    now += Duration::from_millis(50);
    interfaces.link_event(&config, "et1", 3, true, now);

    let entry = interfaces.get("et1").unwrap();
    assert_eq!(
        entry.backoff_deadline,
        Some(now + Duration::from_millis(200))
    );
}

// Scenario 3 (spec §8): graceful restart. A RESTARTING event neither
// removes the adjacency nor changes the announced peer map; a
// subsequent UP clears the flag and leaves both untouched.
#[test]
fn scenario_graceful_restart_keeps_peer_and_adjacency() {
    let config = config(vec![]);
    let mut adjacencies = AdjacencyTable::new();
    let mut reconciler = Reconciler::new();

    let up = NeighborEvent {
        kind: NeighborEventKind::Up,
        remote_node: "N2".to_owned(),
        remote_ifname: "et1".to_owned(),
        local_ifname: "et1".to_owned(),
        peer_spec: peer_spec(60002),
        rtt_micros: 1000,
        area: "0".to_owned(),
    };
    neighbor::process(&mut adjacencies, &config, &up, Utc::now());
    let baseline = reconciler.reconcile("0", &adjacencies, |_| true, &BTreeMap::new());
    assert_eq!(baseline.add_or_update.len(), 1);

    let mut restarting = up.clone();
    restarting.kind = NeighborEventKind::Restarting;
    neighbor::process(&mut adjacencies, &config, &restarting, Utc::now());

    let key = AdjacencyKey {
        remote_node: "N2".to_owned(),
        local_ifname: "et1".to_owned(),
    };
    assert!(adjacencies.get(&key).unwrap().restarting);

    // Nothing new to announce: the peer map and adjacency set are
    // unchanged by a restart event alone.
    let delta = reconciler.reconcile("0", &adjacencies, |_| true, &BTreeMap::new());
    assert!(delta.is_empty());

    neighbor::process(&mut adjacencies, &config, &up, Utc::now());
    assert!(!adjacencies.get(&key).unwrap().restarting);
    let delta = reconciler.reconcile("0", &adjacencies, |_| true, &BTreeMap::new());
    assert!(delta.is_empty());
}

// Scenario 4 (spec §8): multi-interface to the same neighbor. Both
// adjacencies are published, but only one peer entry survives
// reconciliation, using the lexicographically smallest interface name.
#[test]
fn scenario_multi_interface_tie_break() {
    let config = config(vec![]);
    let mut adjacencies = AdjacencyTable::new();

    for (ifname, port) in [("et1", 1), ("et2", 2)] {
        let event = NeighborEvent {
            kind: NeighborEventKind::Up,
            remote_node: "N2".to_owned(),
            remote_ifname: ifname.to_owned(),
            local_ifname: ifname.to_owned(),
            peer_spec: peer_spec(port),
            rtt_micros: 1000,
            area: "0".to_owned(),
        };
        neighbor::process(&mut adjacencies, &config, &event, Utc::now());
    }

    let db = advertise::build_adjacency_database(
        "N1",
        "0",
        &adjacencies,
        &InterfaceTable::new(config.config.flap_init_backoff, config.config.flap_max_backoff),
        &LinkMonitorState::default(),
    );
    assert_eq!(db.adjacencies.len(), 2);

    let peers = adjacency::peers_from_adjacencies(&adjacencies, "0", |_| true);
    assert_eq!(peers.len(), 1);
    assert_eq!(peers["N2"].port, 1);
}

// Scenario 5 (spec §8): drain. Calling `set_node_overload(true)` must
// persist the new `LinkMonitorState` before the adjacency database is
// re-announced, and must not alter the peer set.
#[tokio::test]
async fn scenario_drain_persists_before_publish() {
    let config = config(vec![]);
    let kv = Arc::new(InMemoryKvStore::new());
    let store = Arc::new(InMemoryStore::new());

    let (master, handle, _out_rx) = Master::new(
        "N1".to_owned(),
        config,
        LinkMonitorState::default(),
        kv.clone(),
        store.clone(),
    );
    tokio::spawn(master.run());

    handle.set_node_overload(true).await.unwrap();

    let persisted = store
        .load(holo_link_monitor::PERSISTENT_STORE_KEY)
        .await
        .unwrap()
        .unwrap();
    assert!(persisted.node_overload);

    let db = handle.dump_adjacencies("0".to_owned()).await.unwrap();
    assert!(db.node_overload);
    assert!(db.adjacencies.is_empty());
}

// Scenario 6 (spec §8): override drain on restart. A persisted
// `node_overload=false` is forced to `true` by `assumeDrained=true,
// overrideDrainState=true` before the first publish, both in memory
// and in the persistent store.
#[tokio::test]
async fn scenario_override_drain_state_on_restart() {
    let config = config(vec![]);
    let store = Arc::new(InMemoryStore::new());
    store
        .save(
            holo_link_monitor::PERSISTENT_STORE_KEY,
            &LinkMonitorState::default(),
        )
        .await
        .unwrap();

    let loaded = store
        .load(holo_link_monitor::PERSISTENT_STORE_KEY)
        .await
        .unwrap();
    let state = LinkMonitorState::on_startup(loaded, true, true);
    assert!(state.node_overload);

    let kv = Arc::new(InMemoryKvStore::new());
    let (master, handle, _out_rx) =
        Master::new("N1".to_owned(), config, state, kv, store.clone());
    tokio::spawn(master.run());

    let db = handle.dump_adjacencies("0".to_owned()).await.unwrap();
    assert!(db.node_overload);
}

// Redistributed-prefix plumbing used by the advertiser (§4.6), exercised
// end to end against a loopback-style interface.
#[test]
fn redistributed_prefixes_follow_regex_and_address_family() {
    let config = config(vec!["lo.*"]);
    let now = Instant::now();
    let mut interfaces =
        InterfaceTable::new(config.config.flap_init_backoff, config.config.flap_max_backoff);
    interfaces.link_event(&config, "lo0", 9, true, now);
    interfaces.addr_event(9, "10.0.0.1/32".parse().unwrap(), true);
    interfaces.addr_event(9, "fe80::1/128".parse().unwrap(), true);

    let ops = advertise::build_redistributed_prefixes(&interfaces, &config, "link-monitor");
    assert_eq!(ops.len(), 2);
    assert!(ops.iter().all(|op| matches!(op, PrefixOp::Add { .. })));
}

// Netlink resync end to end: a resync that drops an interface from the
// OS inventory removes it from C1 entirely when it's also excluded by
// the current regex set, per the resolved open question in DESIGN.md.
#[test]
fn netlink_resync_removes_excluded_interface() {
    let config = config(vec![]);
    let now = Instant::now();
    let mut interfaces =
        InterfaceTable::new(config.config.flap_init_backoff, config.config.flap_max_backoff);
    interfaces.link_event(&config, "et1", 3, true, now);

    let event = NetlinkEvent::Resync {
        inventory: vec![("et1".to_owned(), 3, true, vec![])],
    };
    let mut restrictive = config;
    restrictive.include_regex = regex::RegexSet::new(["eth.*"]).unwrap();
    let outcome =
        holo_link_monitor::netlink::process(&mut interfaces, &restrictive, &event, now);
    assert_eq!(
        outcome,
        holo_link_monitor::netlink::NetlinkEventOutcome::AdvertiseNeeded
    );
    assert!(interfaces.get("et1").is_none());
}
