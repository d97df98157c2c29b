//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use generational_arena::{Arena, Index};
use ipnetwork::IpNetwork;
use regex::Regex;

use crate::config::ResolvedConfig;
use crate::debug::{Debug, InterfaceDownReason};
use crate::error::Error;

// Per-interface liveness, address set, backoff state and metric override
// (§3 "InterfaceEntry").
#[derive(Clone, Debug)]
pub struct InterfaceEntry {
    pub name: String,
    pub ifindex: Option<u32>,
    pub admin_up: bool,
    pub oper_up: bool,
    pub addresses: std::collections::BTreeSet<IpNetwork>,
    // Instant at which this interface stops being held in backoff.
    // `None` means the interface isn't currently withheld.
    pub backoff_deadline: Option<Instant>,
    // Interval to apply the *next* time this interface transitions to up.
    pub backoff_interval: Duration,
    // Instant of the most recent down-to-up transition, used to decide
    // whether the backoff interval should reset after a stable period.
    up_since: Option<Instant>,
    pub overload: bool,
    pub metric_override: Option<u32>,
}

impl InterfaceEntry {
    fn new(name: String, init_backoff: Duration) -> InterfaceEntry {
        InterfaceEntry {
            name,
            ifindex: None,
            admin_up: false,
            oper_up: false,
            addresses: Default::default(),
            backoff_deadline: None,
            backoff_interval: init_backoff,
            up_since: None,
            overload: false,
            metric_override: None,
        }
    }

    // An interface is usable iff it's operationally up, not overloaded, and
    // its backoff deadline (if any) has already passed (§3).
    pub fn usable(&self, now: Instant) -> bool {
        self.oper_up
            && !self.overload
            && self.backoff_deadline.is_none_or(|deadline| now >= deadline)
    }

    // Remaining time until this interface exits backoff, if any.
    pub fn backoff_remaining(&self, now: Instant) -> Option<Duration> {
        self.backoff_deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}

// Outcome of processing a link event, used by the caller to decide which
// throttles to arm (§4.1, §4.5, §4.6).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkEventOutcome {
    // The event was dropped (regex mismatch).
    Dropped,
    // The interface transitioned from down to up and entered backoff.
    TransitionedUp,
    // The interface transitioned from up to down.
    TransitionedDown,
    // The interface was created or updated without an up/down transition.
    Unchanged,
}

// The interface table (C1).
#[derive(Debug, Default)]
pub struct Table {
    arena: Arena<InterfaceEntry>,
    name_tree: BTreeMap<String, Index>,
    ifindex_tree: HashMap<u32, Index>,
    init_backoff: Duration,
    max_backoff: Duration,
}

impl Table {
    pub fn new(init_backoff: Duration, max_backoff: Duration) -> Table {
        Table {
            arena: Arena::new(),
            name_tree: BTreeMap::new(),
            ifindex_tree: HashMap::new(),
            init_backoff,
            max_backoff,
        }
    }

    // Processes a LINK event (§4.1, §4.5).
    pub fn link_event(
        &mut self,
        config: &ResolvedConfig,
        name: &str,
        ifindex: u32,
        up: bool,
        now: Instant,
    ) -> LinkEventOutcome {
        if !config.interface_accepted(name) {
            return LinkEventOutcome::Dropped;
        }

        let idx = self.get_or_create(name);
        let entry = &mut self.arena[idx];
        self.ifindex_tree.insert(ifindex, idx);
        entry.ifindex = Some(ifindex);
        let was_up = entry.oper_up;
        entry.admin_up = up;
        entry.oper_up = up;

        match (was_up, up) {
            (false, true) => {
                let interval = entry.backoff_interval;
                entry.backoff_deadline = Some(now + interval);
                entry.up_since = Some(now);
                entry.backoff_interval =
                    (entry.backoff_interval * 2).min(self.max_backoff);
                Debug::InterfaceUp(name).log();
                Debug::InterfaceBackoff(name, interval).log();
                LinkEventOutcome::TransitionedUp
            }
            (true, false) => {
                if let Some(up_since) = entry.up_since.take()
                    && now.duration_since(up_since) >= self.max_backoff
                {
                    entry.backoff_interval = self.init_backoff;
                }
                Debug::InterfaceDown(name, InterfaceDownReason::LinkDown)
                    .log();
                LinkEventOutcome::TransitionedDown
            }
            _ => LinkEventOutcome::Unchanged,
        }
    }

    // Processes an ADDRESS event, identified by OS index (§4.1).
    //
    // Returns `false` if the index is unknown (the event is dropped and
    // will be picked up by the next periodic resync).
    pub fn addr_event(
        &mut self,
        ifindex: u32,
        addr: IpNetwork,
        add: bool,
    ) -> bool {
        let Some(idx) = self.ifindex_tree.get(&ifindex).copied() else {
            return false;
        };
        let entry = &mut self.arena[idx];
        if add {
            entry.addresses.insert(addr);
        } else {
            entry.addresses.remove(&addr);
        }
        true
    }

    // Reconciles the table against a full OS inventory (§4.1 "Periodic
    // resync"). Entries absent from `inventory` are marked down; entries
    // present but no longer accepted by the include/exclude regex sets are
    // removed outright (Open Question #1, resolved per spec: removal, not
    // retention).
    pub fn resync(
        &mut self,
        config: &ResolvedConfig,
        inventory: &[(String, u32, bool, Vec<IpNetwork>)],
        now: Instant,
    ) {
        let seen: std::collections::HashSet<&str> =
            inventory.iter().map(|(name, ..)| name.as_str()).collect();

        let stale: Vec<String> = self
            .name_tree
            .keys()
            .filter(|name| !seen.contains(name.as_str()))
            .cloned()
            .collect();
        for name in stale {
            if let Some(idx) = self.name_tree.get(&name).copied() {
                self.arena[idx].oper_up = false;
            }
        }

        for (name, ifindex, up, addrs) in inventory {
            if !config.interface_accepted(name) {
                if self.name_tree.contains_key(name) {
                    Debug::InterfaceDown(name, InterfaceDownReason::ResyncRemoved)
                        .log();
                }
                self.remove(name);
                continue;
            }
            self.link_event(config, name, *ifindex, *up, now);
            let idx = self.name_tree[name];
            self.arena[idx].addresses = addrs.iter().copied().collect();
        }
    }

    fn remove(&mut self, name: &str) {
        if let Some(idx) = self.name_tree.remove(name) {
            let entry = self.arena.remove(idx);
            if let Some(entry) = entry
                && let Some(ifindex) = entry.ifindex
            {
                self.ifindex_tree.remove(&ifindex);
            }
            Debug::InterfaceDelete(name).log();
        }
    }

    fn get_or_create(&mut self, name: &str) -> Index {
        if let Some(idx) = self.name_tree.get(name).copied() {
            return idx;
        }
        let idx = self
            .arena
            .insert(InterfaceEntry::new(name.to_owned(), self.init_backoff));
        self.name_tree.insert(name.to_owned(), idx);
        Debug::InterfaceCreate(name).log();
        idx
    }

    pub fn set_overload(
        &mut self,
        name: &str,
        overload: bool,
    ) -> Result<bool, Error> {
        let idx = self
            .name_tree
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownInterface(name.to_owned()))?;
        let entry = &mut self.arena[idx];
        let changed = entry.overload != overload;
        entry.overload = overload;
        Ok(changed)
    }

    pub fn set_metric_override(
        &mut self,
        name: &str,
        metric: Option<u32>,
    ) -> Result<(), Error> {
        let idx = self
            .name_tree
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownInterface(name.to_owned()))?;
        self.arena[idx].metric_override = metric;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&InterfaceEntry> {
        self.name_tree
            .get(name)
            .copied()
            .map(|idx| &self.arena[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &'_ InterfaceEntry> + '_ {
        self.name_tree.values().map(|idx| &self.arena[*idx])
    }

    // Addresses of interfaces whose name matches `regex`, used to build the
    // redistributed prefix set (§4.6).
    pub fn addresses_matching<'a>(
        &'a self,
        regex: &'a Regex,
    ) -> impl Iterator<Item = (&'a str, &'a IpNetwork)> + 'a {
        self.iter()
            .filter(move |iface| regex.is_match(&iface.name))
            .flat_map(|iface| {
                iface.addresses.iter().map(move |a| (iface.name.as_str(), a))
            })
    }

    // Minimum remaining backoff across all entries currently in backoff,
    // used by `getRetryTimeOnUnstableInterfaces()` (§4.1, §4.6).
    pub fn min_backoff_remaining(&self, now: Instant) -> Option<Duration> {
        self.iter()
            .filter_map(|iface| iface.backoff_remaining(now))
            .filter(|d| !d.is_zero())
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AreaConfig, Config, PrefixForwardingAlgorithm, PrefixForwardingType,
    };

    fn test_config() -> ResolvedConfig {
        ResolvedConfig::new(Config {
            node_id: "N1".to_owned(),
            domain_id: "default".to_owned(),
            ipv4_enable: true,
            sr_enable: false,
            prefix_forwarding_type: PrefixForwardingType::Ip,
            prefix_forwarding_algorithm:
                PrefixForwardingAlgorithm::ShortestPath,
            use_rtt_metric: false,
            flap_init_backoff: Duration::from_millis(100),
            flap_max_backoff: Duration::from_secs(10),
            kv_key_ttl: Duration::from_secs(60),
            include_regex: vec!["et.*".to_owned()],
            exclude_regex: vec![],
            redistribute_regex: vec!["lo.*".to_owned()],
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

    #[test]
    fn link_event_filters_by_regex() {
        let config = test_config();
        let mut table = Table::new(Duration::from_millis(100), Duration::from_secs(10));
        let now = Instant::now();
        let outcome = table.link_event(&config, "eth0", 1, true, now);
        assert_eq!(outcome, LinkEventOutcome::Dropped);
        assert!(table.get("eth0").is_none());
    }

    #[test]
    fn backoff_doubles_until_capped_then_resets() {
        let config = test_config();
        let mut table = Table::new(Duration::from_millis(100), Duration::from_secs(1));
        let mut now = Instant::now();

        table.link_event(&config, "et1", 3, true, now);
        let entry = table.get("et1").unwrap();
        assert_eq!(entry.backoff_deadline, Some(now + Duration::from_millis(100)));
        assert!(!entry.usable(now));
        now += Duration::from_millis(150);
        assert!(table.get("et1").unwrap().usable(now));

        // Flap down then up again: interval should have doubled to 200ms.
        table.link_event(&config, "et1", 3, false, now);
        table.link_event(&config, "et1", 3, true, now);
        let entry = table.get("et1").unwrap();
        assert_eq!(entry.backoff_deadline, Some(now + Duration::from_millis(200)));

        // Stay up for longer than maxBackoff (1s), then flap: interval resets.
        now += Duration::from_secs(2);
        table.link_event(&config, "et1", 3, false, now);
        table.link_event(&config, "et1", 3, true, now);
        let entry = table.get("et1").unwrap();
        assert_eq!(entry.backoff_deadline, Some(now + Duration::from_millis(100)));
    }

    #[test]
    fn resync_removes_regex_excluded_entries() {
        let mut config = test_config();
        let mut table = Table::new(Duration::from_millis(100), Duration::from_secs(10));
        let now = Instant::now();
        table.link_event(&config, "et1", 3, true, now);
        assert!(table.get("et1").is_some());

        // Reconfigure the include set so "et1" no longer matches, then
        // resync with "et1" still present in the OS inventory: per the
        // resolved Open Question, it must be removed, not merely marked
        // down.
        config.include_regex = regex::RegexSet::new(["eth.*"]).unwrap();
        table.resync(&config, &[("et1".to_owned(), 3, true, vec![])], now);
        assert!(table.get("et1").is_none());
    }
}
