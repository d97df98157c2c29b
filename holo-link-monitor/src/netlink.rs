//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Instant;

use ipnetwork::IpNetwork;

use crate::config::ResolvedConfig;
use crate::interface::{self, LinkEventOutcome};

// A single inbound netlink event (§6). The netlink socket itself is an
// external collaborator referenced only through this queue (§1).
#[derive(Clone, Debug)]
pub enum NetlinkEvent {
    Link {
        name: String,
        ifindex: u32,
        up: bool,
    },
    Addr {
        ifindex: u32,
        addr: IpNetwork,
        add: bool,
    },
    // A full resync request, normally driven by a periodic timer rather
    // than the socket itself, but modeled on the same queue for a uniform
    // dispatch surface (§4.1 "Periodic resync").
    Resync {
        inventory: Vec<(String, u32, bool, Vec<IpNetwork>)>,
    },
}

// Whether processing a netlink event should arm the interface-address
// advertise throttle (§4.5).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NetlinkEventOutcome {
    Dropped,
    AdvertiseNeeded,
}

// Processes a single netlink event against the interface table (§4.5).
pub fn process(
    interfaces: &mut interface::Table,
    config: &ResolvedConfig,
    event: &NetlinkEvent,
    now: Instant,
) -> NetlinkEventOutcome {
    match event {
        NetlinkEvent::Link { name, ifindex, up } => {
            match interfaces.link_event(config, name, *ifindex, *up, now) {
                LinkEventOutcome::Dropped => NetlinkEventOutcome::Dropped,
                _ => NetlinkEventOutcome::AdvertiseNeeded,
            }
        }
        NetlinkEvent::Addr {
            ifindex,
            addr,
            add,
        } => {
            if interfaces.addr_event(*ifindex, *addr, *add) {
                NetlinkEventOutcome::AdvertiseNeeded
            } else {
                NetlinkEventOutcome::Dropped
            }
        }
        NetlinkEvent::Resync { inventory } => {
            interfaces.resync(config, inventory, now);
            NetlinkEventOutcome::AdvertiseNeeded
        }
    }
}
