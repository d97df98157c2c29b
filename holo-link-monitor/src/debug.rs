//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::{debug, debug_span};

use crate::adjacency::AdjacencyKey;

// Link Monitor debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    // Interfaces
    InterfaceCreate(&'a str),
    InterfaceDelete(&'a str),
    InterfaceUp(&'a str),
    InterfaceDown(&'a str, InterfaceDownReason),
    InterfaceBackoff(&'a str, std::time::Duration),
    // Adjacencies
    AdjacencyCreate(&'a AdjacencyKey),
    AdjacencyDelete(&'a AdjacencyKey),
    AdjacencyRestarting(&'a AdjacencyKey),
    AdjacencyRestartCleared(&'a AdjacencyKey),
    // Peer reconciliation
    PeerAdd(&'a str, &'a str),
    PeerDelete(&'a str, &'a str),
    // Advertisement
    AdvertiseAdjacencies(&'a str, usize),
    AdvertiseInterfaces(usize),
    AdvertisePrefixes(usize),
    // Control surface
    NodeOverloadChange(bool),
    InterfaceOverloadChange(&'a str, bool),
    // Internal
    HoldTimerExpired,
    LabelAllocated(&'a str, u32),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InterfaceDownReason {
    LinkDown,
    ResyncRemoved,
}

// ===== impl Debug =====

impl Debug<'_> {
    pub(crate) fn log(&self) {
        match self {
            Debug::InterfaceCreate(name) | Debug::InterfaceDelete(name) => {
                debug_span!("interface", %name).in_scope(|| {
                    debug!("{}", self);
                })
            }
            Debug::InterfaceUp(name) => {
                debug_span!("interface", %name).in_scope(|| {
                    debug!("{}", self);
                })
            }
            Debug::InterfaceDown(name, reason) => {
                debug_span!("interface", %name).in_scope(|| {
                    debug!(?reason, "{}", self);
                })
            }
            Debug::InterfaceBackoff(name, interval) => {
                debug_span!("interface", %name).in_scope(|| {
                    debug!(?interval, "{}", self);
                })
            }
            Debug::AdjacencyCreate(key) | Debug::AdjacencyDelete(key) => {
                debug_span!("adjacency", remote_node = %key.remote_node, local_ifname = %key.local_ifname)
                    .in_scope(|| {
                        debug!("{}", self);
                    })
            }
            Debug::AdjacencyRestarting(key)
            | Debug::AdjacencyRestartCleared(key) => {
                debug_span!("adjacency", remote_node = %key.remote_node, local_ifname = %key.local_ifname)
                    .in_scope(|| {
                        debug!("{}", self);
                    })
            }
            Debug::PeerAdd(area, node) | Debug::PeerDelete(area, node) => {
                debug_span!("peer-reconciler", %area).in_scope(|| {
                    debug!(%node, "{}", self);
                })
            }
            Debug::AdvertiseAdjacencies(area, count) => {
                debug!(%area, %count, "{}", self);
            }
            Debug::AdvertiseInterfaces(count) => {
                debug!(%count, "{}", self);
            }
            Debug::AdvertisePrefixes(count) => {
                debug!(%count, "{}", self);
            }
            Debug::NodeOverloadChange(overload) => {
                debug!(%overload, "{}", self);
            }
            Debug::InterfaceOverloadChange(name, overload) => {
                debug!(%name, %overload, "{}", self);
            }
            Debug::HoldTimerExpired => {
                debug!("{}", self);
            }
            Debug::LabelAllocated(area, label) => {
                debug!(%area, %label, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::InterfaceCreate(..) => {
                write!(f, "interface created")
            }
            Debug::InterfaceDelete(..) => {
                write!(f, "interface deleted")
            }
            Debug::InterfaceUp(..) => {
                write!(f, "interface up")
            }
            Debug::InterfaceDown(..) => {
                write!(f, "interface down")
            }
            Debug::InterfaceBackoff(..) => {
                write!(f, "interface entered backoff")
            }
            Debug::AdjacencyCreate(..) => {
                write!(f, "adjacency created")
            }
            Debug::AdjacencyDelete(..) => {
                write!(f, "adjacency deleted")
            }
            Debug::AdjacencyRestarting(..) => {
                write!(f, "adjacency restarting")
            }
            Debug::AdjacencyRestartCleared(..) => {
                write!(f, "adjacency restart flag cleared")
            }
            Debug::PeerAdd(..) => {
                write!(f, "peer added")
            }
            Debug::PeerDelete(..) => {
                write!(f, "peer deleted")
            }
            Debug::AdvertiseAdjacencies(..) => {
                write!(f, "advertised adjacency database")
            }
            Debug::AdvertiseInterfaces(..) => {
                write!(f, "advertised interface database")
            }
            Debug::AdvertisePrefixes(..) => {
                write!(f, "advertised redistributed prefixes")
            }
            Debug::NodeOverloadChange(..) => {
                write!(f, "node overload flag changed")
            }
            Debug::InterfaceOverloadChange(..) => {
                write!(f, "interface overload flag changed")
            }
            Debug::HoldTimerExpired => {
                write!(f, "adjacency hold timer expired")
            }
            Debug::LabelAllocated(..) => {
                write!(f, "node label allocated")
            }
        }
    }
}
