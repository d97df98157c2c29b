//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tokio::sync::oneshot;

use crate::adjacency::AdjacencyKey;
use crate::advertise::{AdjacencyDatabase, InterfaceSnapshot};
use crate::error::Error;
use crate::netlink::NetlinkEvent;

// Completion handle for a control-surface operation (§4.7, §5
// "Cancellation"). Analogous to the northbound daemon's request/responder
// pairing: the caller awaits the receiver half while the loop thread
// fulfills the sender half after the mutation (and, for mutating requests,
// the persistence write) completes.
pub type Responder<T> = oneshot::Sender<T>;

// Operator-facing control-surface requests (§4.7). Requests 1-4 mutate
// state and are answered with `Result<(), Error>`; request 5 is read-only
// and answered with a point-in-time snapshot.
#[derive(Debug)]
pub enum Request {
    SetNodeOverload(SetNodeOverloadRequest),
    SetInterfaceOverload(SetInterfaceOverloadRequest),
    SetLinkMetricOverride(SetLinkMetricOverrideRequest),
    SetAdjacencyMetricOverride(SetAdjacencyMetricOverrideRequest),
    Dump(DumpRequest),
}

// 1. Set node overload. Applied directly, not throttled: the operator
// wants the overload flag advertised immediately (§4.7).
#[derive(Debug)]
pub struct SetNodeOverloadRequest {
    pub overload: bool,
    pub responder: Option<Responder<Result<(), Error>>>,
}

// 2. Set interface overload. The resulting advertisement is throttled
// along with any other pending adjacency-database change (§4.7).
#[derive(Debug)]
pub struct SetInterfaceOverloadRequest {
    pub ifname: String,
    pub overload: bool,
    pub responder: Option<Responder<Result<(), Error>>>,
}

// 3. Set a per-interface link metric override (§4.6 "interface override").
#[derive(Debug)]
pub struct SetLinkMetricOverrideRequest {
    pub ifname: String,
    pub metric: Option<u32>,
    pub responder: Option<Responder<Result<(), Error>>>,
}

// 4. Set a per-adjacency metric override, which outranks the interface
// override when computing the effective metric (§4.6).
#[derive(Debug)]
pub struct SetAdjacencyMetricOverrideRequest {
    pub key: AdjacencyKey,
    pub metric: Option<u32>,
    pub responder: Option<Responder<Result<(), Error>>>,
}

// 5. Read-only dumps: interfaces, adjacencies (per area) or the raw OS
// link inventory last observed by the netlink handler (§4.7).
#[derive(Debug)]
pub enum DumpRequest {
    Interfaces {
        responder: Option<Responder<Vec<InterfaceSnapshot>>>,
    },
    Adjacencies {
        area: String,
        responder: Option<Responder<AdjacencyDatabase>>,
    },
    RawLinks {
        responder: Option<Responder<Vec<NetlinkEvent>>>,
    },
}

// Outcome of applying a mutating control request, telling the instance
// loop what follow-up work (persistence, advertisement) is required.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ControlOutcome {
    // Nothing changed; no persistence or advertisement needed (idempotent
    // no-op per §4.7).
    Unchanged,
    // State changed. The caller must persist `LinkMonitorState` before
    // issuing any advertisement (§4.7 ordering guarantee).
    Changed { throttled: bool },
}

// Sends a response on `responder` if present, ignoring a closed receiver
// (the caller may have dropped its completion handle, e.g. during
// shutdown; §5 "Cancellation").
pub fn respond<T>(responder: Option<Responder<T>>, value: T) {
    if let Some(responder) = responder {
        let _ = responder.send(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn respond_delivers_value_to_receiver() {
        let (tx, rx) = oneshot::channel();
        respond(Some(tx), Ok::<(), Error>(()));
        assert!(rx.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn respond_tolerates_missing_responder() {
        respond::<Result<(), Error>>(None, Ok(()));
    }
}
