//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use holo_utils::task::TimeoutTask;
use tokio::sync::mpsc::UnboundedSender;

//
// Link Monitor task diagram:
//
//                                       +--------------+
//          neighbor events (1x) ->      |              |
//           netlink events (1x) ->      |              | -> (1x) interface-update
//        adjacency hold timer (1x) ->   |              | -> (1x) prefix-update
//   advertise-adjacencies throttle (Nx) |   instance   | -> (Nx) peer-update
//    advertise-iface-addr throttle (1x) |              | -> (1x) log-sample
//     unstable-interface retry (1x) ->  |              |
//        label allocator retry (Nx) ->  |              |
//                                       +--------------+
//                         control surface calls (1x) ->
//

// Link Monitor inter-task message types.
pub mod messages {
    use serde::{Deserialize, Serialize};

    // Fired when the advertise-adjacencies throttle for an area expires
    // (§4.6).
    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct AdvertiseAdjacenciesMsg {
        pub area: String,
    }

    // Fired when the advertise-interface-address throttle expires (§4.6).
    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct AdvertiseIfaceAddrMsg {}

    // Fired once the initial adjacency hold timer expires (§4.8).
    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct HoldTimerExpiredMsg {}

    // Fired when the unstable-interface retry timer expires, requesting a
    // re-check of interface usability (§4.1 "getRetryTimeOnUnstableInterfaces").
    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct InterfaceRetryMsg {}

    // Fired when a node-label allocator retry should be attempted (§4.8).
    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct LabelRetryMsg {
        pub area: String,
    }
}

// Arms the advertise-adjacencies throttle for a single area.
pub(crate) fn advertise_adjacencies_throttle(
    window: Duration,
    area: String,
    txp: UnboundedSender<messages::AdvertiseAdjacenciesMsg>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        TimeoutTask::new(window, move || async move {
            let _ = txp.send(messages::AdvertiseAdjacenciesMsg { area });
        })
    }
    #[cfg(feature = "testing")]
    {
        let _ = (window, area, txp);
        TimeoutTask {}
    }
}

// Arms the advertise-interface-address throttle.
pub(crate) fn advertise_iface_addr_throttle(
    window: Duration,
    txp: UnboundedSender<messages::AdvertiseIfaceAddrMsg>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        TimeoutTask::new(window, move || async move {
            let _ = txp.send(messages::AdvertiseIfaceAddrMsg {});
        })
    }
    #[cfg(feature = "testing")]
    {
        let _ = (window, txp);
        TimeoutTask {}
    }
}

// Arms the initial adjacency hold timer (§4.8).
pub(crate) fn adjacency_hold_timer(
    hold_time: Duration,
    txp: UnboundedSender<messages::HoldTimerExpiredMsg>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        TimeoutTask::new(hold_time, move || async move {
            let _ = txp.send(messages::HoldTimerExpiredMsg {});
        })
    }
    #[cfg(feature = "testing")]
    {
        let _ = (hold_time, txp);
        TimeoutTask {}
    }
}

// Arms a one-shot re-fire of the interface-address throttle at the moment
// the earliest backoff-held interface becomes usable again (§4.6).
pub(crate) fn interface_retry_timer(
    retry_after: Duration,
    txp: UnboundedSender<messages::InterfaceRetryMsg>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        TimeoutTask::new(retry_after, move || async move {
            let _ = txp.send(messages::InterfaceRetryMsg {});
        })
    }
    #[cfg(feature = "testing")]
    {
        let _ = (retry_after, txp);
        TimeoutTask {}
    }
}

// Arms a node-label allocator retry (§4.8).
pub(crate) fn label_retry_timer(
    retry_after: Duration,
    area: String,
    txp: UnboundedSender<messages::LabelRetryMsg>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        TimeoutTask::new(retry_after, move || async move {
            let _ = txp.send(messages::LabelRetryMsg { area });
        })
    }
    #[cfg(feature = "testing")]
    {
        let _ = (retry_after, area, txp);
        TimeoutTask {}
    }
}
