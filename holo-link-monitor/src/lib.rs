//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![cfg_attr(
    feature = "testing",
    allow(dead_code, unused_variables, unused_imports)
)]
#![feature(let_chains)]

pub mod adjacency;
pub mod advertise;
pub mod config;
pub mod control;
pub mod debug;
pub mod error;
pub mod instance;
pub mod interface;
pub mod kv;
pub mod label;
pub mod neighbor;
pub mod netlink;
pub mod peer;
pub mod state;
pub mod store;
pub mod tasks;

use std::sync::Arc;

use crate::config::ResolvedConfig;
use crate::instance::{Handle, Master, OutputChannelsRx};
use crate::kv::KvStoreClient;
use crate::state::LinkMonitorState;
use crate::store::PersistentStore;

// Well-known key under which `LinkMonitorState` is persisted, shared with
// the instance module so tests and callers agree on it.
pub use crate::instance::PERSISTENT_STORE_KEY;

// Spawns the Link Monitor's event loop on the current Tokio runtime and
// returns the `Handle` used to feed it neighbor/netlink events and
// control-surface requests, plus the receiver halves of its outbound
// queues. Mirrors `holo_interface::start()`: construction (including the
// persisted-state load and startup drain policy) happens before the loop
// is spawned, so a caller observing an error from `store.load()` can
// decide whether to proceed with a blank `LinkMonitorState`.
pub async fn start(
    node_id: String,
    config: ResolvedConfig,
    assume_drained: bool,
    override_drain_state: bool,
    kv: Arc<dyn KvStoreClient>,
    store: Arc<dyn PersistentStore>,
) -> Result<(Handle, OutputChannelsRx), crate::error::Error> {
    let loaded = store.load(PERSISTENT_STORE_KEY).await?;
    let state =
        LinkMonitorState::on_startup(loaded, assume_drained, override_drain_state);

    let (master, handle, out_rx) =
        Master::new(node_id, config, state, kv, store);

    tokio::spawn(master.run());

    Ok((handle, out_rx))
}
