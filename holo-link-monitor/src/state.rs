//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::adjacency::AdjacencyKey;

// Persisted Link Monitor state (§3, §6). Loaded once at startup and
// rewritten on every operator change.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct LinkMonitorState {
    pub node_overload: bool,
    pub interface_overload: BTreeMap<String, bool>,
    pub interface_metric_override: BTreeMap<String, u32>,
    pub adjacency_metric_override: BTreeMap<AdjacencyKey, u32>,
    pub node_labels: BTreeMap<String, u32>,
}

impl LinkMonitorState {
    // Applies the startup drain policy (§6 "Startup drain policy").
    //
    // If no persisted state exists, `loaded` is `None` and the returned
    // state's overload flag is seeded from `assume_drained`. If
    // `override_drain_state` is set, the overload flag is forced to
    // `assume_drained` regardless of any persisted value.
    pub fn on_startup(
        loaded: Option<LinkMonitorState>,
        assume_drained: bool,
        override_drain_state: bool,
    ) -> LinkMonitorState {
        let mut state = loaded.unwrap_or_else(|| LinkMonitorState {
            node_overload: assume_drained,
            ..Default::default()
        });
        if override_drain_state {
            state.node_overload = assume_drained;
        }
        state
    }
}
