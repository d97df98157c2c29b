//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Error;

// Forwarding algorithm used to compute redistributed-prefix forwarding
// metadata. Parsing of the surrounding configuration file is out of scope;
// this type only describes the shape of an already-parsed value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum PrefixForwardingType {
    Ip,
    SrMpls,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum PrefixForwardingAlgorithm {
    ShortestPath,
    KShortestPaths,
}

// Per-area configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AreaConfig {
    pub id: String,
    pub neighbor_regex: String,
    pub interface_regex: String,
}

// Link Monitor configuration, already parsed by the surrounding daemon.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    pub node_id: String,
    pub domain_id: String,
    pub ipv4_enable: bool,
    pub sr_enable: bool,
    pub prefix_forwarding_type: PrefixForwardingType,
    pub prefix_forwarding_algorithm: PrefixForwardingAlgorithm,
    pub use_rtt_metric: bool,
    pub flap_init_backoff: Duration,
    pub flap_max_backoff: Duration,
    pub kv_key_ttl: Duration,
    pub include_regex: Vec<String>,
    pub exclude_regex: Vec<String>,
    pub redistribute_regex: Vec<String>,
    pub areas: Vec<AreaConfig>,
    pub assume_drained: bool,
    pub override_drain_state: bool,
    pub adjacency_hold_time: Duration,
    pub default_metric: u32,
    pub node_label_range: (u32, u32),
}

// Compiled view of `Config`, built once at startup.
pub struct ResolvedConfig {
    pub config: Config,
    pub include_regex: regex::RegexSet,
    pub exclude_regex: regex::RegexSet,
    pub redistribute_regex: regex::RegexSet,
    pub areas: Vec<ResolvedArea>,
}

pub struct ResolvedArea {
    pub id: String,
    pub neighbor_regex: Regex,
    pub interface_regex: Regex,
}

impl ResolvedConfig {
    pub fn new(config: Config) -> Result<ResolvedConfig, Error> {
        if config.areas.is_empty() {
            return Err(Error::NoAreasConfigured);
        }

        let include_regex = regex::RegexSet::new(&config.include_regex)
            .map_err(|e| {
                Error::InvalidAreaConfig("<include>".to_owned(), e.to_string())
            })?;
        let exclude_regex = regex::RegexSet::new(&config.exclude_regex)
            .map_err(|e| {
                Error::InvalidAreaConfig("<exclude>".to_owned(), e.to_string())
            })?;
        let redistribute_regex =
            regex::RegexSet::new(&config.redistribute_regex).map_err(|e| {
                Error::InvalidAreaConfig(
                    "<redistribute>".to_owned(),
                    e.to_string(),
                )
            })?;

        let mut areas = Vec::with_capacity(config.areas.len());
        for area in &config.areas {
            let neighbor_regex = Regex::new(&area.neighbor_regex)
                .map_err(|e| {
                    Error::InvalidAreaConfig(area.id.clone(), e.to_string())
                })?;
            let interface_regex = Regex::new(&area.interface_regex)
                .map_err(|e| {
                    Error::InvalidAreaConfig(area.id.clone(), e.to_string())
                })?;
            areas.push(ResolvedArea {
                id: area.id.clone(),
                neighbor_regex,
                interface_regex,
            });
        }

        Ok(ResolvedConfig {
            config,
            include_regex,
            exclude_regex,
            redistribute_regex,
            areas,
        })
    }

    // Returns whether an interface name is accepted by the include/exclude
    // regex sets (§4.1).
    pub fn interface_accepted(&self, ifname: &str) -> bool {
        self.include_regex.is_match(ifname)
            && !self.exclude_regex.is_match(ifname)
    }

    // Returns whether an interface name matches the redistribute regex set
    // (§4.6).
    pub fn interface_redistributed(&self, ifname: &str) -> bool {
        self.redistribute_regex.is_match(ifname)
    }
}
