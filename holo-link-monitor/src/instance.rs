//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

use crate::adjacency::Table as AdjacencyTable;
use crate::advertise::{
    self, AdjacencyDatabase, InterfaceSnapshot, PrefixOp, PrefixTracker,
};
use crate::config::ResolvedConfig;
use crate::control::{
    self, ControlOutcome, DumpRequest, Request as ControlRequest, Responder,
    respond,
};
use crate::debug::Debug;
use crate::error::Error;
use crate::interface::Table as InterfaceTable;
use crate::kv::KvStoreClient;
use crate::label::{AllocationResult, Allocator as LabelAllocator};
use crate::neighbor::{NeighborEvent, NeighborEventOutcome};
use crate::netlink::{self, NetlinkEvent, NetlinkEventOutcome};
use crate::peer::{PeerDelta, Reconciler};
use crate::state::LinkMonitorState;
use crate::store::PersistentStore;
use crate::tasks::{self, messages::*};
use holo_utils::task::TimeoutTask;

// Well-known key under which `LinkMonitorState` is persisted (§6
// "Persistent store record").
pub const PERSISTENT_STORE_KEY: &str = "link-monitor-state";

// How long to wait before retrying a node-label allocation after the
// configured range was found exhausted (§4.8).
const LABEL_RETRY_INTERVAL: Duration = Duration::from_secs(30);

// How many raw netlink events the Control Surface's "raw OS link list"
// dump retains (§4.7 item 5).
const RAW_LINK_LOG_CAPACITY: usize = 256;

// A peer-reconciliation result destined for the peer-update queue (§6
// "Peer-update queue").
#[derive(Clone, Debug)]
pub struct PeerUpdate {
    pub area: String,
    pub delta: PeerDelta,
}

// A structured event record destined for the log-sample queue (§6
// "Log-sample queue").
#[derive(Clone, Debug)]
pub struct LogSample {
    pub message: String,
    pub at: chrono::DateTime<Utc>,
}

fn log_sample(message: impl Into<String>) -> LogSample {
    LogSample {
        message: message.into(),
        at: Utc::now(),
    }
}

// Outbound queues (§6 "Outbound queues").
pub struct OutputChannelsTx {
    pub interface_update: UnboundedSender<Vec<InterfaceSnapshot>>,
    pub prefix_update: UnboundedSender<Vec<PrefixOp>>,
    pub peer_update: UnboundedSender<PeerUpdate>,
    pub log_sample: UnboundedSender<LogSample>,
}

pub struct OutputChannelsRx {
    pub interface_update: UnboundedReceiver<Vec<InterfaceSnapshot>>,
    pub prefix_update: UnboundedReceiver<Vec<PrefixOp>>,
    pub peer_update: UnboundedReceiver<PeerUpdate>,
    pub log_sample: UnboundedReceiver<LogSample>,
}

fn output_channels() -> (OutputChannelsTx, OutputChannelsRx) {
    let (interface_update_tx, interface_update_rx) = mpsc::unbounded_channel();
    let (prefix_update_tx, prefix_update_rx) = mpsc::unbounded_channel();
    let (peer_update_tx, peer_update_rx) = mpsc::unbounded_channel();
    let (log_sample_tx, log_sample_rx) = mpsc::unbounded_channel();
    (
        OutputChannelsTx {
            interface_update: interface_update_tx,
            prefix_update: prefix_update_tx,
            peer_update: peer_update_tx,
            log_sample: log_sample_tx,
        },
        OutputChannelsRx {
            interface_update: interface_update_rx,
            prefix_update: prefix_update_rx,
            peer_update: peer_update_rx,
            log_sample: log_sample_rx,
        },
    )
}

// External handle used by other threads to submit work to the Link
// Monitor's event loop and await its completion (§5 "Scheduling model").
// Cloning is cheap: every clone shares the same underlying queues.
#[derive(Clone)]
pub struct Handle {
    neighbor_event: UnboundedSender<NeighborEvent>,
    netlink_event: UnboundedSender<NetlinkEvent>,
    control: UnboundedSender<ControlRequest>,
}

impl Handle {
    pub fn neighbor_event(&self, event: NeighborEvent) {
        let _ = self.neighbor_event.send(event);
    }

    pub fn netlink_event(&self, event: NetlinkEvent) {
        let _ = self.netlink_event.send(event);
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(Option<Responder<T>>) -> ControlRequest,
    ) -> Result<T, Error> {
        let (tx, rx) = oneshot::channel();
        self.control
            .send(build(Some(tx)))
            .map_err(|_| Error::ShuttingDown)?;
        rx.await.map_err(|_| Error::ShuttingDown)
    }

    pub async fn set_node_overload(&self, overload: bool) -> Result<(), Error> {
        self.call(|responder| {
            ControlRequest::SetNodeOverload(control::SetNodeOverloadRequest {
                overload,
                responder,
            })
        })
        .await?
    }

    pub async fn set_interface_overload(
        &self,
        ifname: String,
        overload: bool,
    ) -> Result<(), Error> {
        self.call(|responder| {
            ControlRequest::SetInterfaceOverload(
                control::SetInterfaceOverloadRequest {
                    ifname,
                    overload,
                    responder,
                },
            )
        })
        .await?
    }

    pub async fn set_link_metric_override(
        &self,
        ifname: String,
        metric: Option<u32>,
    ) -> Result<(), Error> {
        self.call(|responder| {
            ControlRequest::SetLinkMetricOverride(
                control::SetLinkMetricOverrideRequest {
                    ifname,
                    metric,
                    responder,
                },
            )
        })
        .await?
    }

    pub async fn set_adjacency_metric_override(
        &self,
        key: crate::adjacency::AdjacencyKey,
        metric: Option<u32>,
    ) -> Result<(), Error> {
        self.call(|responder| {
            ControlRequest::SetAdjacencyMetricOverride(
                control::SetAdjacencyMetricOverrideRequest {
                    key,
                    metric,
                    responder,
                },
            )
        })
        .await?
    }

    pub async fn dump_interfaces(&self) -> Vec<InterfaceSnapshot> {
        let (tx, rx) = oneshot::channel();
        let _ = self.control.send(ControlRequest::Dump(DumpRequest::Interfaces {
            responder: Some(tx),
        }));
        rx.await.unwrap_or_default()
    }

    pub async fn dump_adjacencies(&self, area: String) -> Option<AdjacencyDatabase> {
        let (tx, rx) = oneshot::channel();
        let _ = self.control.send(ControlRequest::Dump(DumpRequest::Adjacencies {
            area,
            responder: Some(tx),
        }));
        rx.await.ok()
    }

    pub async fn dump_raw_links(&self) -> Vec<NetlinkEvent> {
        let (tx, rx) = oneshot::channel();
        let _ = self.control.send(ControlRequest::Dump(DumpRequest::RawLinks {
            responder: Some(tx),
        }));
        rx.await.unwrap_or_default()
    }
}

struct InputChannelsRx {
    neighbor_event: UnboundedReceiver<NeighborEvent>,
    netlink_event: UnboundedReceiver<NetlinkEvent>,
    control: UnboundedReceiver<ControlRequest>,
    advertise_adjacencies: UnboundedReceiver<AdvertiseAdjacenciesMsg>,
    advertise_iface_addr: UnboundedReceiver<AdvertiseIfaceAddrMsg>,
    hold_timer_expired: UnboundedReceiver<HoldTimerExpiredMsg>,
    interface_retry: UnboundedReceiver<InterfaceRetryMsg>,
    label_retry: UnboundedReceiver<LabelRetryMsg>,
}

// The Link Monitor's single-threaded cooperative event loop state (§5).
// All fields here are owned exclusively by the loop that calls `run()`;
// nothing outside this struct mutates C1, C2, the peer map or the
// persistent-state cache, so no locks are required.
pub struct Master {
    node_id: String,
    config: ResolvedConfig,

    interfaces: InterfaceTable,
    adjacencies: AdjacencyTable,
    reconciler: Reconciler,
    prefix_tracker: PrefixTracker,
    state: LinkMonitorState,
    label_allocators: BTreeMap<String, LabelAllocator>,
    raw_link_log: VecDeque<NetlinkEvent>,

    kv: Arc<dyn KvStoreClient>,
    store: Arc<dyn PersistentStore>,

    hold_timer: Option<TimeoutTask>,
    hold_fired: bool,
    adjacency_throttles: BTreeMap<String, TimeoutTask>,
    iface_addr_throttle: Option<TimeoutTask>,
    interface_retry_task: Option<TimeoutTask>,

    advertise_adjacencies_tx: UnboundedSender<AdvertiseAdjacenciesMsg>,
    advertise_iface_addr_tx: UnboundedSender<AdvertiseIfaceAddrMsg>,
    interface_retry_tx: UnboundedSender<InterfaceRetryMsg>,
    label_retry_tx: UnboundedSender<LabelRetryMsg>,

    out: OutputChannelsTx,
    rx: InputChannelsRx,
}

impl Master {
    // Builds a new Link Monitor instance and its external `Handle`. `state`
    // must already reflect the startup drain policy (see
    // `LinkMonitorState::on_startup`); the persistent store itself is read
    // by the caller before construction, mirroring how `holo-daemon` loads
    // its rollback database ahead of spawning protocol instances.
    pub fn new(
        node_id: String,
        config: ResolvedConfig,
        state: LinkMonitorState,
        kv: Arc<dyn KvStoreClient>,
        store: Arc<dyn PersistentStore>,
    ) -> (Master, Handle, OutputChannelsRx) {
        let (neighbor_event_tx, neighbor_event_rx) = mpsc::unbounded_channel();
        let (netlink_event_tx, netlink_event_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (advertise_adjacencies_tx, advertise_adjacencies_rx) =
            mpsc::unbounded_channel();
        let (advertise_iface_addr_tx, advertise_iface_addr_rx) =
            mpsc::unbounded_channel();
        let (hold_timer_tx, hold_timer_rx) = mpsc::unbounded_channel();
        let (interface_retry_tx, interface_retry_rx) = mpsc::unbounded_channel();
        let (label_retry_tx, label_retry_rx) = mpsc::unbounded_channel();
        let (out, out_rx) = output_channels();

        let interfaces = InterfaceTable::new(
            config.config.flap_init_backoff,
            config.config.flap_max_backoff,
        );

        let hold_timer = Some(tasks::adjacency_hold_timer(
            config.config.adjacency_hold_time,
            hold_timer_tx,
        ));

        let master = Master {
            node_id,
            config,
            interfaces,
            adjacencies: AdjacencyTable::new(),
            reconciler: Reconciler::new(),
            prefix_tracker: PrefixTracker::new(),
            state,
            label_allocators: BTreeMap::new(),
            raw_link_log: VecDeque::with_capacity(RAW_LINK_LOG_CAPACITY),
            kv,
            store,
            hold_timer,
            hold_fired: false,
            adjacency_throttles: BTreeMap::new(),
            iface_addr_throttle: None,
            interface_retry_task: None,
            advertise_adjacencies_tx,
            advertise_iface_addr_tx,
            interface_retry_tx,
            label_retry_tx,
            out,
            rx: InputChannelsRx {
                neighbor_event: neighbor_event_rx,
                netlink_event: netlink_event_rx,
                control: control_rx,
                advertise_adjacencies: advertise_adjacencies_rx,
                advertise_iface_addr: advertise_iface_addr_rx,
                hold_timer_expired: hold_timer_rx,
                interface_retry: interface_retry_rx,
                label_retry: label_retry_rx,
            },
        };
        let handle = Handle {
            neighbor_event: neighbor_event_tx,
            netlink_event: netlink_event_tx,
            control: control_tx,
        };

        (master, handle, out_rx)
    }

    // Runs the event loop until every external sender has been dropped
    // (the natural shutdown signal: once no `Handle` remains, the
    // neighbor/netlink/control queues all close).
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                Some(msg) = self.rx.hold_timer_expired.recv() => {
                    let _ = msg;
                    self.handle_hold_timer_expired().await;
                }
                Some(event) = self.rx.neighbor_event.recv() => {
                    self.handle_neighbor_event(event).await;
                }
                Some(event) = self.rx.netlink_event.recv() => {
                    self.handle_netlink_event(event).await;
                }
                Some(request) = self.rx.control.recv() => {
                    self.handle_control(request).await;
                }
                Some(msg) = self.rx.advertise_adjacencies.recv() => {
                    self.handle_advertise_adjacencies(msg.area).await;
                }
                Some(_msg) = self.rx.advertise_iface_addr.recv() => {
                    self.handle_advertise_iface_addr().await;
                }
                Some(_msg) = self.rx.interface_retry.recv() => {
                    self.interface_retry_task = None;
                    self.schedule_iface_addr_throttle();
                }
                Some(msg) = self.rx.label_retry.recv() => {
                    self.start_label_allocation(msg.area).await;
                }
                else => break,
            }
        }
        self.stop().await;
    }

    // Drains pending throttles and timers and fails any control request
    // still queued, so no completion handle is left dangling (§5
    // "Cancellation").
    async fn stop(mut self) {
        self.hold_timer = None;
        self.adjacency_throttles.clear();
        self.iface_addr_throttle = None;
        self.interface_retry_task = None;
        self.label_allocators.clear();

        while let Ok(request) = self.rx.control.try_recv() {
            fail_control_request(request);
        }
    }

    // ===== neighbor events (§4.4) =====

    async fn handle_neighbor_event(&mut self, event: NeighborEvent) {
        let now = Utc::now();
        let area = event.area.clone();
        let remote_node = event.remote_node.clone();
        let kind = event.kind;
        let outcome =
            crate::neighbor::process(&mut self.adjacencies, &self.config, &event, now);

        let _ = self.out.log_sample.send(log_sample(format!(
            "neighbor event kind={kind:?} peer={remote_node} area={area}"
        )));

        if !self.hold_fired {
            // Accumulate into C2 only; nothing is announced until the
            // initial hold timer fires (§4.8).
            return;
        }

        match outcome {
            NeighborEventOutcome::Up { area, peer, .. } => {
                let mut up_peers = BTreeMap::new();
                up_peers.insert(remote_node, peer);
                let delta = self.reconcile_area(&area, &up_peers);
                if !delta.is_empty() {
                    let _ = self.out.peer_update.send(PeerUpdate { area: area.clone(), delta });
                }
                self.schedule_adjacency_throttle(area);
            }
            NeighborEventOutcome::Down { area } => {
                let delta = self.reconcile_area(&area, &BTreeMap::new());
                if !delta.is_empty() {
                    let _ = self.out.peer_update.send(PeerUpdate { area: area.clone(), delta });
                }
                self.schedule_adjacency_throttle(area);
            }
            NeighborEventOutcome::RttChange => {
                self.schedule_adjacency_throttle(area);
            }
            NeighborEventOutcome::Restarting => {}
        }
    }

    fn reconcile_area(
        &mut self,
        area: &str,
        up_peers: &BTreeMap<String, crate::adjacency::PeerSpec>,
    ) -> PeerDelta {
        let now = Instant::now();
        let interfaces = &self.interfaces;
        let usable = |ifname: &str| {
            interfaces.get(ifname).map(|e| e.usable(now)).unwrap_or(false)
        };
        self.reconciler
            .reconcile(area, &self.adjacencies, usable, up_peers)
    }

    // ===== netlink events (§4.5) =====

    async fn handle_netlink_event(&mut self, event: NetlinkEvent) {
        if self.raw_link_log.len() >= RAW_LINK_LOG_CAPACITY {
            self.raw_link_log.pop_front();
        }
        self.raw_link_log.push_back(event.clone());

        let now = Instant::now();
        let outcome =
            netlink::process(&mut self.interfaces, &self.config, &event, now);
        if outcome == NetlinkEventOutcome::AdvertiseNeeded {
            self.schedule_iface_addr_throttle();
        }
    }

    // ===== throttle fires (§4.6) =====

    fn schedule_adjacency_throttle(&mut self, area: String) {
        if self.adjacency_throttles.contains_key(&area) {
            return;
        }
        let task = tasks::advertise_adjacencies_throttle(
            THROTTLE_WINDOW,
            area.clone(),
            self.advertise_adjacencies_tx.clone(),
        );
        self.adjacency_throttles.insert(area, task);
    }

    fn schedule_iface_addr_throttle(&mut self) {
        if self.iface_addr_throttle.is_some() {
            return;
        }
        self.iface_addr_throttle = Some(tasks::advertise_iface_addr_throttle(
            THROTTLE_WINDOW,
            self.advertise_iface_addr_tx.clone(),
        ));
    }

    async fn handle_advertise_adjacencies(&mut self, area: String) {
        self.adjacency_throttles.remove(&area);
        self.publish_adjacency_db(&area).await;
    }

    async fn handle_advertise_iface_addr(&mut self) {
        self.iface_addr_throttle = None;
        let now = Instant::now();

        let snapshot = advertise::build_interface_snapshot(
            &self.interfaces,
            now,
            self.config.config.default_metric,
        );
        let _ = self.out.interface_update.send(snapshot);

        let ops = self.prefix_tracker.reconcile(
            &self.interfaces,
            &self.config,
            "link-monitor",
        );
        if !ops.is_empty() {
            let _ = self.out.prefix_update.send(ops);
        }

        if let Some(retry_after) = self.interfaces.min_backoff_remaining(now)
            && self.interface_retry_task.is_none()
        {
            self.interface_retry_task = Some(tasks::interface_retry_timer(
                retry_after,
                self.interface_retry_tx.clone(),
            ));
        }
    }

    async fn publish_adjacency_db(&mut self, area: &str) {
        let db = advertise::build_adjacency_database(
            &self.node_id,
            area,
            &self.adjacencies,
            &self.interfaces,
            &self.state,
        );
        let key = format!("link-monitor/{}/adjacency-db/{area}", self.node_id);
        let payload = match serde_json::to_vec(&db) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(%error, "failed to serialize adjacency database");
                return;
            }
        };
        if let Err(error) = self
            .kv
            .put(&key, payload, self.config.config.kv_key_ttl, true)
            .await
        {
            error.log();
        }
    }

    async fn publish_all_areas(&mut self) {
        let area_ids: Vec<String> =
            self.config.areas.iter().map(|a| a.id.clone()).collect();
        for area in area_ids {
            self.publish_adjacency_db(&area).await;
        }
    }

    // ===== initial hold & node-label allocation (§4.8) =====

    async fn handle_hold_timer_expired(&mut self) {
        self.hold_timer = None;
        self.hold_fired = true;
        Debug::HoldTimerExpired.log();

        let area_ids: Vec<String> =
            self.config.areas.iter().map(|a| a.id.clone()).collect();
        for area in &area_ids {
            let delta = self.reconcile_area(area, &BTreeMap::new());
            if !delta.is_empty() {
                let _ = self.out.peer_update.send(PeerUpdate {
                    area: area.clone(),
                    delta,
                });
            }
            self.publish_adjacency_db(area).await;
        }
        for area in area_ids {
            self.start_label_allocation(area).await;
        }
    }

    async fn start_label_allocation(&mut self, area: String) {
        let range = self.config.config.node_label_range;
        let preferred = self.state.node_labels.get(&area).copied();
        match LabelAllocator::try_allocate(
            self.kv.as_ref(),
            &self.node_id,
            &area,
            range,
            preferred,
        )
        .await
        {
            Ok(AllocationResult::Allocated(label)) => {
                if self.state.node_labels.get(&area) != Some(&label) {
                    let mut new_state = self.state.clone();
                    new_state.node_labels.insert(area.clone(), label);
                    match self.store.save(PERSISTENT_STORE_KEY, &new_state).await {
                        Ok(()) => self.state = new_state,
                        Err(error) => error.log(),
                    }
                }
                self.label_allocators.entry(area).or_default().cancel_retry();
            }
            Ok(AllocationResult::RangeExhausted) => {
                let task = tasks::label_retry_timer(
                    LABEL_RETRY_INTERVAL,
                    area.clone(),
                    self.label_retry_tx.clone(),
                );
                self.label_allocators
                    .entry(area)
                    .or_default()
                    .set_retry_task(Some(task));
            }
            Err(error) => error.log(),
        }
    }

    // ===== control surface (§4.7) =====

    async fn handle_control(&mut self, request: ControlRequest) {
        match request {
            ControlRequest::SetNodeOverload(req) => {
                let outcome = self.apply_node_overload(req.overload).await;
                match outcome {
                    Ok(ControlOutcome::Changed { .. }) => {
                        respond(req.responder, Ok(()));
                        self.publish_all_areas().await;
                    }
                    Ok(ControlOutcome::Unchanged) => {
                        respond(req.responder, Ok(()));
                    }
                    Err(error) => {
                        error.log();
                        respond(req.responder, Err(error));
                    }
                }
            }
            ControlRequest::SetInterfaceOverload(req) => {
                let ifname = req.ifname.clone();
                match self.apply_interface_overload(&ifname, req.overload).await {
                    Ok(ControlOutcome::Changed { .. }) => {
                        respond(req.responder, Ok(()));
                        self.schedule_iface_addr_throttle();
                        self.schedule_adjacency_throttles_for_interface(&ifname);
                    }
                    Ok(ControlOutcome::Unchanged) => respond(req.responder, Ok(())),
                    Err(error) => {
                        error.log();
                        respond(req.responder, Err(error));
                    }
                }
            }
            ControlRequest::SetLinkMetricOverride(req) => {
                let ifname = req.ifname.clone();
                match self
                    .apply_link_metric_override(&ifname, req.metric)
                    .await
                {
                    Ok(ControlOutcome::Changed { .. }) => {
                        respond(req.responder, Ok(()));
                        self.schedule_adjacency_throttles_for_interface(&ifname);
                    }
                    Ok(ControlOutcome::Unchanged) => respond(req.responder, Ok(())),
                    Err(error) => {
                        error.log();
                        respond(req.responder, Err(error));
                    }
                }
            }
            ControlRequest::SetAdjacencyMetricOverride(req) => {
                let area = self
                    .adjacencies
                    .get(&req.key)
                    .map(|value| value.area.clone());
                match self
                    .apply_adjacency_metric_override(&req.key, req.metric)
                    .await
                {
                    Ok(ControlOutcome::Changed { .. }) => {
                        respond(req.responder, Ok(()));
                        if let Some(area) = area {
                            self.schedule_adjacency_throttle(area);
                        }
                    }
                    Ok(ControlOutcome::Unchanged) => respond(req.responder, Ok(())),
                    Err(error) => {
                        error.log();
                        respond(req.responder, Err(error));
                    }
                }
            }
            ControlRequest::Dump(dump) => self.handle_dump(dump),
        }
    }

    fn handle_dump(&self, dump: DumpRequest) {
        match dump {
            DumpRequest::Interfaces { responder } => {
                let snapshot = advertise::build_interface_snapshot(
                    &self.interfaces,
                    Instant::now(),
                    self.config.config.default_metric,
                );
                respond(responder, snapshot);
            }
            DumpRequest::Adjacencies { area, responder } => {
                let db = advertise::build_adjacency_database(
                    &self.node_id,
                    &area,
                    &self.adjacencies,
                    &self.interfaces,
                    &self.state,
                );
                respond(responder, db);
            }
            DumpRequest::RawLinks { responder } => {
                let events: Vec<NetlinkEvent> =
                    self.raw_link_log.iter().cloned().collect();
                respond(responder, events);
            }
        }
    }

    async fn apply_node_overload(
        &mut self,
        overload: bool,
    ) -> Result<ControlOutcome, Error> {
        if self.state.node_overload == overload {
            return Ok(ControlOutcome::Unchanged);
        }
        let mut new_state = self.state.clone();
        new_state.node_overload = overload;
        self.store.save(PERSISTENT_STORE_KEY, &new_state).await?;
        self.state = new_state;
        Debug::NodeOverloadChange(overload).log();
        Ok(ControlOutcome::Changed { throttled: false })
    }

    async fn apply_interface_overload(
        &mut self,
        ifname: &str,
        overload: bool,
    ) -> Result<ControlOutcome, Error> {
        let entry = self
            .interfaces
            .get(ifname)
            .ok_or_else(|| Error::UnknownInterface(ifname.to_owned()))?;
        if entry.overload == overload {
            return Ok(ControlOutcome::Unchanged);
        }
        let mut new_state = self.state.clone();
        new_state
            .interface_overload
            .insert(ifname.to_owned(), overload);
        self.store.save(PERSISTENT_STORE_KEY, &new_state).await?;
        self.state = new_state;
        self.interfaces.set_overload(ifname, overload)?;
        Debug::InterfaceOverloadChange(ifname, overload).log();
        Ok(ControlOutcome::Changed { throttled: true })
    }

    async fn apply_link_metric_override(
        &mut self,
        ifname: &str,
        metric: Option<u32>,
    ) -> Result<ControlOutcome, Error> {
        let entry = self
            .interfaces
            .get(ifname)
            .ok_or_else(|| Error::UnknownInterface(ifname.to_owned()))?;
        if entry.metric_override == metric {
            return Ok(ControlOutcome::Unchanged);
        }
        let mut new_state = self.state.clone();
        match metric {
            Some(metric) => {
                new_state
                    .interface_metric_override
                    .insert(ifname.to_owned(), metric);
            }
            None => {
                new_state.interface_metric_override.remove(ifname);
            }
        }
        self.store.save(PERSISTENT_STORE_KEY, &new_state).await?;
        self.state = new_state;
        self.interfaces.set_metric_override(ifname, metric)?;
        Ok(ControlOutcome::Changed { throttled: true })
    }

    async fn apply_adjacency_metric_override(
        &mut self,
        key: &crate::adjacency::AdjacencyKey,
        metric: Option<u32>,
    ) -> Result<ControlOutcome, Error> {
        let entry = self
            .adjacencies
            .get(key)
            .ok_or_else(|| Error::UnknownAdjacency(key.clone()))?;
        if entry.metric_override == metric {
            return Ok(ControlOutcome::Unchanged);
        }
        let mut new_state = self.state.clone();
        match metric {
            Some(metric) => {
                new_state
                    .adjacency_metric_override
                    .insert(key.clone(), metric);
            }
            None => {
                new_state.adjacency_metric_override.remove(key);
            }
        }
        self.store.save(PERSISTENT_STORE_KEY, &new_state).await?;
        self.state = new_state;
        self.adjacencies.set_metric_override(key, metric)?;
        Ok(ControlOutcome::Changed { throttled: true })
    }

    fn schedule_adjacency_throttles_for_interface(&mut self, ifname: &str) {
        let areas: Vec<String> = self
            .adjacencies
            .iter()
            .filter(|(key, _)| key.local_ifname == ifname)
            .map(|(_, value)| value.area.clone())
            .collect();
        for area in areas {
            self.schedule_adjacency_throttle(area);
        }
    }
}

// Batch window for the two advertisement throttles (§5 "Throttles": "a
// few tens of milliseconds").
const THROTTLE_WINDOW: Duration = Duration::from_millis(50);

// Fails a control request's completion handle with `ShuttingDown` (§5
// "Cancellation").
fn fail_control_request(request: ControlRequest) {
    match request {
        ControlRequest::SetNodeOverload(req) => {
            respond(req.responder, Err(Error::ShuttingDown));
        }
        ControlRequest::SetInterfaceOverload(req) => {
            respond(req.responder, Err(Error::ShuttingDown));
        }
        ControlRequest::SetLinkMetricOverride(req) => {
            respond(req.responder, Err(Error::ShuttingDown));
        }
        ControlRequest::SetAdjacencyMetricOverride(req) => {
            respond(req.responder, Err(Error::ShuttingDown));
        }
        ControlRequest::Dump(dump) => match dump {
            DumpRequest::Interfaces { responder } => {
                respond(responder, Vec::new());
            }
            DumpRequest::Adjacencies { responder, .. } => {
                if let Some(responder) = responder {
                    drop(responder);
                }
            }
            DumpRequest::RawLinks { responder } => {
                respond(responder, Vec::new());
            }
        },
    }
}
