//! Event-driven bus simulator for the boot process tests.
//!
//! The simulator plays the transport the crate expects behind its trait
//! seams: SDO transfers complete after a configurable latency, silent nodes
//! abort with a timeout, alarms fire at their due time and heartbeat
//! producers come alive a while after the network reset. A binary heap keeps
//! the virtual timeline; [`drive`] pops events in order and feeds them back
//! into the [`BootManager`] like a real event loop would.

use canboot_rs::{
    AlarmId, AlarmService, BootManager, CanError, Clock, LocalDictionary, NmtCommand, NmtMaster,
    NodeId, NodeState, SdoClient, SdoReadStatus, SdoWriteStatus,
};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

/// SDO abort code: protocol timed out (node never answered).
pub const SDO_ABORT_TIMEOUT: u32 = 0x0504_0000;
/// SDO abort code: object does not exist in the object dictionary.
pub const SDO_ABORT_NO_OBJECT: u32 = 0x0602_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SimEvent {
    /// An SDO transfer with the node reached its outcome.
    SdoComplete(NodeId),
    /// A registered alarm expired.
    AlarmExpired(AlarmId),
    /// The node's first heartbeat arrived.
    NodeAlive(NodeId),
}

/// One simulated remote node.
pub struct SimNode {
    /// The node's remote object dictionary; SDO reads and writes hit this.
    pub dictionary: BTreeMap<(u16, u8), u32>,
    /// A silent node never answers; every transfer times out.
    pub silent: bool,
    /// Latency of an answered SDO transfer.
    pub response_delay_us: u64,
    /// If set, the node starts producing heartbeats this long after a reset.
    pub heartbeat_delay_us: Option<u64>,
    pub state: NodeState,
}

impl SimNode {
    fn new() -> Self {
        Self {
            dictionary: BTreeMap::new(),
            silent: false,
            response_delay_us: 1_000,
            heartbeat_delay_us: None,
            state: NodeState::Unknown,
        }
    }
}

enum TransferKind {
    Read,
    Write,
}

struct PendingTransfer {
    kind: TransferKind,
    ready_at_us: u64,
    read_result: Result<u32, u32>,
}

/// The simulated CAN interface handed to the boot core.
pub struct SimBus {
    pub local_od: BTreeMap<(u16, u8), u32>,
    pub local_id: NodeId,
    pub local_state: NodeState,
    pub nodes: BTreeMap<u8, SimNode>,
    /// Every NMT command sent, in order.
    pub nmt_log: Vec<(Option<NodeId>, NmtCommand)>,
    /// Every SDO read issued, for attempt counting.
    pub read_requests: Vec<(NodeId, u16, u8)>,
    /// How long a transfer to a silent node takes to abort.
    pub silent_timeout_us: u64,
    now_us: u64,
    seq: u64,
    events: BinaryHeap<Reverse<(u64, u64, SimEvent)>>,
    pending: BTreeMap<NodeId, PendingTransfer>,
}

impl SimBus {
    pub fn new(local_id: NodeId) -> Self {
        Self {
            local_od: BTreeMap::new(),
            local_id,
            local_state: NodeState::PreOperational,
            nodes: BTreeMap::new(),
            nmt_log: Vec::new(),
            read_requests: Vec::new(),
            silent_timeout_us: 500_000,
            now_us: 0,
            seq: 0,
            events: BinaryHeap::new(),
            pending: BTreeMap::new(),
        }
    }

    /// Registers a remote node and returns it for configuration.
    pub fn add_node(&mut self, id: NodeId) -> &mut SimNode {
        self.nodes.entry(id.0).or_insert_with(SimNode::new)
    }

    pub fn set_local(&mut self, index: u16, subindex: u8, value: u32) {
        self.local_od.insert((index, subindex), value);
    }

    fn schedule(&mut self, delay_us: u64, event: SimEvent) {
        self.seq += 1;
        self.events
            .push(Reverse((self.now_us + delay_us, self.seq, event)));
    }

    fn pop_event(&mut self) -> Option<(u64, SimEvent)> {
        self.events.pop().map(|Reverse((due, _, event))| (due, event))
    }

    fn advance_to(&mut self, due_us: u64) {
        if due_us > self.now_us {
            self.now_us = due_us;
        }
    }

    fn mark_alive(&mut self, node: NodeId) {
        if let Some(sim) = self.nodes.get_mut(&node.0) {
            if sim.state == NodeState::Unknown {
                sim.state = NodeState::PreOperational;
            }
        }
    }

    fn reset_node(&mut self, id: u8) {
        let mut alive_after = None;
        if let Some(sim) = self.nodes.get_mut(&id) {
            if !sim.silent {
                sim.state = NodeState::Unknown;
                alive_after = sim.heartbeat_delay_us;
            }
        }
        if let (Some(delay), Ok(node)) = (alive_after, NodeId::try_from(id)) {
            self.schedule(delay, SimEvent::NodeAlive(node));
        }
    }
}

/// Runs the simulation until the event queue drains, feeding every event
/// into the boot core. Panics when the budget is exhausted, which means a
/// machine keeps re-arming alarms forever.
pub fn drive(mgr: &mut BootManager, bus: &mut SimBus, max_events: usize) {
    for _ in 0..max_events {
        let Some((due, event)) = bus.pop_event() else {
            return;
        };
        bus.advance_to(due);
        match event {
            SimEvent::SdoComplete(node) => mgr.on_sdo_event(node, bus),
            SimEvent::AlarmExpired(id) => mgr.on_alarm(id, bus),
            SimEvent::NodeAlive(node) => bus.mark_alive(node),
        }
    }
    panic!("simulation did not settle within {max_events} events");
}

impl SdoClient for SimBus {
    fn read_remote(&mut self, node: NodeId, index: u16, subindex: u8) -> Result<(), CanError> {
        self.read_requests.push((node, index, subindex));
        let (delay, result) = match self.nodes.get(&node.0) {
            Some(sim) if !sim.silent => {
                let result = sim
                    .dictionary
                    .get(&(index, subindex))
                    .copied()
                    .ok_or(SDO_ABORT_NO_OBJECT);
                (sim.response_delay_us, result)
            }
            _ => (self.silent_timeout_us, Err(SDO_ABORT_TIMEOUT)),
        };
        self.pending.insert(
            node,
            PendingTransfer {
                kind: TransferKind::Read,
                ready_at_us: self.now_us + delay,
                read_result: result,
            },
        );
        self.schedule(delay, SimEvent::SdoComplete(node));
        Ok(())
    }

    fn write_remote(
        &mut self,
        node: NodeId,
        index: u16,
        subindex: u8,
        _size: u32,
        value: u32,
    ) -> Result<(), CanError> {
        let (delay, result) = match self.nodes.get_mut(&node.0) {
            Some(sim) if !sim.silent => {
                sim.dictionary.insert((index, subindex), value);
                (sim.response_delay_us, Ok(0))
            }
            _ => (self.silent_timeout_us, Err(SDO_ABORT_TIMEOUT)),
        };
        self.pending.insert(
            node,
            PendingTransfer {
                kind: TransferKind::Write,
                ready_at_us: self.now_us + delay,
                read_result: result,
            },
        );
        self.schedule(delay, SimEvent::SdoComplete(node));
        Ok(())
    }

    fn read_result(&mut self, node: NodeId) -> SdoReadStatus {
        match self.pending.get(&node) {
            Some(pending)
                if matches!(pending.kind, TransferKind::Read)
                    && self.now_us >= pending.ready_at_us =>
            {
                match pending.read_result {
                    Ok(value) => SdoReadStatus::Done { value, size: 4 },
                    Err(code) => SdoReadStatus::Aborted(code),
                }
            }
            _ => SdoReadStatus::InProgress,
        }
    }

    fn write_result(&mut self, node: NodeId) -> SdoWriteStatus {
        match self.pending.get(&node) {
            Some(pending)
                if matches!(pending.kind, TransferKind::Write)
                    && self.now_us >= pending.ready_at_us =>
            {
                match pending.read_result {
                    Ok(_) => SdoWriteStatus::Done,
                    Err(code) => SdoWriteStatus::Aborted(code),
                }
            }
            _ => SdoWriteStatus::InProgress,
        }
    }

    fn close_transfer(&mut self, node: NodeId) {
        self.pending.remove(&node);
    }
}

impl NmtMaster for SimBus {
    fn send_nmt(&mut self, node: Option<NodeId>, command: NmtCommand) {
        self.nmt_log.push((node, command));
        match command {
            NmtCommand::ResetCommunication => match node {
                Some(target) => self.reset_node(target.0),
                None => {
                    let ids: Vec<u8> = self.nodes.keys().copied().collect();
                    for id in ids {
                        self.reset_node(id);
                    }
                }
            },
            NmtCommand::StartNode => {
                let mut start = |sim: &mut SimNode| {
                    if !sim.silent {
                        sim.state = NodeState::Operational;
                    }
                };
                match node {
                    Some(target) => {
                        if let Some(sim) = self.nodes.get_mut(&target.0) {
                            start(sim);
                        }
                    }
                    None => {
                        for sim in self.nodes.values_mut() {
                            start(sim);
                        }
                    }
                }
            }
        }
    }

    fn node_state(&self, node: NodeId) -> NodeState {
        self.nodes
            .get(&node.0)
            .map(|sim| sim.state)
            .unwrap_or_default()
    }

    fn local_state(&self) -> NodeState {
        self.local_state
    }

    fn set_local_state(&mut self, state: NodeState) {
        self.local_state = state;
    }

    fn local_node_id(&self) -> NodeId {
        self.local_id
    }
}

impl LocalDictionary for SimBus {
    fn read_u32(&self, index: u16, subindex: u8) -> Result<u32, CanError> {
        self.local_od
            .get(&(index, subindex))
            .copied()
            .ok_or(CanError::ObjectNotFound)
    }

    fn write_u32(
        &mut self,
        index: u16,
        subindex: u8,
        value: u32,
        _size: u32,
    ) -> Result<(), CanError> {
        self.local_od.insert((index, subindex), value);
        Ok(())
    }
}

impl AlarmService for SimBus {
    fn set_alarm(&mut self, id: AlarmId, delay_us: u64) {
        self.schedule(delay_us, SimEvent::AlarmExpired(id));
    }
}

impl Clock for SimBus {
    fn now_us(&self) -> u64 {
        self.now_us
    }
}
