//! Network boot orchestration.
//!
//! [`BootManager`] bundles the boot master, the per-node boot workers, the
//! Concise DCF streams and the per-node EMCY stacks behind one owner. The
//! application wires its transport callbacks to the `on_*` entry points;
//! everything else runs inside the machines.

pub mod master;
pub mod slave;

use crate::dcf::DcfSet;
use crate::emcy::{EmcyRecord, ErrorStack};
use crate::hal::{AlarmId, CanError, CanInterface, NodeState};
use crate::network::{self, NodeAssignment};
use crate::od::IDX_CONSUMER_HEARTBEAT_TIME;
use crate::types::NodeId;
use alloc::collections::BTreeMap;
use core::fmt;
use log::{debug, info, warn};

pub use master::{BootMaster, BootMasterState, BootState};
pub use slave::{BootResult, BootSlave, BootSlaveState};

use master::MasterCtx;
use slave::SlaveCtx;

/// First alarm id handed out for master supervision polls.
pub(crate) const ALARM_ID_MASTER_MIN: u32 = 128;
/// Base of the per-node heartbeat-wait alarm ids; a node's alarm is
/// `ALARM_ID_HB_BASE + node id`.
pub(crate) const ALARM_ID_HB_BASE: u32 = 1024;

/// Master-side view of one node slot, updated by the master's
/// classification scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeBootState {
    /// Node is not part of the boot process.
    #[default]
    Unused,
    /// Worker created, attempt not yet observed.
    Initialised,
    /// Optional node attempted; it may or may not have made it.
    Attempted,
    /// Worker currently running.
    Running,
    /// Node booted successfully.
    Completed,
    /// Mandatory node stayed unresponsive past its boot-time budget.
    TimedOut,
    /// Worker ended with a non-retryable error.
    Error,
}

impl fmt::Display for NodeBootState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Unused => "unused",
            Self::Initialised => "initialised",
            Self::Attempted => "attempted",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::TimedOut => "timed out",
            Self::Error => "error",
        };
        f.write_str(text)
    }
}

/// Owner of the whole boot process state.
#[derive(Default)]
pub struct BootManager {
    master: BootMaster,
    slaves: BTreeMap<NodeId, BootSlave>,
    errors: BTreeMap<NodeId, ErrorStack>,
    dcf: DcfSet,
}

impl fmt::Debug for BootManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootManager")
            .field("status", &self.status())
            .field("slaves", &self.slaves.len())
            .finish()
    }
}

impl Default for BootMaster {
    fn default() -> Self {
        master::new_master()
    }
}

impl BootManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kicks off the network boot. Must be called once, after the network
    /// list, the startup policy and the DCF streams are in place.
    pub fn start<B: CanInterface>(&mut self, bus: &mut B) {
        info!("Starting network boot");
        self.master.data.lifecycle = BootState::Running;
        let mut ctx = MasterCtx {
            bus,
            slaves: &mut self.slaves,
            dcf: &self.dcf,
        };
        self.master.start(&mut ctx, master::step);
    }

    /// Routes an expired alarm back into the machine that armed it.
    pub fn on_alarm<B: CanInterface>(&mut self, id: AlarmId, bus: &mut B) {
        if id.0 >= ALARM_ID_HB_BASE {
            let raw = (id.0 - ALARM_ID_HB_BASE) as u8;
            if let Ok(node) = NodeId::try_from(raw) {
                self.run_slave(node, bus);
            }
            return;
        }
        self.run_master(bus);
    }

    /// Resumes the worker waiting on an SDO transfer with `node`. Called by
    /// the transport whenever a transfer to that node completes or aborts.
    pub fn on_sdo_event<B: CanInterface>(&mut self, node: NodeId, bus: &mut B) {
        self.run_slave(node, bus);
    }

    /// Handles a bootup message from `node`. When the network list asks for
    /// it (`ON_BOOT_START_SLAVE`) and no attempt is currently running, the
    /// node's boot process is restarted from scratch.
    pub fn on_slave_bootup<B: CanInterface>(&mut self, node: NodeId, bus: &mut B) {
        info!("Bootup message from node {}", node);
        let assignment = network::node_assignment(bus, node);
        if !assignment.contains(NodeAssignment::IS_SLAVE | NodeAssignment::ON_BOOT_START_SLAVE) {
            return;
        }
        let worker = self.slaves.entry(node).or_insert_with(slave::new_slave);
        if worker.is_running() {
            debug!("Boot of node {} already underway, bootup ignored", node);
            return;
        }
        info!("Restarting boot process for node {}", node);
        worker.init(BootSlaveState::Initial);
        worker.data.reset_for_attempt();
        worker.data.lifecycle = NodeBootState::Initialised;
        worker.data.boot_start_us = bus.now_us();
        let mut ctx = SlaveCtx {
            node,
            bus,
            dcf: &self.dcf,
        };
        worker.start(&mut ctx, slave::step);
    }

    /// Records an EMCY telegram from `node`. An all-zero telegram means
    /// "no active error" and clears the node's stack instead.
    pub fn on_emcy(&mut self, node: NodeId, code: u16, register: u8, specific: [u8; 5]) {
        if code == 0 && register == 0 {
            debug!("Node {} reports no active error, clearing its stack", node);
            if let Some(stack) = self.errors.get_mut(&node) {
                stack.clear();
            }
            return;
        }
        let stack = self.errors.entry(node).or_default();
        if !stack.push(EmcyRecord {
            code,
            register,
            specific,
        }) {
            warn!("Error stack for node {} is full, EMCY {:#06x} dropped", node, code);
        }
    }

    /// Overall boot outcome.
    pub fn status(&self) -> BootState {
        self.master.data.lifecycle
    }

    /// Master-side lifecycle of one node slot.
    pub fn node_status(&self, node: NodeId) -> NodeBootState {
        self.slaves
            .get(&node)
            .map(|sm| sm.data.lifecycle)
            .unwrap_or(NodeBootState::Unused)
    }

    /// Detailed worker outcome for one node.
    pub fn node_result(&self, node: NodeId) -> BootResult {
        self.slaves
            .get(&node)
            .map(|sm| sm.data.result)
            .unwrap_or(BootResult::Initialised)
    }

    /// Last SDO abort code seen while booting `node`.
    pub fn node_error(&self, node: NodeId) -> u32 {
        self.slaves
            .get(&node)
            .map(|sm| sm.data.can_error)
            .unwrap_or(0)
    }

    /// Number of EMCY records currently held for `node`.
    pub fn error_count(&self, node: NodeId) -> usize {
        self.errors.get(&node).map(ErrorStack::len).unwrap_or(0)
    }

    /// The recorded EMCY telegrams for `node`, oldest first.
    pub fn node_errors(&self, node: NodeId) -> Option<&ErrorStack> {
        self.errors.get(&node)
    }

    /// Drops every EMCY record held for `node`.
    pub fn clear_errors(&mut self, node: NodeId) {
        if let Some(stack) = self.errors.get_mut(&node) {
            stack.clear();
        }
    }

    /// A node is healthy when it is Operational, booted cleanly and has no
    /// outstanding EMCY records.
    pub fn node_healthy<B: CanInterface>(&self, bus: &B, node: NodeId) -> bool {
        bus.node_state(node) == NodeState::Operational
            && self.node_result(node) == BootResult::Ok
            && self.error_count(node) == 0
    }

    /// Registers the local node as heartbeat consumer for `node`, packing
    /// the producer id and the consumer time the way 0x1016 expects.
    pub fn set_heartbeat<B: CanInterface>(
        &self,
        bus: &mut B,
        node: NodeId,
        time_ms: u16,
    ) -> Result<(), CanError> {
        let value = ((node.0 as u32) << 16) | time_ms as u32;
        bus.write_u32(IDX_CONSUMER_HEARTBEAT_TIME, node.0, value, 4)
    }

    /// Applies the DCF stream registered for the *local* node to the local
    /// dictionary, entry by entry. Returns the number of entries written.
    pub fn load_local_dcf<B: CanInterface>(&self, bus: &mut B) -> Result<u32, CanError> {
        let node = bus.local_node_id();
        let stream = self.dcf.stream(node).ok_or(CanError::ObjectNotFound)?;
        let count = stream.entry_count();
        let mut reader = stream.reader();
        let mut loaded = 0;
        while loaded < count {
            match reader.next_entry()? {
                // End marker before the declared count: short stream.
                None => return Err(CanError::MalformedDcf),
                Some(entry) => {
                    bus.write_u32(entry.index, entry.subindex, entry.value, entry.size)?;
                    loaded += 1;
                }
            }
        }
        info!("Loaded {} local configuration entries", loaded);
        Ok(loaded)
    }

    /// The Concise DCF streams, for population before `start`.
    pub fn dcf_mut(&mut self) -> &mut DcfSet {
        &mut self.dcf
    }

    pub fn dcf(&self) -> &DcfSet {
        &self.dcf
    }

    fn run_master<B: CanInterface>(&mut self, bus: &mut B) {
        let mut ctx = MasterCtx {
            bus,
            slaves: &mut self.slaves,
            dcf: &self.dcf,
        };
        self.master.run(&mut ctx, master::step);
    }

    fn run_slave<B: CanInterface>(&mut self, node: NodeId, bus: &mut B) {
        if let Some(worker) = self.slaves.get_mut(&node) {
            let mut ctx = SlaveCtx {
                node,
                bus,
                dcf: &self.dcf,
            };
            worker.run(&mut ctx, slave::step);
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Scripted bus double shared by the boot unit tests.

    use crate::hal::{
        AlarmId, AlarmService, CanError, Clock, LocalDictionary, NmtCommand, NmtMaster, NodeState,
        SdoClient, SdoReadStatus, SdoWriteStatus,
    };
    use crate::types::NodeId;
    use alloc::collections::{BTreeMap, VecDeque};
    use alloc::vec::Vec;

    /// Abort code used for nodes with no scripted answer: SDO timeout.
    pub const ABORT_TIMEOUT: u32 = 0x0504_0000;

    enum Kind {
        Read,
        Write,
    }

    struct Pending {
        kind: Kind,
        delivered: bool,
        read_result: Result<u32, u32>,
    }

    /// A scripted CAN bus: reads answer from per-object queues, writes
    /// always succeed, and completions are held back until [`MockBus::pump`]
    /// releases them, mimicking the asynchronous transport.
    pub struct MockBus {
        pub od: BTreeMap<(u16, u8), u32>,
        pub node_states: BTreeMap<NodeId, NodeState>,
        pub local_state: NodeState,
        pub local_id: NodeId,
        pub writes: Vec<(NodeId, u16, u8, u32, u32)>,
        pub nmt_log: Vec<(Option<NodeId>, NmtCommand)>,
        pub alarms: Vec<(AlarmId, u64)>,
        pub now: u64,
        scripts: BTreeMap<(u8, u16, u8), VecDeque<Result<u32, u32>>>,
        pending: BTreeMap<NodeId, Pending>,
    }

    impl MockBus {
        pub fn new(local_id: NodeId) -> Self {
            Self {
                od: BTreeMap::new(),
                node_states: BTreeMap::new(),
                local_state: NodeState::PreOperational,
                local_id,
                writes: Vec::new(),
                nmt_log: Vec::new(),
                alarms: Vec::new(),
                now: 0,
                scripts: BTreeMap::new(),
                pending: BTreeMap::new(),
            }
        }

        /// Queues the answer for the next read of `index:subindex` on
        /// `node`; `Err` is delivered as an SDO abort.
        pub fn script_read(&mut self, node: NodeId, index: u16, subindex: u8, result: Result<u32, u32>) {
            self.scripts
                .entry((node.0, index, subindex))
                .or_default()
                .push_back(result);
        }

        /// Releases all held-back transfer completions. Returns false when
        /// nothing was pending, i.e. the machines have gone idle.
        pub fn pump(&mut self) -> bool {
            let mut released = false;
            for pending in self.pending.values_mut() {
                if !pending.delivered {
                    pending.delivered = true;
                    released = true;
                }
            }
            released
        }

        pub fn advance(&mut self, us: u64) {
            self.now += us;
        }
    }

    impl SdoClient for MockBus {
        fn read_remote(&mut self, node: NodeId, index: u16, subindex: u8) -> Result<(), CanError> {
            let result = self
                .scripts
                .get_mut(&(node.0, index, subindex))
                .and_then(VecDeque::pop_front)
                .unwrap_or(Err(ABORT_TIMEOUT));
            self.pending.insert(
                node,
                Pending {
                    kind: Kind::Read,
                    delivered: false,
                    read_result: result,
                },
            );
            Ok(())
        }

        fn write_remote(
            &mut self,
            node: NodeId,
            index: u16,
            subindex: u8,
            size: u32,
            value: u32,
        ) -> Result<(), CanError> {
            self.writes.push((node, index, subindex, size, value));
            self.pending.insert(
                node,
                Pending {
                    kind: Kind::Write,
                    delivered: false,
                    read_result: Ok(0),
                },
            );
            Ok(())
        }

        fn read_result(&mut self, node: NodeId) -> SdoReadStatus {
            match self.pending.get(&node) {
                Some(Pending {
                    kind: Kind::Read,
                    delivered: true,
                    read_result,
                }) => match read_result {
                    Ok(value) => SdoReadStatus::Done {
                        value: *value,
                        size: 4,
                    },
                    Err(code) => SdoReadStatus::Aborted(*code),
                },
                _ => SdoReadStatus::InProgress,
            }
        }

        fn write_result(&mut self, node: NodeId) -> SdoWriteStatus {
            match self.pending.get(&node) {
                Some(Pending {
                    kind: Kind::Write,
                    delivered: true,
                    ..
                }) => SdoWriteStatus::Done,
                _ => SdoWriteStatus::InProgress,
            }
        }

        fn close_transfer(&mut self, node: NodeId) {
            self.pending.remove(&node);
        }
    }

    impl NmtMaster for MockBus {
        fn send_nmt(&mut self, node: Option<NodeId>, command: NmtCommand) {
            self.nmt_log.push((node, command));
        }

        fn node_state(&self, node: NodeId) -> NodeState {
            self.node_states.get(&node).copied().unwrap_or_default()
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

    impl LocalDictionary for MockBus {
        fn read_u32(&self, index: u16, subindex: u8) -> Result<u32, CanError> {
            self.od
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
            self.od.insert((index, subindex), value);
            Ok(())
        }
    }

    impl AlarmService for MockBus {
        fn set_alarm(&mut self, id: AlarmId, delay_us: u64) {
            self.alarms.push((id, delay_us));
        }
    }

    impl Clock for MockBus {
        fn now_us(&self) -> u64 {
            self.now
        }
    }
}
