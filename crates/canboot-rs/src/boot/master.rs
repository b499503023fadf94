//! Network boot master.
//!
//! The master machine owns the fleet: it resets the network (or the
//! individual nodes, when keep-alive slaves forbid a broadcast), starts one
//! boot worker per network-list slave, classifies finished workers, retries
//! unresponsive mandatory nodes within their boot-time budget and declares
//! the boot complete once every mandatory node made it. It then brings the
//! local node Operational and starts the slaves as the startup policy
//! dictates.

use crate::boot::{BootSlave, NodeBootState, ALARM_ID_MASTER_MIN, ALARM_ID_HB_BASE};
use crate::boot::slave::{self, BootResult, SlaveCtx};
use crate::dcf::DcfSet;
use crate::hal::{AlarmId, CanInterface, NmtCommand, NodeState};
use crate::network::{self, NmtStartup, NodeAssignment};
use crate::sm::{Action, StateMachine};
use crate::types::{C_BOOT_POLL_PERIOD_US, C_NODE_BOOT_TIME_US, NodeId};
use alloc::collections::BTreeMap;
use log::{debug, error, info, warn};

/// Overall outcome of the network boot, as reported to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootState {
    /// Boot process configured but not started.
    #[default]
    Initialised,
    /// Boot process underway.
    Running,
    /// Every mandatory slave booted; slaves started per policy.
    Completed,
}

/// States of the master machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMasterState {
    /// Policy check and network reset.
    Initial,
    /// Worker supervision: start, scan, classify, retry.
    BootProc,
    /// Wait for (or perform) the local transition to Operational.
    OperWait,
    /// Start the slave fleet.
    SlaveStart,
}

#[derive(Debug, Default)]
pub struct BootMasterData {
    pub lifecycle: BootState,
    /// Last allocated polling alarm id; wraps within the master range.
    next_alarm: u32,
}

impl BootMasterData {
    /// Allocates a fresh alarm id for the next supervision poll. Ids wrap
    /// below [`ALARM_ID_HB_BASE`] so they never collide with the per-node
    /// heartbeat-wait alarms.
    fn next_alarm_id(&mut self) -> AlarmId {
        self.next_alarm += 1;
        if self.next_alarm >= ALARM_ID_HB_BASE {
            self.next_alarm = ALARM_ID_MASTER_MIN;
        }
        if self.next_alarm < ALARM_ID_MASTER_MIN {
            self.next_alarm = ALARM_ID_MASTER_MIN;
        }
        AlarmId(self.next_alarm)
    }
}

/// The master machine instance.
pub type BootMaster = StateMachine<BootMasterState, BootMasterData>;

/// Context handed into the master step: the bus plus the worker fleet.
pub struct MasterCtx<'a, B: CanInterface> {
    pub bus: &'a mut B,
    pub slaves: &'a mut BTreeMap<NodeId, BootSlave>,
    pub dcf: &'a DcfSet,
}

pub fn new_master() -> BootMaster {
    BootMaster::new(BootMasterState::Initial, BootMasterData::default())
}

/// The master step function.
pub fn step<B: CanInterface>(
    sm: &mut BootMaster,
    ctx: &mut MasterCtx<'_, B>,
) -> Action<BootMasterState> {
    match sm.state() {
        BootMasterState::Initial => initial(sm, ctx),
        BootMasterState::BootProc => boot_proc(sm, ctx),
        BootMasterState::OperWait => oper_wait(sm, ctx),
        BootMasterState::SlaveStart => slave_start(sm, ctx),
    }
}

/// True once every mandatory slave in the network list is `Completed`.
fn all_mandatory_completed<B: CanInterface>(
    bus: &B,
    slaves: &BTreeMap<NodeId, BootSlave>,
) -> bool {
    network::all_node_ids()
        .filter(|node| network::mandatory_node(bus, *node))
        .all(|node| {
            slaves
                .get(&node)
                .map(|sm| sm.data.lifecycle == NodeBootState::Completed)
                .unwrap_or(false)
        })
}

/// Records every worker the master stops supervising as `Attempted`.
/// Called when the quorum is met while optional workers are still running:
/// their machines keep going, but nobody will classify them any more.
fn mark_stragglers_attempted<B: CanInterface>(
    bus: &B,
    slaves: &mut BTreeMap<NodeId, BootSlave>,
) {
    for (&node, worker) in slaves.iter_mut() {
        if worker.is_running() && !network::mandatory_node(bus, node) {
            debug!("Leaving supervision, optional node {} recorded as attempted", node);
            worker.data.lifecycle = NodeBootState::Attempted;
        }
    }
}

fn initial<B: CanInterface>(
    sm: &mut BootMaster,
    ctx: &mut MasterCtx<'_, B>,
) -> Action<BootMasterState> {
    if sm.is_first_entry() {
        if !network::startup_policy(ctx.bus).contains(NmtStartup::NMT_MASTER) {
            info!("Local node is not the NMT master, boot process disabled");
            return Action::Stop;
        }

        if network::keepalive_nodes_present(ctx.bus) {
            // A broadcast reset would knock out the keep-alive nodes too,
            // so every resettable slave is reset individually.
            info!("Keep-alive slaves present, resetting nodes individually");
            for node in network::all_node_ids() {
                let assignment = network::node_assignment(ctx.bus, node);
                if assignment.contains(NodeAssignment::IS_SLAVE)
                    && !assignment.contains(NodeAssignment::DO_NOT_RESET)
                {
                    ctx.bus.send_nmt(Some(node), NmtCommand::ResetCommunication);
                }
            }
        } else {
            info!("Resetting the network");
            ctx.bus.send_nmt(None, NmtCommand::ResetCommunication);
        }
    }
    Action::Switch(BootMasterState::BootProc)
}

fn boot_proc<B: CanInterface>(
    sm: &mut BootMaster,
    ctx: &mut MasterCtx<'_, B>,
) -> Action<BootMasterState> {
    let MasterCtx { bus, slaves, dcf } = ctx;

    if sm.is_first_entry() {
        // Launch one worker per network-list slave.
        for node in network::all_node_ids() {
            if !network::node_in_list(&**bus, node) {
                continue;
            }
            debug!("Launching boot worker for node {}", node);
            let worker = slaves.entry(node).or_insert_with(slave::new_slave);
            worker.data.lifecycle = NodeBootState::Initialised;
            worker.data.result = BootResult::InProgress;
            worker.data.boot_start_us = bus.now_us();
            let mut sctx = SlaveCtx {
                node,
                bus: &mut **bus,
                dcf: *dcf,
            };
            worker.start(&mut sctx, slave::step);
        }
    } else if all_mandatory_completed(&**bus, slaves) {
        mark_stragglers_attempted(&**bus, slaves);
        return Action::Switch(BootMasterState::OperWait);
    }

    // Classification scan over the fleet.
    let mut all_done = true;
    for (&node, worker) in slaves.iter_mut() {
        if worker.is_running() {
            worker.data.lifecycle = NodeBootState::Running;
            all_done = false;
            continue;
        }

        let mandatory = network::mandatory_node(&**bus, node);
        if !mandatory {
            worker.data.lifecycle = NodeBootState::Attempted;
        }

        match worker.data.result {
            BootResult::ErrB if mandatory => {
                let elapsed = bus.now_us().saturating_sub(worker.data.boot_start_us);
                if elapsed > C_NODE_BOOT_TIME_US {
                    // Budget exhausted; re-observation lands here again
                    // without triggering another attempt.
                    if worker.data.lifecycle != NodeBootState::TimedOut {
                        error!("Mandatory node {} timed out after {} us", node, elapsed);
                    }
                    worker.data.lifecycle = NodeBootState::TimedOut;
                    continue;
                }
                debug!("Mandatory node {} unresponsive, retrying boot", node);
                worker.init(crate::boot::slave::BootSlaveState::Initial);
                worker.data.reset_for_attempt();
                worker.data.lifecycle = NodeBootState::Running;
                let mut sctx = SlaveCtx {
                    node,
                    bus: &mut **bus,
                    dcf: *dcf,
                };
                worker.start(&mut sctx, slave::step);
                all_done = false;
            }
            BootResult::ErrB => {
                // Optional and silent: noted as attempted, nothing more.
                debug!("Optional node {} did not respond", node);
            }
            BootResult::Ok => {
                worker.data.lifecycle = NodeBootState::Completed;
            }
            result => {
                warn!("Node {} boot ended with error: {}", node, result);
                worker.data.lifecycle = NodeBootState::Error;
            }
        }
    }

    if all_done {
        if all_mandatory_completed(&**bus, slaves) {
            mark_stragglers_attempted(&**bus, slaves);
            return Action::Switch(BootMasterState::OperWait);
        }
        error!("Boot process finished with mandatory slaves missing");
        return Action::Stop;
    }

    // Workers still running; poll again shortly.
    let id = sm.data.next_alarm_id();
    ctx.bus.set_alarm(id, C_BOOT_POLL_PERIOD_US);
    Action::Stay
}

fn oper_wait<B: CanInterface>(
    sm: &mut BootMaster,
    ctx: &mut MasterCtx<'_, B>,
) -> Action<BootMasterState> {
    if sm.is_first_entry() {
        if !all_mandatory_completed(&*ctx.bus, ctx.slaves) {
            error!("Operational wait entered with mandatory slaves unbooted");
            return Action::Stop;
        }
        if !network::startup_policy(ctx.bus).contains(NmtStartup::MANUAL_OPERATIONAL) {
            info!("Entering Operational");
            ctx.bus.set_local_state(NodeState::Operational);
            return Action::Switch(BootMasterState::SlaveStart);
        }
        info!("Waiting for the application to enter Operational");
    }

    if ctx.bus.local_state() == NodeState::Operational {
        return Action::Switch(BootMasterState::SlaveStart);
    }
    let id = sm.data.next_alarm_id();
    ctx.bus.set_alarm(id, C_BOOT_POLL_PERIOD_US);
    Action::Stay
}

fn slave_start<B: CanInterface>(
    sm: &mut BootMaster,
    ctx: &mut MasterCtx<'_, B>,
) -> Action<BootMasterState> {
    if sm.is_first_entry() {
        let policy = network::startup_policy(ctx.bus);
        if policy.contains(NmtStartup::MANUAL_START_SLAVE) {
            info!("Slave start left to the application");
        } else if ctx.bus.local_state() == NodeState::Operational {
            if policy.contains(NmtStartup::START_ALL_SLAVES) {
                info!("Starting all slaves with a broadcast");
                ctx.bus.send_nmt(None, NmtCommand::StartNode);
            } else {
                let local = ctx.bus.local_node_id();
                info!("Starting slaves individually");
                for node in network::all_node_ids() {
                    if node != local && network::node_in_list(ctx.bus, node) {
                        ctx.bus.send_nmt(Some(node), NmtCommand::StartNode);
                    }
                }
            }
        }
    }

    info!("Network boot completed");
    sm.data.lifecycle = BootState::Completed;
    Action::Stop
}
