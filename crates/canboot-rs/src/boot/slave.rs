//! Per-node boot worker.
//!
//! One machine instance exists per slave in the network list. It walks the
//! node from "seen on the bus" to "configured and monitored": identity
//! verification against the expectation objects, configuration-version
//! reconciliation, Concise-DCF download, error-control service start-up and
//! finally the NMT start decision. Every remote access is asynchronous; a
//! state issues its request on first entry and inspects the completion when
//! the event loop re-enters it.

use crate::boot::{ALARM_ID_HB_BASE, NodeBootState};
use crate::dcf::{DcfReader, DcfSet, DCF_HEADER_SIZE};
use crate::hal::{AlarmId, CanInterface, SdoReadStatus, SdoWriteStatus};
use crate::network::{self, NmtStartup};
use crate::od::{self, *};
use crate::sm::{Action, StateMachine};
use crate::types::{C_BOOT_POLL_PERIOD_US, C_HB_WAIT_TIMEOUT_US, NodeId};
use core::fmt;
use log::{debug, info, warn};

/// Sentinel for a configuration-version value the node could not deliver.
const CONF_VERSION_UNKNOWN: u32 = u32::MAX;

/// States of the per-node boot worker, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootSlaveState {
    Initial,
    GetDeviceType,
    GetIdentity1,
    GetIdentity2,
    GetIdentity3,
    GetIdentity4,
    DecideBootPath,
    ConfVersionCheck,
    VerifyConfVersion1,
    VerifyConfVersion2,
    DownloadConfiguration,
    StartErrorControl,
    WaitHeartbeat,
    StartNodeGuard,
    ErrorControlStarted,
    StartSlave,
}

/// Outcome of a worker run. The lettered codes are ordinal and exhaustive;
/// only `ErrB` (no response) is treated as retryable by the master, and only
/// for mandatory nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum BootResult {
    /// Machine initialised but not yet run.
    #[default]
    Initialised,
    /// Machine running, waiting for bus traffic.
    InProgress,
    /// Boot finished successfully.
    Ok,
    /// Node no longer in the network list.
    ErrA,
    /// No response to the device-type (0x1000) read.
    ErrB,
    /// Device type (0x1000) did not match the expected value.
    ErrC,
    /// Vendor id (0x1018:1) mismatch or read failure.
    ErrD,
    /// No status response; slave is a heartbeat producer.
    ErrE,
    /// No status response; slave is a node-guard slave.
    ErrF,
    /// Software version check failed: no expected values defined.
    ErrG,
    /// Software version check failed: program identification mismatch.
    ErrH,
    /// Software version check failed: software date mismatch.
    ErrI,
    /// Automatic configuration download failed.
    ErrJ,
    /// Heartbeat failure while starting the error control service.
    ErrK,
    /// Slave was kept alive and is already operational; no reconfiguration.
    ErrL,
    /// Product code (0x1018:2) mismatch or read failure.
    ErrM,
    /// Revision number (0x1018:3) mismatch or read failure.
    ErrN,
    /// Serial number (0x1018:4) mismatch or read failure.
    ErrO,
}

impl fmt::Display for BootResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Initialised => "INIT: initialised, not run",
            Self::InProgress => "RUN: in progress",
            Self::Ok => "OK: finished OK",
            Self::ErrA => "A: node no longer in network list",
            Self::ErrB => "B: no response on 0x1000 received",
            Self::ErrC => "C: device type (0x1000) did not match expected",
            Self::ErrD => "D: vendor id (0x1018) did not match expected",
            Self::ErrE => "E: slave did not respond to status check. Slave is HB producer",
            Self::ErrF => "F: slave did not respond to status check. Slave is a NG slave",
            Self::ErrG => "G: application software version check failed, no values defined",
            Self::ErrH => "H: application software version check failed, program mismatch",
            Self::ErrI => "I: application software version check failed, date mismatch",
            Self::ErrJ => "J: automatic configuration download failed",
            Self::ErrK => "K: heartbeat failure during Error Control Service start",
            Self::ErrL => "L: slave was initially operational",
            Self::ErrM => "M: product code (0x1018) did not match expected",
            Self::ErrN => "N: revision number (0x1018) did not match expected",
            Self::ErrO => "O: serial number (0x1018) did not match expected",
        };
        f.write_str(text)
    }
}

/// Where the configuration-download loop stands for the current entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DcfWritePhase {
    /// The next entry still has to be decoded from the stream.
    #[default]
    Decode,
    /// An SDO write for the decoded entry is in flight.
    AwaitWrite,
}

/// Download cursor into this node's Concise DCF stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct DcfCursor {
    /// Byte offset of the next entry to decode.
    pub offset: usize,
    /// Declared number of entries in the stream.
    pub count: u32,
    /// Entries confirmed written to the node so far.
    pub loaded: u32,
    pub phase: DcfWritePhase,
}

/// Per-node worker data. The worker writes everything here except
/// `lifecycle`, which belongs to the master's classification scan.
#[derive(Debug, Clone, Default)]
pub struct BootSlaveData {
    /// Master-side view of this slot; see [`NodeBootState`].
    pub lifecycle: NodeBootState,
    /// Final (or running) outcome of the worker.
    pub result: BootResult,
    /// Last SDO abort code observed for this node.
    pub can_error: u32,
    /// Set when the node survived the reset untouched (keep-alive path);
    /// such a node must not be reconfigured and ends the boot with `ErrL`.
    pub via_kept_alive: bool,
    /// Identity snapshot read from the node.
    pub device_type: u32,
    pub vendor_id: u32,
    pub product_code: u32,
    pub revision: u32,
    pub serial: u32,
    /// Configuration version (date, time) read from 0x1020.
    pub conf_date: u32,
    pub conf_time: u32,
    /// When the master first started this worker, in microseconds.
    pub boot_start_us: u64,
    /// When the heartbeat wait began, in microseconds.
    pub ec_wait_start_us: u64,
    pub dcf: DcfCursor,
}

impl BootSlaveData {
    /// Clears everything a fresh boot attempt must not inherit. The
    /// lifecycle and the first-start timestamp survive: retries of a
    /// mandatory node are budgeted from its *first* start.
    pub fn reset_for_attempt(&mut self) {
        self.result = BootResult::InProgress;
        self.can_error = 0;
        self.via_kept_alive = false;
        self.device_type = 0;
        self.vendor_id = 0;
        self.product_code = 0;
        self.revision = 0;
        self.serial = 0;
        self.conf_date = 0;
        self.conf_time = 0;
        self.ec_wait_start_us = 0;
        self.dcf = DcfCursor::default();
    }
}

/// A per-node boot worker machine.
pub type BootSlave = StateMachine<BootSlaveState, BootSlaveData>;

/// Everything a worker step needs from the outside world.
pub struct SlaveCtx<'a, B: CanInterface> {
    pub node: NodeId,
    pub bus: &'a mut B,
    pub dcf: &'a DcfSet,
}

/// Creates a fresh worker machine for one node slot.
pub fn new_slave() -> BootSlave {
    BootSlave::new(BootSlaveState::Initial, BootSlaveData::default())
}

/// Records a terminal failure and stops the machine.
fn fail<B: CanInterface>(
    sm: &mut BootSlave,
    ctx: &SlaveCtx<'_, B>,
    result: BootResult,
) -> Action<BootSlaveState> {
    warn!("Boot of node {} failed: {}", ctx.node, result);
    sm.data.result = result;
    Action::Stop
}

/// Outcome of polling an asynchronous read, with the transfer slot released
/// for anything but a still-running transfer.
enum ReadOutcome {
    Pending,
    Value(u32),
    Failed(u32),
}

fn poll_read<B: CanInterface>(bus: &mut B, node: NodeId) -> ReadOutcome {
    match bus.read_result(node) {
        SdoReadStatus::InProgress => ReadOutcome::Pending,
        SdoReadStatus::Done { value, .. } => {
            bus.close_transfer(node);
            ReadOutcome::Value(value)
        }
        SdoReadStatus::Aborted(code) => {
            bus.close_transfer(node);
            ReadOutcome::Failed(code)
        }
    }
}

/// The worker step function, dispatched by state.
pub fn step<B: CanInterface>(
    sm: &mut BootSlave,
    ctx: &mut SlaveCtx<'_, B>,
) -> Action<BootSlaveState> {
    match sm.state() {
        BootSlaveState::Initial => initial(sm, ctx),
        BootSlaveState::GetDeviceType => get_device_type(sm, ctx),
        BootSlaveState::GetIdentity1 => get_identity(
            sm,
            ctx,
            SUBIDX_IDENTITY_VENDOR_ID,
            IDX_EXPECTED_VENDOR_ID,
            BootResult::ErrD,
            BootSlaveState::GetIdentity2,
        ),
        BootSlaveState::GetIdentity2 => get_identity(
            sm,
            ctx,
            SUBIDX_IDENTITY_PRODUCT_CODE,
            IDX_EXPECTED_PRODUCT_CODE,
            BootResult::ErrM,
            BootSlaveState::GetIdentity3,
        ),
        BootSlaveState::GetIdentity3 => get_identity(
            sm,
            ctx,
            SUBIDX_IDENTITY_REVISION,
            IDX_EXPECTED_REVISION,
            BootResult::ErrN,
            BootSlaveState::GetIdentity4,
        ),
        BootSlaveState::GetIdentity4 => get_identity(
            sm,
            ctx,
            SUBIDX_IDENTITY_SERIAL,
            IDX_EXPECTED_SERIAL,
            BootResult::ErrO,
            BootSlaveState::DecideBootPath,
        ),
        BootSlaveState::DecideBootPath => decide_boot_path(sm),
        BootSlaveState::ConfVersionCheck => conf_version_check(sm, ctx),
        BootSlaveState::VerifyConfVersion1 => verify_conf_version_1(sm, ctx),
        BootSlaveState::VerifyConfVersion2 => verify_conf_version_2(sm, ctx),
        BootSlaveState::DownloadConfiguration => download_configuration(sm, ctx),
        BootSlaveState::StartErrorControl => start_error_control(sm, ctx),
        BootSlaveState::WaitHeartbeat => wait_heartbeat(sm, ctx),
        BootSlaveState::StartNodeGuard => start_node_guard(sm),
        BootSlaveState::ErrorControlStarted => error_control_started(sm, ctx),
        BootSlaveState::StartSlave => start_slave(sm, ctx),
    }
}

fn initial<B: CanInterface>(
    sm: &mut BootSlave,
    ctx: &mut SlaveCtx<'_, B>,
) -> Action<BootSlaveState> {
    debug!("Boot worker for node {} entering", ctx.node);
    if !network::node_in_list(ctx.bus, ctx.node) {
        return fail(sm, ctx, BootResult::ErrA);
    }
    Action::Switch(BootSlaveState::GetDeviceType)
}

fn get_device_type<B: CanInterface>(
    sm: &mut BootSlave,
    ctx: &mut SlaveCtx<'_, B>,
) -> Action<BootSlaveState> {
    let node = ctx.node;
    if sm.is_first_entry() {
        if ctx.bus.read_remote(node, IDX_DEVICE_TYPE_U32, 0).is_err() {
            return fail(sm, ctx, BootResult::ErrB);
        }
        return Action::Stay;
    }

    match poll_read(ctx.bus, node) {
        ReadOutcome::Pending => Action::Stay,
        ReadOutcome::Failed(code) => {
            sm.data.can_error = code;
            fail(sm, ctx, BootResult::ErrB)
        }
        ReadOutcome::Value(value) => {
            sm.data.device_type = value;
            let expected = od::read_u32_or_zero(ctx.bus, IDX_EXPECTED_DEVICE_TYPE, node.0);
            // An expected value of 0 means "don't care".
            if expected != 0 && value != expected {
                return fail(sm, ctx, BootResult::ErrC);
            }
            let any_identity_expected = [
                IDX_EXPECTED_VENDOR_ID,
                IDX_EXPECTED_PRODUCT_CODE,
                IDX_EXPECTED_REVISION,
                IDX_EXPECTED_SERIAL,
            ]
            .iter()
            .any(|idx| od::read_u32_or_zero(ctx.bus, *idx, node.0) != 0);

            if any_identity_expected {
                Action::Switch(BootSlaveState::GetIdentity1)
            } else {
                Action::Switch(BootSlaveState::DecideBootPath)
            }
        }
    }
}

/// Shared handler for the four identity sub-object states (0x1018:1..4).
/// An SDO failure counts the same as a mismatch for the respective code.
fn get_identity<B: CanInterface>(
    sm: &mut BootSlave,
    ctx: &mut SlaveCtx<'_, B>,
    subindex: u8,
    expected_index: u16,
    mismatch: BootResult,
    next: BootSlaveState,
) -> Action<BootSlaveState> {
    let node = ctx.node;
    if sm.is_first_entry() {
        if ctx
            .bus
            .read_remote(node, IDX_IDENTITY_OBJECT_REC, subindex)
            .is_err()
        {
            return fail(sm, ctx, mismatch);
        }
        return Action::Stay;
    }

    match poll_read(ctx.bus, node) {
        ReadOutcome::Pending => Action::Stay,
        ReadOutcome::Failed(code) => {
            sm.data.can_error = code;
            fail(sm, ctx, mismatch)
        }
        ReadOutcome::Value(value) => {
            match subindex {
                SUBIDX_IDENTITY_VENDOR_ID => sm.data.vendor_id = value,
                SUBIDX_IDENTITY_PRODUCT_CODE => sm.data.product_code = value,
                SUBIDX_IDENTITY_REVISION => sm.data.revision = value,
                _ => sm.data.serial = value,
            }
            let expected = od::read_u32_or_zero(ctx.bus, expected_index, node.0);
            if expected != 0 && value != expected {
                return fail(sm, ctx, mismatch);
            }
            Action::Switch(next)
        }
    }
}

fn decide_boot_path(sm: &mut BootSlave) -> Action<BootSlaveState> {
    if sm.is_first_entry() {
        // Only the configuration path is implemented; the software
        // update/verification path would branch off here.
        return Action::Switch(BootSlaveState::ConfVersionCheck);
    }
    Action::Stay
}

fn conf_version_check<B: CanInterface>(
    sm: &mut BootSlave,
    ctx: &mut SlaveCtx<'_, B>,
) -> Action<BootSlaveState> {
    if sm.is_first_entry() {
        let expected_date = od::read_u32_or_zero(ctx.bus, IDX_EXPECTED_CONF_DATE, ctx.node.0);
        let expected_time = od::read_u32_or_zero(ctx.bus, IDX_EXPECTED_CONF_TIME, ctx.node.0);
        if expected_date == 0 || expected_time == 0 {
            // No expectation configured: push the configuration regardless.
            return Action::Switch(BootSlaveState::DownloadConfiguration);
        }
        return Action::Switch(BootSlaveState::VerifyConfVersion1);
    }
    Action::Stay
}

fn verify_conf_version_1<B: CanInterface>(
    sm: &mut BootSlave,
    ctx: &mut SlaveCtx<'_, B>,
) -> Action<BootSlaveState> {
    let node = ctx.node;
    if sm.is_first_entry() {
        if ctx
            .bus
            .read_remote(node, IDX_VERIFY_CONFIGURATION_REC, SUBIDX_VERIFY_CONF_DATE)
            .is_err()
        {
            // Not fatal: an unreadable version forces a fresh download.
            sm.data.conf_date = CONF_VERSION_UNKNOWN;
            return conf_date_decision(sm, ctx);
        }
        return Action::Stay;
    }

    match poll_read(ctx.bus, node) {
        ReadOutcome::Pending => Action::Stay,
        ReadOutcome::Failed(code) => {
            sm.data.can_error = code;
            sm.data.conf_date = CONF_VERSION_UNKNOWN;
            conf_date_decision(sm, ctx)
        }
        ReadOutcome::Value(value) => {
            sm.data.conf_date = value;
            conf_date_decision(sm, ctx)
        }
    }
}

fn conf_date_decision<B: CanInterface>(
    sm: &mut BootSlave,
    ctx: &mut SlaveCtx<'_, B>,
) -> Action<BootSlaveState> {
    let expected = od::read_u32_or_zero(ctx.bus, IDX_EXPECTED_CONF_DATE, ctx.node.0);
    if expected != 0 && sm.data.conf_date != expected {
        debug!(
            "Node {} configuration date {} differs from expected {}, downloading",
            ctx.node, sm.data.conf_date, expected
        );
        return Action::Switch(BootSlaveState::DownloadConfiguration);
    }
    Action::Switch(BootSlaveState::VerifyConfVersion2)
}

fn verify_conf_version_2<B: CanInterface>(
    sm: &mut BootSlave,
    ctx: &mut SlaveCtx<'_, B>,
) -> Action<BootSlaveState> {
    let node = ctx.node;
    if sm.is_first_entry() {
        if ctx
            .bus
            .read_remote(node, IDX_VERIFY_CONFIGURATION_REC, SUBIDX_VERIFY_CONF_TIME)
            .is_err()
        {
            sm.data.conf_time = CONF_VERSION_UNKNOWN;
            return conf_time_decision(sm, ctx);
        }
        return Action::Stay;
    }

    match poll_read(ctx.bus, node) {
        ReadOutcome::Pending => Action::Stay,
        ReadOutcome::Failed(code) => {
            sm.data.can_error = code;
            sm.data.conf_time = CONF_VERSION_UNKNOWN;
            conf_time_decision(sm, ctx)
        }
        ReadOutcome::Value(value) => {
            sm.data.conf_time = value;
            conf_time_decision(sm, ctx)
        }
    }
}

fn conf_time_decision<B: CanInterface>(
    sm: &mut BootSlave,
    ctx: &mut SlaveCtx<'_, B>,
) -> Action<BootSlaveState> {
    let expected = od::read_u32_or_zero(ctx.bus, IDX_EXPECTED_CONF_TIME, ctx.node.0);
    if expected != 0 && sm.data.conf_time != expected {
        return Action::Switch(BootSlaveState::DownloadConfiguration);
    }
    // Configuration is already at the expected version; skip the download.
    info!("Node {} configuration up to date, skipping download", ctx.node);
    Action::Switch(BootSlaveState::StartErrorControl)
}

fn download_configuration<B: CanInterface>(
    sm: &mut BootSlave,
    ctx: &mut SlaveCtx<'_, B>,
) -> Action<BootSlaveState> {
    let node = ctx.node;
    if sm.is_first_entry() {
        let Some(stream) = ctx.dcf.stream(node) else {
            warn!("No Concise DCF stream configured for node {}", node);
            return fail(sm, ctx, BootResult::ErrJ);
        };
        sm.data.dcf = DcfCursor {
            offset: DCF_HEADER_SIZE,
            count: stream.entry_count(),
            loaded: 0,
            phase: DcfWritePhase::Decode,
        };
        info!(
            "Concise DCF for node {}: {} entries to load",
            node, sm.data.dcf.count
        );
        // Fall through: the first write is issued right away.
    }

    // Decode one entry, write it, wait for the confirmation, repeat. The
    // loop exits through Stay whenever a write goes asynchronous.
    while sm.data.dcf.loaded < sm.data.dcf.count {
        match sm.data.dcf.phase {
            DcfWritePhase::Decode => {
                let Some(stream) = ctx.dcf.stream(node) else {
                    return fail(sm, ctx, BootResult::ErrJ);
                };
                let mut reader = DcfReader::resume(stream.as_bytes(), sm.data.dcf.offset);
                let entry = match reader.next_entry() {
                    Err(_) => {
                        warn!(
                            "Concise DCF for node {}: malformed stream after {} of {} entries",
                            node, sm.data.dcf.loaded, sm.data.dcf.count
                        );
                        return fail(sm, ctx, BootResult::ErrJ);
                    }
                    Ok(None) => {
                        // End marker before the declared count: short stream.
                        warn!(
                            "Concise DCF for node {}: short load, got end marker after {} of {} entries",
                            node, sm.data.dcf.loaded, sm.data.dcf.count
                        );
                        return fail(sm, ctx, BootResult::ErrJ);
                    }
                    Ok(Some(entry)) => entry,
                };
                sm.data.dcf.offset = reader.cursor();
                sm.data.dcf.phase = DcfWritePhase::AwaitWrite;
                if ctx
                    .bus
                    .write_remote(node, entry.index, entry.subindex, entry.size, entry.value)
                    .is_err()
                {
                    return fail(sm, ctx, BootResult::ErrJ);
                }
                debug!(
                    "Concise DCF for node {}: writing {:#06x}:{:#04x} ({} bytes)",
                    node, entry.index, entry.subindex, entry.size
                );
            }
            DcfWritePhase::AwaitWrite => match ctx.bus.write_result(node) {
                SdoWriteStatus::InProgress => return Action::Stay,
                SdoWriteStatus::Aborted(code) => {
                    ctx.bus.close_transfer(node);
                    sm.data.can_error = code;
                    return fail(sm, ctx, BootResult::ErrJ);
                }
                SdoWriteStatus::Done => {
                    ctx.bus.close_transfer(node);
                    sm.data.dcf.loaded += 1;
                    sm.data.dcf.phase = DcfWritePhase::Decode;
                }
            },
        }
    }

    info!(
        "Concise DCF for node {}: all {} entries loaded",
        node, sm.data.dcf.count
    );
    Action::Switch(BootSlaveState::StartErrorControl)
}

fn start_error_control<B: CanInterface>(
    sm: &mut BootSlave,
    ctx: &mut SlaveCtx<'_, B>,
) -> Action<BootSlaveState> {
    if !sm.is_first_entry() {
        return Action::Stay;
    }
    let node = ctx.node;
    // Consumer heartbeat time for this node, low 16 bits of 0x1016.
    let hb_consumer_ms =
        od::read_u32_or_zero(ctx.bus, IDX_CONSUMER_HEARTBEAT_TIME, node.0) & 0xFFFF;
    if hb_consumer_ms != 0 {
        return Action::Switch(BootSlaveState::WaitHeartbeat);
    }
    if network::node_in_list(ctx.bus, node) {
        let guard_time = network::node_assignment(ctx.bus, node).guard_time_ms();
        if guard_time != 0 {
            return Action::Switch(BootSlaveState::StartNodeGuard);
        }
    }
    Action::Switch(BootSlaveState::ErrorControlStarted)
}

fn wait_heartbeat<B: CanInterface>(
    sm: &mut BootSlave,
    ctx: &mut SlaveCtx<'_, B>,
) -> Action<BootSlaveState> {
    let node = ctx.node;
    if sm.is_first_entry() {
        sm.data.ec_wait_start_us = ctx.bus.now_us();
        // Fall through: the first heartbeat may already have been seen.
    }

    if ctx.bus.node_state(node).is_alive() {
        debug!("Node {} is alive, heartbeat confirmed", node);
        return Action::Switch(BootSlaveState::ErrorControlStarted);
    }

    let elapsed = ctx.bus.now_us().saturating_sub(sm.data.ec_wait_start_us);
    if elapsed > C_HB_WAIT_TIMEOUT_US {
        warn!("Heartbeat wait for node {} elapsed ({} us)", node, elapsed);
        return fail(sm, ctx, BootResult::ErrK);
    }

    ctx.bus
        .set_alarm(AlarmId(ALARM_ID_HB_BASE + node.0 as u32), C_BOOT_POLL_PERIOD_US);
    Action::Stay
}

fn start_node_guard(sm: &mut BootSlave) -> Action<BootSlaveState> {
    if sm.is_first_entry() {
        // Node-guard RTR scheduling is owned by the transport layer; the
        // boot process only routes past it.
        debug!("Node guarding delegated to the transport layer");
        return Action::Switch(BootSlaveState::ErrorControlStarted);
    }
    Action::Stay
}

fn error_control_started<B: CanInterface>(
    sm: &mut BootSlave,
    ctx: &mut SlaveCtx<'_, B>,
) -> Action<BootSlaveState> {
    if sm.is_first_entry() {
        if sm.data.via_kept_alive {
            return fail(sm, ctx, BootResult::ErrL);
        }
        return Action::Switch(BootSlaveState::StartSlave);
    }
    Action::Stay
}

fn start_slave<B: CanInterface>(
    sm: &mut BootSlave,
    ctx: &mut SlaveCtx<'_, B>,
) -> Action<BootSlaveState> {
    let node = ctx.node;
    if !sm.is_first_entry() {
        // Terminal state, never re-entered in a healthy run.
        warn!("Start of node {} requested twice, odd", node);
        return Action::Stay;
    }

    let policy = network::startup_policy(ctx.bus);
    if !policy.contains(NmtStartup::MANUAL_START_SLAVE) {
        if !policy.contains(NmtStartup::START_ALL_SLAVES) {
            info!("Starting node {} individually", node);
            ctx.bus
                .send_nmt(Some(node), crate::hal::NmtCommand::StartNode);
        } else if ctx.bus.local_state() == crate::hal::NodeState::Operational {
            // The broadcast already went out; catch this late node up.
            info!("Starting node {} after broadcast", node);
            ctx.bus
                .send_nmt(Some(node), crate::hal::NmtCommand::StartNode);
        }
        // Otherwise the master's broadcast start will cover this node.
    }

    sm.data.result = BootResult::Ok;
    info!("Boot of node {} completed", node);
    Action::Stop
}
