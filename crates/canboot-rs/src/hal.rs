use crate::types::{NodeId, NodeIdError};
use core::fmt;

/// Defines a portable, descriptive Error type for the boot core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanError {
    /// The requested Object Dictionary index does not exist.
    ObjectNotFound,
    /// The requested sub-index does not exist for the given object.
    SubObjectNotFound,
    /// An attempt was made to read or write a value with an incorrect size or type.
    TypeMismatch,
    /// A value is not a valid NodeId.
    InvalidNodeId(u8),
    /// A Concise DCF stream is truncated or carries an illegal field value.
    MalformedDcf,
    /// An append would exceed a Concise DCF stream's fixed capacity.
    DcfCapacityExceeded,
    /// The Concise DCF node table is full or already holds this node.
    DcfNodeTable,
    /// An underlying transport/IO error occurred.
    IoError,
    /// An SDO transfer was aborted by the remote node; carries the abort code.
    SdoAborted(u32),
}

impl fmt::Display for CanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectNotFound => write!(f, "The requested Object Dictionary index was not found"),
            Self::SubObjectNotFound => write!(f, "The requested sub-index was not found for this object"),
            Self::TypeMismatch => write!(f, "The value's size or type does not match the object"),
            Self::InvalidNodeId(v) => write!(f, "Invalid NodeId value: {v}"),
            Self::MalformedDcf => write!(f, "Concise DCF stream is truncated or malformed"),
            Self::DcfCapacityExceeded => write!(f, "Concise DCF stream capacity exceeded"),
            Self::DcfNodeTable => write!(f, "Concise DCF node table rejected the node"),
            Self::IoError => write!(f, "An underlying I/O error occurred"),
            Self::SdoAborted(code) => write!(f, "SDO transfer aborted with code {code:#010x}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CanError {}

impl From<NodeIdError> for CanError {
    fn from(err: NodeIdError) -> Self {
        match err {
            NodeIdError::InvalidRange(val) => CanError::InvalidNodeId(val),
        }
    }
}

/// Communication state of a remote node as last observed on the bus
/// (bootup, heartbeat or node-guard telegrams).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeState {
    /// Nothing observed from this node yet.
    #[default]
    Unknown,
    /// Node announced itself with a bootup message.
    Initialising,
    /// Node reported the Stopped state.
    Stopped,
    /// Node reported the Pre-operational state.
    PreOperational,
    /// Node reported the Operational state.
    Operational,
}

impl NodeState {
    /// True for any state that proves the node is alive on the bus.
    pub fn is_alive(&self) -> bool {
        matches!(
            self,
            NodeState::Stopped | NodeState::PreOperational | NodeState::Operational
        )
    }
}

/// NMT commands issued by the boot process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NmtCommand {
    /// NMT Start Remote Node.
    StartNode,
    /// NMT Reset Communication.
    ResetCommunication,
}

/// Outcome of a remote dictionary read, queried after the transport signals
/// completion of the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdoReadStatus {
    /// Transfer still running; query again on the next completion callback.
    InProgress,
    /// Transfer finished; value is delivered little-endian packed with its byte size.
    Done { value: u32, size: u32 },
    /// Transfer aborted; carries the SDO abort code.
    Aborted(u32),
}

/// Outcome of a remote dictionary write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdoWriteStatus {
    /// Transfer still running.
    InProgress,
    /// Write acknowledged by the remote node.
    Done,
    /// Transfer aborted; carries the SDO abort code.
    Aborted(u32),
}

/// Identifies a pending alarm registration so expiries can be routed back
/// into the boot core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AlarmId(pub u32);

/// Client-side SDO access to remote object dictionaries.
///
/// Requests are asynchronous: issuing one returns immediately, and the caller
/// re-enters the boot core (via `BootManager::on_sdo_event`) when the
/// transport completes the transfer. The boot core then queries the result.
pub trait SdoClient {
    /// Issues an asynchronous expedited read of `index:subindex` on `node`.
    fn read_remote(&mut self, node: NodeId, index: u16, subindex: u8) -> Result<(), CanError>;

    /// Issues an asynchronous expedited write of `value` (`size` bytes,
    /// little-endian) to `index:subindex` on `node`.
    fn write_remote(
        &mut self,
        node: NodeId,
        index: u16,
        subindex: u8,
        size: u32,
        value: u32,
    ) -> Result<(), CanError>;

    /// Queries the outcome of the pending read transfer with `node`.
    fn read_result(&mut self, node: NodeId) -> SdoReadStatus;

    /// Queries the outcome of the pending write transfer with `node`.
    fn write_result(&mut self, node: NodeId) -> SdoWriteStatus;

    /// Releases the transfer slot held for `node` once its result has been
    /// consumed. Must be called before the next request to the same node.
    fn close_transfer(&mut self, node: NodeId);
}

/// Network management services of the local node acting as NMT master.
pub trait NmtMaster {
    /// Sends an NMT command to `node`, or broadcasts it when `node` is `None`.
    fn send_nmt(&mut self, node: Option<NodeId>, command: NmtCommand);

    /// Last observed communication state of a remote node.
    fn node_state(&self, node: NodeId) -> NodeState;

    /// Communication state of the local node.
    fn local_state(&self) -> NodeState;

    /// Forces the local node into `state` (used to enter Operational once
    /// the boot process allows it).
    fn set_local_state(&mut self, state: NodeState);

    /// Node ID of the local node.
    fn local_node_id(&self) -> NodeId;
}

/// Synchronous access to the local object dictionary.
///
/// The boot core reads its entire policy (network list, startup bits,
/// expected identities and configuration versions) through this seam; the
/// dictionary storage engine itself lives outside the crate.
pub trait LocalDictionary {
    /// Reads up to 32 bits from `index:subindex`.
    fn read_u32(&self, index: u16, subindex: u8) -> Result<u32, CanError>;

    /// Writes `value` (`size` bytes, little-endian) to `index:subindex`.
    fn write_u32(&mut self, index: u16, subindex: u8, value: u32, size: u32)
        -> Result<(), CanError>;
}

/// One-shot alarm registration. When the delay elapses the application must
/// call `BootManager::on_alarm` with the same id.
pub trait AlarmService {
    fn set_alarm(&mut self, id: AlarmId, delay_us: u64);
}

/// Monotonic microsecond clock used for boot and heartbeat budgets.
pub trait Clock {
    fn now_us(&self) -> u64;
}

/// Bundle of every collaborator the boot core needs. Blanket-implemented for
/// any type providing the individual traits, so tests and applications hand
/// in a single object.
pub trait CanInterface: SdoClient + NmtMaster + LocalDictionary + AlarmService + Clock {}

impl<T> CanInterface for T where T: SdoClient + NmtMaster + LocalDictionary + AlarmService + Clock {}
