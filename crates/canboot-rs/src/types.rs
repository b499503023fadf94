use core::convert::TryFrom;
use core::fmt;

// --- Primitive Types (Based on CiA DS 301 data type names) ---
// These aliases ensure compatibility with object dictionary definitions (UNSIGNEDn)

/// Alias for UNSIGNED8 (8-bit unsigned integer)
pub type UNSIGNED8 = u8;
/// Alias for UNSIGNED16 (16-bit unsigned integer)
pub type UNSIGNED16 = u16;
/// Alias for UNSIGNED32 (32-bit unsigned integer)
pub type UNSIGNED32 = u32;

/// Represents a CANopen Node ID, wrapping a `u8` to ensure type safety.
///
/// Valid Node IDs are in the range 1-127. ID 0 is reserved for NMT broadcast
/// and is expressed as `None` wherever a broadcast target is accepted, so a
/// `NodeId` always names a concrete node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u8);

// --- Protocol Constants ---

/// Maximum CANopen Node ID (127).
pub const C_ADR_MAX_NODE_ID: u8 = 127;

/// Maximum size of a single node's Concise DCF stream in bytes.
pub const C_DCF_MAX_STREAM_SIZE: usize = 16_384;

/// Maximum number of per-node streams a Concise DCF set can hold.
pub const C_DCF_MAX_NODES: usize = 16;

/// Maximum number of EMCY records retained per node.
pub const C_MAX_NODE_ERRORS: usize = 32;

/// Total boot budget for a mandatory slave in microseconds (10 s).
/// A mandatory slave that keeps answering with "no response" is re-started
/// until this much time has elapsed since its first start.
pub const C_NODE_BOOT_TIME_US: u64 = 10 * 1000 * 1000;

/// How long the error-control start waits for a first heartbeat (2 s).
pub const C_HB_WAIT_TIMEOUT_US: u64 = 2 * 1000 * 1000;

/// Period of the boot-process polling alarms (100 ms).
pub const C_BOOT_POLL_PERIOD_US: u64 = 100 * 1000;

/// Error type for invalid Node ID creation.
#[derive(Debug, PartialEq, Eq)]
pub enum NodeIdError {
    /// Node ID is outside the valid range (1-127).
    InvalidRange(u8),
}

impl fmt::Display for NodeIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeIdError::InvalidRange(value) => {
                write!(f, "Invalid NodeId value: {}. Valid range is 1-127.", value)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for NodeIdError {}

impl TryFrom<u8> for NodeId {
    type Error = NodeIdError;

    /// Creates a `NodeId` from a `u8`, returning an error if the value is not
    /// a valid CANopen node identifier (1-127).
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1..=C_ADR_MAX_NODE_ID => Ok(NodeId(value)),
            _ => Err(NodeIdError::InvalidRange(value)),
        }
    }
}

impl From<NodeId> for u8 {
    /// Converts a `NodeId` back into its underlying `u8` representation.
    /// This conversion is infallible.
    fn from(node_id: NodeId) -> Self {
        node_id.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_range() {
        assert_eq!(NodeId::try_from(1), Ok(NodeId(1)));
        assert_eq!(NodeId::try_from(127), Ok(NodeId(127)));
        assert_eq!(NodeId::try_from(0), Err(NodeIdError::InvalidRange(0)));
        assert_eq!(NodeId::try_from(128), Err(NodeIdError::InvalidRange(128)));
    }

    #[test]
    fn test_node_id_round_trip() {
        let id = NodeId::try_from(42).unwrap();
        assert_eq!(u8::from(id), 42);
    }
}
