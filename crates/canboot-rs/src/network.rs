//! Network-list (0x1F81) and NMT-startup (0x1F80) decoding.
//!
//! The network list is the source of truth for which nodes take part in the
//! boot process and how they are treated; the startup word carries the
//! master's boot policy. Both stay in the local object dictionary and are
//! read through the [`LocalDictionary`] seam on every query.

use crate::hal::LocalDictionary;
use crate::od::{self, IDX_NETWORK_LIST_AU32, IDX_NMT_STARTUP_U32};
use crate::types::{C_ADR_MAX_NODE_ID, NodeId};
use core::ops::BitOr;

/// One entry of the network list (0x1F81, sub-index = node id) as a
/// type-safe bitmask over the raw 32-bit value.
///
/// Byte 0 carries the assignment flags, byte 1 the retry factor and
/// bytes 2-3 the node-guard time in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeAssignment(pub u32);

impl NodeAssignment {
    // --- Flag Constants ---
    /// Node takes part in the network as a slave of this master.
    pub const IS_SLAVE: Self = Self(1 << 0);
    /// Restart the boot process for this node when its bootup message is seen.
    pub const ON_BOOT_START_SLAVE: Self = Self(1 << 2);
    /// The whole network boot must not succeed without this node.
    pub const MANDATORY: Self = Self(1 << 3);
    /// Keep-alive: do not reset communication with this node at boot.
    pub const DO_NOT_RESET: Self = Self(1 << 4);
    /// Verify application software version before configuring.
    pub const SW_VERIFY: Self = Self(1 << 5);
    /// Allow application software update during boot.
    pub const SW_UPDATE: Self = Self(1 << 6);

    /// Creates a `NodeAssignment` from a raw u32 value.
    pub fn from_bits_truncate(bits: u32) -> Self {
        Self(bits)
    }

    /// Checks if all of the specified flags are set.
    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Returns an empty assignment.
    pub fn empty() -> Self {
        Self(0)
    }

    /// Retry factor byte for error-control supervision.
    pub fn retry_factor(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Node-guard time in milliseconds; zero means node guarding is unused.
    pub fn guard_time_ms(&self) -> u16 {
        (self.0 >> 16) as u16
    }
}

impl BitOr for NodeAssignment {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// The NMT startup word (0x1F80) as a type-safe bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NmtStartup(pub u32);

impl NmtStartup {
    /// The local node is the NMT master; clear means no boot is performed.
    pub const NMT_MASTER: Self = Self(1 << 0);
    /// Start all slaves with a single broadcast instead of individually.
    pub const START_ALL_SLAVES: Self = Self(1 << 1);
    /// Do not enter Operational automatically; an external actor does it.
    pub const MANUAL_OPERATIONAL: Self = Self(1 << 2);
    /// Do not start slaves at all; the application starts them.
    pub const MANUAL_START_SLAVE: Self = Self(1 << 3);

    pub fn from_bits_truncate(bits: u32) -> Self {
        Self(bits)
    }

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl BitOr for NmtStartup {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Reads the current startup policy word.
pub fn startup_policy(od: &impl LocalDictionary) -> NmtStartup {
    NmtStartup::from_bits_truncate(od::read_u32_or_zero(od, IDX_NMT_STARTUP_U32, 0))
}

/// Reads a node's network-list entry. A missing sub-index yields an empty
/// assignment, i.e. the node is not part of the network.
pub fn node_assignment(od: &impl LocalDictionary, node: NodeId) -> NodeAssignment {
    NodeAssignment::from_bits_truncate(od::read_u32_or_zero(od, IDX_NETWORK_LIST_AU32, node.0))
}

/// True if the node is flagged as a slave in the network list.
pub fn node_in_list(od: &impl LocalDictionary, node: NodeId) -> bool {
    node_assignment(od, node).contains(NodeAssignment::IS_SLAVE)
}

/// True if the node is a slave the boot process must not proceed without.
pub fn mandatory_node(od: &impl LocalDictionary, node: NodeId) -> bool {
    node_assignment(od, node).contains(NodeAssignment::IS_SLAVE | NodeAssignment::MANDATORY)
}

/// Iterates every possible slave id (1..=127).
pub fn all_node_ids() -> impl Iterator<Item = NodeId> {
    (1..=C_ADR_MAX_NODE_ID).map(NodeId)
}

/// True if any slave in the network list is flagged keep-alive
/// (`DO_NOT_RESET`), which forces targeted instead of broadcast resets.
pub fn keepalive_nodes_present(od: &impl LocalDictionary) -> bool {
    all_node_ids().any(|node| {
        node_assignment(od, node)
            .contains(NodeAssignment::IS_SLAVE | NodeAssignment::DO_NOT_RESET)
    })
}
