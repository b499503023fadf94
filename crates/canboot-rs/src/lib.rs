//! # canboot-rs
//!
//! A `no_std`-first CANopen network boot manager (CiA DS 302 boot-up
//! procedure) for NMT masters.
//!
//! The crate owns the boot *policy*: it reads the network list and startup
//! word from the local object dictionary, verifies each slave's identity and
//! configuration version, pushes Concise DCF configuration streams over SDO,
//! waits for error control to come up and finally starts the fleet. The
//! transport (CAN driver, SDO engine, timers) stays outside, reached through
//! the trait seams in [`hal`].
//!
//! Everything is callback driven: the application forwards SDO completions,
//! bootup messages, EMCY telegrams and alarm expiries into the
//! [`boot::BootManager`] entry points, and the internal state machines do
//! the rest.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod boot;
pub mod dcf;
pub mod emcy;
pub mod hal;
pub mod network;
pub mod od;
pub mod sm;
pub mod types;

pub use boot::{BootManager, BootResult, BootState, NodeBootState};
pub use dcf::{DcfEntry, DcfReader, DcfSet, DcfStream};
pub use emcy::{EmcyRecord, ErrorStack};
pub use hal::{
    AlarmId, AlarmService, CanError, CanInterface, Clock, LocalDictionary, NmtCommand, NmtMaster,
    NodeState, SdoClient, SdoReadStatus, SdoWriteStatus,
};
pub use network::{NmtStartup, NodeAssignment};
pub use types::NodeId;
