//! Standard Object Dictionary indices consumed by the boot process.
//!
//! This module provides `pub const` definitions for the well-known object
//! indices from CiA DS 301/302 the boot core touches, using a consistent
//! `IDX_` and `SUBIDX_` naming convention, plus a small read helper over the
//! [`LocalDictionary`] seam.

use crate::hal::LocalDictionary;

// --- 0x1000 - 0x1FFF: Communication Profile Area ---

pub const IDX_DEVICE_TYPE_U32: u16 = 0x1000;
pub const IDX_CONSUMER_HEARTBEAT_TIME: u16 = 0x1016;
pub const IDX_IDENTITY_OBJECT_REC: u16 = 0x1018;
pub const SUBIDX_IDENTITY_VENDOR_ID: u8 = 1;
pub const SUBIDX_IDENTITY_PRODUCT_CODE: u8 = 2;
pub const SUBIDX_IDENTITY_REVISION: u8 = 3;
pub const SUBIDX_IDENTITY_SERIAL: u8 = 4;
pub const IDX_VERIFY_CONFIGURATION_REC: u16 = 0x1020;
pub const SUBIDX_VERIFY_CONF_DATE: u8 = 1;
pub const SUBIDX_VERIFY_CONF_TIME: u8 = 2;

// --- 0x1F2x: Configuration Manager ---

pub const IDX_EXPECTED_CONF_DATE: u16 = 0x1F26;
pub const IDX_EXPECTED_CONF_TIME: u16 = 0x1F27;

// --- 0x1F8x: NMT Master / Network List ---

pub const IDX_NMT_STARTUP_U32: u16 = 0x1F80;
pub const IDX_NETWORK_LIST_AU32: u16 = 0x1F81;
pub const IDX_EXPECTED_DEVICE_TYPE: u16 = 0x1F84;
pub const IDX_EXPECTED_VENDOR_ID: u16 = 0x1F85;
pub const IDX_EXPECTED_PRODUCT_CODE: u16 = 0x1F86;
pub const IDX_EXPECTED_REVISION: u16 = 0x1F87;
pub const IDX_EXPECTED_SERIAL: u16 = 0x1F88;

/// Reads `index:subindex` from the local dictionary, absorbing any failure
/// into 0. The boot process treats all of its expectation objects as
/// optional: a missing entry means "no expectation configured".
pub fn read_u32_or_zero(od: &impl LocalDictionary, index: u16, subindex: u8) -> u32 {
    od.read_u32(index, subindex).unwrap_or(0)
}
