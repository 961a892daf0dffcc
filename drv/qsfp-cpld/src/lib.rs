// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Driver for QSFP I/O CPLDs
//!
//! These CPLDs expose the per-port sideband lines of QSFP cages (module
//! present, interrupt, low-power mode and reset) as 16-bit registers behind
//! SMBus word transactions.  Callers want one bit per port; the hardware
//! packs four ports' worth of lines into each register, in groups of four
//! bits, with some lines active-low and (on some parts) each byte's nibbles
//! swapped on the wire.  This crate does that translation.
//!
//! - [`transport`]: one word read or write per call, undoing the wire
//!   encoding
//! - [`layout`]: per-part register maps, as data
//! - [`engine`]: translation between port masks and register words
//! - [`cpld`]: a single attached CPLD, and its place in the port space
//! - [`attr`]: named text attributes in the format management software
//!   expects
//! - [`registry`]: the set of attached CPLDs, with per-device locking

#![cfg_attr(target_os = "none", no_std)]

use drv_i2c_api::ResponseCode;

pub mod attr;
pub mod bits;
pub mod cpld;
pub mod engine;
pub mod layout;
pub mod registry;
pub mod transport;

pub use bits::{BitSet, LogicalPortMask, RegisterWord};
pub use cpld::{Bank, QsfpCpld};
pub use layout::{Access, Feature, Layout, Polarity, Variant, WireEncoding};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CpldError {
    /// A bus transaction failed.  For a multi-register write, registers
    /// before `register` have already been updated.
    Transport {
        address: u8,
        register: u8,
        code: ResponseCode,
    },
    /// The feature, port, attribute or device handle does not exist on this
    /// device.
    InvalidSelector,
    /// Attribute text could not be parsed.
    ParseError,
    /// The feature or attribute exists but cannot be written, or the part
    /// lacks the requested register.
    UnsupportedOperation,
}
