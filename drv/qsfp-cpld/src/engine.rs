// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Translation between port masks and register words
//!
//! Everything here is stateless: each call takes the layout and transport it
//! works against, and every write re-reads the registers it modifies, since
//! other features share those registers and must be preserved.
//!
//! Masks handed to and returned from this module are in "condition true"
//! terms: for an active-low feature, a set bit means the hardware line is
//! low.  Polarity is applied after aggregating on the way in and before
//! disaggregating on the way out, so `set_feature_mask(f, m)` followed by
//! `get_feature_mask(f)` yields `m` restricted to the layout's ports.
//!
//! A write that spans several registers is not atomic.  If a register write
//! fails, the registers before it keep their new values and the error names
//! the register that failed; callers wanting to know the resulting state
//! must read it back.

use crate::bits::{LogicalPortMask, RegisterWord};
use crate::layout::{FeatureDesc, Layout};
use crate::transport::Transport;
use crate::{CpldError, Feature};
use drv_i2c_api::WordBus;
use ringbuf::*;

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    PartialWrite {
        address: u8,
        feature: Feature,
        failed_reg: u8,
        committed: u8,
    },
    ReadOnly(Feature),
}

ringbuf!(Trace, 8, Trace::None);

fn writable<'l>(
    layout: &'l Layout,
    feature: Feature,
) -> Result<&'l FeatureDesc, CpldError> {
    let desc = layout.feature(feature)?;
    if !desc.writable() {
        ringbuf_entry!(Trace::ReadOnly(feature));
        return Err(CpldError::UnsupportedOperation);
    }
    Ok(desc)
}

/// Reads `feature` for every port of the device.
///
/// Registers are read in ascending order; the first failure aborts the
/// read and no mask is returned.  Bits beyond the layout's ports are clear.
pub fn get_feature_mask<B: WordBus>(
    transport: &Transport<B>,
    layout: &Layout,
    feature: Feature,
) -> Result<LogicalPortMask, CpldError> {
    let desc = layout.feature(feature)?;
    let mut mask = LogicalPortMask::empty();

    for group in layout.groups {
        let word = transport.read_word(group.reg)?;
        for slot in 0..group.ports {
            if word.test(layout.bit(slot, desc)) {
                mask.set(u32::from(group.first_port + slot));
            }
        }
    }

    let ports = u32::from(layout.ports);
    Ok(if desc.polarity.is_active_low() {
        mask.complement(ports)
    } else {
        mask
    })
}

/// Writes `feature` for every port of the device.  Bits of `mask` beyond
/// the layout's ports are ignored.
///
/// Read-only features are refused before any bus access.
pub fn set_feature_mask<B: WordBus>(
    transport: &Transport<B>,
    layout: &Layout,
    feature: Feature,
    mask: LogicalPortMask,
) -> Result<(), CpldError> {
    let desc = writable(layout, feature)?;

    let ports = u32::from(layout.ports);
    let hw = if desc.polarity.is_active_low() {
        mask.complement(ports)
    } else {
        mask.truncate(ports)
    };

    for (committed, group) in layout.groups.iter().enumerate() {
        let mut word = transport.read_word(group.reg)?;
        for slot in 0..group.ports {
            let port = u32::from(group.first_port + slot);
            word.assign(layout.bit(slot, desc), hw.test(port));
        }

        if let Err(e) = transport.write_word(group.reg, word) {
            if committed > 0 {
                ringbuf_entry!(Trace::PartialWrite {
                    address: transport.device().address,
                    feature,
                    failed_reg: group.reg,
                    committed: committed as u8,
                });
            }
            return Err(e);
        }
    }

    Ok(())
}

/// Reads `feature` for a single port.
pub fn get_port<B: WordBus>(
    transport: &Transport<B>,
    layout: &Layout,
    feature: Feature,
    port: u8,
) -> Result<bool, CpldError> {
    let desc = layout.feature(feature)?;
    let (group, slot) = layout.locate(port)?;

    let word = transport.read_word(group.reg)?;
    Ok(word.test(layout.bit(slot, desc)) != desc.polarity.is_active_low())
}

/// Writes `feature` for a single port, touching only the register that
/// holds it.
pub fn set_port<B: WordBus>(
    transport: &Transport<B>,
    layout: &Layout,
    feature: Feature,
    port: u8,
    asserted: bool,
) -> Result<(), CpldError> {
    let desc = writable(layout, feature)?;
    let (group, slot) = layout.locate(port)?;

    let mut word = transport.read_word(group.reg)?;
    word.assign(
        layout.bit(slot, desc),
        asserted != desc.polarity.is_active_low(),
    );
    transport.write_word(group.reg, word)
}

/// Reads a whole register, for registers that hold a plain value rather
/// than port bits.
pub fn read_register<B: WordBus>(
    transport: &Transport<B>,
    reg: u8,
) -> Result<u16, CpldError> {
    transport.read_word(reg).map(|w| w.0)
}

pub fn write_register<B: WordBus>(
    transport: &Transport<B>,
    reg: u8,
    value: u16,
) -> Result<(), CpldError> {
    transport.write_word(reg, RegisterWord::from_bits(value))
}
