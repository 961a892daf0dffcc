// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A single attached CPLD
//!
//! On banked parts (the LY6) each CPLD serves one contiguous slice of the
//! board's port space: bank 1 holds ports 0-15 and bank 2 ports 16-31.  A
//! [`QsfpCpld`] knows its bank and can translate between its own local mask
//! and the board-wide one.

use crate::bits::LogicalPortMask;
use crate::engine;
use crate::layout::{Layout, Variant, MAX_GROUPS};
use crate::transport::Transport;
use crate::{CpldError, Feature};
use drv_i2c_api::{I2cDevice, WordBus};
use num_derive::FromPrimitive;

#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u8)]
pub enum Bank {
    One = 1,
    Two = 2,
}

impl Bank {
    pub fn from_index(index: u8) -> Result<Self, CpldError> {
        num_traits::FromPrimitive::from_u8(index)
            .ok_or(CpldError::InvalidSelector)
    }

    pub fn index(self) -> u8 {
        self as u8
    }
}

pub struct QsfpCpld<B> {
    transport: Transport<B>,
    layout: &'static Layout,
    bank: Option<Bank>,
}

impl<B: WordBus> QsfpCpld<B> {
    /// Binds a CPLD of the given variant.  Banked variants need a bank, and
    /// unbanked ones must not be given one.  This performs no bus access.
    pub fn new(
        bus: B,
        device: I2cDevice,
        variant: Variant,
        bank: Option<Bank>,
    ) -> Result<Self, CpldError> {
        let layout = variant.layout();

        match bank {
            Some(b) if b.index() <= layout.banks && variant.banked() => (),
            None if !variant.banked() => (),
            _ => return Err(CpldError::InvalidSelector),
        }

        Ok(Self {
            transport: Transport::new(bus, device, layout.encoding),
            layout,
            bank,
        })
    }

    pub fn layout(&self) -> &'static Layout {
        self.layout
    }

    pub fn variant(&self) -> Variant {
        self.layout.variant
    }

    pub fn bank(&self) -> Option<Bank> {
        self.bank
    }

    pub fn device(&self) -> &I2cDevice {
        self.transport.device()
    }

    /// First board-wide port served by this device.
    pub fn base_port(&self) -> u8 {
        match self.bank {
            Some(b) => (b.index() - 1) * self.layout.ports,
            None => 0,
        }
    }

    /// The board-wide ports served by this device.
    pub fn global_ports(&self) -> LogicalPortMask {
        LogicalPortMask::from_bits(
            LogicalPortMask::low(u32::from(self.layout.ports)).0
                << self.base_port(),
        )
    }

    pub fn get_feature_mask(
        &self,
        feature: Feature,
    ) -> Result<LogicalPortMask, CpldError> {
        engine::get_feature_mask(&self.transport, self.layout, feature)
    }

    pub fn set_feature_mask(
        &self,
        feature: Feature,
        mask: LogicalPortMask,
    ) -> Result<(), CpldError> {
        engine::set_feature_mask(&self.transport, self.layout, feature, mask)
    }

    /// Like [`Self::get_feature_mask`], with bits placed at this device's
    /// board-wide port numbers.
    pub fn global_feature_mask(
        &self,
        feature: Feature,
    ) -> Result<LogicalPortMask, CpldError> {
        let local = self.get_feature_mask(feature)?;
        Ok(LogicalPortMask::from_bits(local.0 << self.base_port()))
    }

    /// Writes this device's slice of a board-wide mask.  Bits for ports
    /// served by other devices are ignored.
    pub fn set_global_feature_mask(
        &self,
        feature: Feature,
        mask: LogicalPortMask,
    ) -> Result<(), CpldError> {
        let local = (mask & self.global_ports()).0 >> self.base_port();
        self.set_feature_mask(feature, LogicalPortMask::from_bits(local))
    }

    /// Reads `feature` for local port `port`.
    pub fn get_port(
        &self,
        feature: Feature,
        port: u8,
    ) -> Result<bool, CpldError> {
        engine::get_port(&self.transport, self.layout, feature, port)
    }

    pub fn set_port(
        &self,
        feature: Feature,
        port: u8,
        asserted: bool,
    ) -> Result<(), CpldError> {
        engine::set_port(&self.transport, self.layout, feature, port, asserted)
    }

    fn led_register(&self) -> Result<u8, CpldError> {
        self.layout.led_mode.ok_or(CpldError::UnsupportedOperation)
    }

    pub fn led_mode(&self) -> Result<u16, CpldError> {
        engine::read_register(&self.transport, self.led_register()?)
    }

    pub fn set_led_mode(&self, mode: u16) -> Result<(), CpldError> {
        engine::write_register(&self.transport, self.led_register()?, mode)
    }

    /// Reads every port register, in logical bit order.
    pub fn dump(
        &self,
    ) -> Result<heapless::Vec<(u8, u16), MAX_GROUPS>, CpldError> {
        let mut out = heapless::Vec::new();
        for group in self.layout.groups {
            let word = self.transport.read_word(group.reg)?;
            // Layouts are checked to have at most MAX_GROUPS groups.
            let _ = out.push((group.reg, word.0));
        }
        Ok(out)
    }
}
