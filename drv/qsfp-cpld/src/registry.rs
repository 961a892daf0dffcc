// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Attached CPLDs
//!
//! A [`Registry`] owns a fixed number of device slots, each behind its own
//! lock.  Everything that touches a device goes through [`Registry::with`],
//! so a read-modify-write on one device can never interleave with another
//! on the same device, while different devices proceed independently.
//!
//! Handles carry the generation of the slot they were issued for; once a
//! device is detached its old handles stop resolving, even if the slot is
//! reused.

use crate::bits::LogicalPortMask;
use crate::cpld::{Bank, QsfpCpld};
use crate::layout::Variant;
use crate::{CpldError, Feature};
use drv_i2c_api::{BusId, I2cDevice, WordBus};
use ringbuf::*;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DeviceHandle {
    index: usize,
    generation: u16,
}

impl DeviceHandle {
    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttachError {
    Cpld(CpldError),
    /// Every slot is occupied.
    Full,
    /// Another device of the same part already serves this bank on this
    /// bus.
    BankInUse,
    /// This exact device is already attached.
    AlreadyAttached,
    /// The bus cannot do SMBus word transactions.
    UnsupportedBus,
}

impl From<CpldError> for AttachError {
    fn from(e: CpldError) -> Self {
        AttachError::Cpld(e)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    Attached {
        index: usize,
        address: u8,
        variant: Variant,
        bank: Option<Bank>,
    },
    Detached {
        index: usize,
        address: u8,
    },
    Rejected {
        address: u8,
        err: AttachError,
    },
    StaleHandle(DeviceHandle),
}

ringbuf!(Trace, 16, Trace::None);

struct Slot<B> {
    generation: u16,
    cpld: Option<QsfpCpld<B>>,
}

pub struct Registry<B, const N: usize> {
    slots: [spin::Mutex<Slot<B>>; N],
}

impl<B: WordBus, const N: usize> Default for Registry<B, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: WordBus, const N: usize> Registry<B, N> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| {
                spin::Mutex::new(Slot {
                    generation: 0,
                    cpld: None,
                })
            }),
        }
    }

    /// Attaches a CPLD.  This performs no bus transactions; the device is
    /// first touched by whatever the caller does with it.
    pub fn attach(
        &mut self,
        bus: B,
        device: I2cDevice,
        variant: Variant,
        bank: Option<Bank>,
    ) -> Result<DeviceHandle, AttachError> {
        let r = self.try_attach(bus, device, variant, bank);
        if let Err(err) = r {
            ringbuf_entry!(Trace::Rejected {
                address: device.address,
                err
            });
        }
        r
    }

    fn try_attach(
        &mut self,
        bus: B,
        device: I2cDevice,
        variant: Variant,
        bank: Option<Bank>,
    ) -> Result<DeviceHandle, AttachError> {
        if !bus.supports_word_data() {
            return Err(AttachError::UnsupportedBus);
        }

        let cpld = QsfpCpld::new(bus, device, variant, bank)?;

        for slot in self.slots.iter_mut() {
            let Some(other) = slot.get_mut().cpld.as_ref() else {
                continue;
            };
            if *other.device() == device {
                return Err(AttachError::AlreadyAttached);
            }
            if bank.is_some()
                && other.variant() == variant
                && other.bank() == bank
                && other.device().bus() == device.bus()
            {
                return Err(AttachError::BankInUse);
            }
        }

        let (index, slot) = self
            .slots
            .iter_mut()
            .map(|s| s.get_mut())
            .enumerate()
            .find(|(_, s)| s.cpld.is_none())
            .ok_or(AttachError::Full)?;

        slot.cpld = Some(cpld);
        ringbuf_entry!(Trace::Attached {
            index,
            address: device.address,
            variant,
            bank
        });

        Ok(DeviceHandle {
            index,
            generation: slot.generation,
        })
    }

    /// Detaches a device, invalidating every handle to it.
    pub fn detach(&mut self, handle: DeviceHandle) -> Result<(), CpldError> {
        let slot = self
            .slots
            .get_mut(handle.index)
            .ok_or(CpldError::InvalidSelector)?
            .get_mut();

        if slot.generation != handle.generation {
            ringbuf_entry!(Trace::StaleHandle(handle));
            return Err(CpldError::InvalidSelector);
        }
        let cpld = slot.cpld.take().ok_or(CpldError::InvalidSelector)?;
        slot.generation = slot.generation.wrapping_add(1);

        ringbuf_entry!(Trace::Detached {
            index: handle.index,
            address: cpld.device().address
        });
        Ok(())
    }

    /// Runs `f` against the device behind `handle`, holding that device's
    /// lock for the duration.
    pub fn with<R>(
        &self,
        handle: DeviceHandle,
        f: impl FnOnce(&QsfpCpld<B>) -> Result<R, CpldError>,
    ) -> Result<R, CpldError> {
        let slot = self
            .slots
            .get(handle.index)
            .ok_or(CpldError::InvalidSelector)?
            .lock();

        match slot.cpld.as_ref() {
            Some(cpld) if slot.generation == handle.generation => f(cpld),
            _ => {
                ringbuf_entry!(Trace::StaleHandle(handle));
                Err(CpldError::InvalidSelector)
            }
        }
    }

    /// Finds the handle of an attached device.
    pub fn find(&self, device: &I2cDevice) -> Option<DeviceHandle> {
        self.slots.iter().enumerate().find_map(|(index, s)| {
            let slot = s.lock();
            slot.cpld
                .as_ref()
                .filter(|c| c.device() == device)
                .map(|_| DeviceHandle {
                    index,
                    generation: slot.generation,
                })
        })
    }

    /// Handles of every attached device, in slot order.
    pub fn handles(&self) -> heapless::Vec<DeviceHandle, N> {
        let mut out = heapless::Vec::new();
        for (index, s) in self.slots.iter().enumerate() {
            let slot = s.lock();
            if slot.cpld.is_some() {
                // At most N slots, so this cannot overflow.
                let _ = out.push(DeviceHandle {
                    index,
                    generation: slot.generation,
                });
            }
        }
        out
    }

    /// Reads `feature` across every device of `variant` attached to `bus`,
    /// each contributing its bank's slice of the port space.  Devices are
    /// read in slot order and the first failure is returned.
    ///
    /// Banks only unify within a bus; devices elsewhere belong to another
    /// board and are not consulted.
    pub fn global_feature_mask(
        &self,
        bus: BusId,
        variant: Variant,
        feature: Feature,
    ) -> Result<LogicalPortMask, CpldError> {
        let mut mask = LogicalPortMask::empty();
        for s in &self.slots {
            let slot = s.lock();
            if let Some(cpld) = on_bus(&slot, bus, variant) {
                mask = mask | cpld.global_feature_mask(feature)?;
            }
        }
        Ok(mask)
    }

    /// Writes `feature` across every device of `variant` attached to `bus`,
    /// each taking its bank's slice of `mask`.
    pub fn set_global_feature_mask(
        &self,
        bus: BusId,
        variant: Variant,
        feature: Feature,
        mask: LogicalPortMask,
    ) -> Result<(), CpldError> {
        for s in &self.slots {
            let slot = s.lock();
            if let Some(cpld) = on_bus(&slot, bus, variant) {
                cpld.set_global_feature_mask(feature, mask)?;
            }
        }
        Ok(())
    }
}

fn on_bus<B: WordBus>(
    slot: &Slot<B>,
    bus: BusId,
    variant: Variant,
) -> Option<&QsfpCpld<B>> {
    slot.cpld
        .as_ref()
        .filter(|c| c.variant() == variant && c.device().bus() == bus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drv_i2c_api::mock::MockBus;
    use drv_i2c_api::{Controller, PortIndex};

    fn dev(address: u8) -> I2cDevice {
        I2cDevice::new(Controller::I2C1, PortIndex(0), None, address)
    }

    #[test]
    fn attach_and_find() {
        let bus = MockBus::new();
        let mut reg: Registry<&MockBus, 4> = Registry::new();

        let a = reg
            .attach(&bus, dev(0x38), Variant::Ly6, Some(Bank::One))
            .unwrap();
        let b = reg
            .attach(&bus, dev(0x39), Variant::Ly6, Some(Bank::Two))
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(reg.find(&dev(0x39)), Some(b));
        assert_eq!(reg.find(&dev(0x3a)), None);
        assert_eq!(reg.handles().as_slice(), &[a, b]);
        assert!(bus.transactions().is_empty());
    }

    #[test]
    fn attach_rejections() {
        let bus = MockBus::new();
        let mut reg: Registry<&MockBus, 2> = Registry::new();

        reg.attach(&bus, dev(0x38), Variant::Ly6, Some(Bank::One))
            .unwrap();
        assert_eq!(
            reg.attach(&bus, dev(0x38), Variant::Ly9, None),
            Err(AttachError::AlreadyAttached)
        );
        assert_eq!(
            reg.attach(&bus, dev(0x39), Variant::Ly6, Some(Bank::One)),
            Err(AttachError::BankInUse)
        );
        assert_eq!(
            reg.attach(&bus, dev(0x39), Variant::Ly6, None),
            Err(AttachError::Cpld(CpldError::InvalidSelector))
        );

        // The same bank on another bus is a different board.
        let other = I2cDevice::new(Controller::I2C2, PortIndex(0), None, 0x39);
        reg.attach(&bus, other, Variant::Ly6, Some(Bank::One))
            .unwrap();
        assert_eq!(
            reg.attach(&bus, dev(0x3a), Variant::Ly9, None),
            Err(AttachError::Full)
        );

        let plain = MockBus::without_word_data();
        let mut reg: Registry<&MockBus, 2> = Registry::new();
        assert_eq!(
            reg.attach(&plain, dev(0x3a), Variant::Ly9, None),
            Err(AttachError::UnsupportedBus)
        );
    }

    #[test]
    fn aggregates_stay_on_their_bus() {
        use crate::transport::swap_nibbles;
        use drv_i2c_api::mock::Direction;

        let bus = MockBus::new();
        let mut reg: Registry<&MockBus, 4> = Registry::new();
        let left = dev(0x38);
        let right = I2cDevice::new(Controller::I2C2, PortIndex(0), None, 0x39);

        reg.attach(&bus, left, Variant::Ly6, Some(Bank::One))
            .unwrap();
        reg.attach(&bus, right, Variant::Ly6, Some(Bank::One))
            .unwrap();

        // LPMode on port 0 of the left board and port 1 of the right.
        bus.set_register(0x38, 1, swap_nibbles(0x0001));
        bus.set_register(0x39, 1, swap_nibbles(0x0010));

        assert_eq!(
            reg.global_feature_mask(left.bus(), Variant::Ly6, Feature::LpMode),
            Ok(LogicalPortMask::from_bits(0x1))
        );
        assert_eq!(
            reg.global_feature_mask(right.bus(), Variant::Ly6, Feature::LpMode),
            Ok(LogicalPortMask::from_bits(0x2))
        );

        bus.clear_log();
        reg.set_global_feature_mask(
            left.bus(),
            Variant::Ly6,
            Feature::Reset,
            LogicalPortMask::from_bits(u32::MAX),
        )
        .unwrap();
        assert_eq!(bus.count(0x39, Direction::Read), 0);
        assert_eq!(bus.count(0x39, Direction::Write), 0);
        assert_eq!(bus.count(0x38, Direction::Write), 4);
    }

    #[test]
    fn stale_handles() {
        let bus = MockBus::new();
        let mut reg: Registry<&MockBus, 1> = Registry::new();

        let old = reg.attach(&bus, dev(0x3a), Variant::Ly9, None).unwrap();
        assert!(reg.with(old, |c| c.led_mode()).is_ok());
        reg.detach(old).unwrap();

        assert_eq!(
            reg.with(old, |c| c.led_mode()),
            Err(CpldError::InvalidSelector)
        );
        assert_eq!(reg.detach(old), Err(CpldError::InvalidSelector));

        // Slot reuse does not revive the old handle.
        let new = reg.attach(&bus, dev(0x3a), Variant::Ly9, None).unwrap();
        assert_eq!(new.index(), old.index());
        assert_ne!(new, old);
        assert_eq!(
            reg.with(old, |c| c.led_mode()),
            Err(CpldError::InvalidSelector)
        );
        assert!(reg.with(new, |c| c.led_mode()).is_ok());
    }
}
