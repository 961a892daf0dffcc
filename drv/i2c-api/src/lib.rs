// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bus-level API for register-addressed I2C peers
//!
//! Device drivers in this workspace never drive an I2C controller directly.
//! Instead they are handed something implementing [`WordBus`], which can
//! perform a single SMBus word transaction against a device, and an
//! [`I2cDevice`] naming which device that is.
//!
//! # I2C devices
//!
//! An I2C device is uniquely identified by a 4-tuple:
//!
//! - The I2C controller
//! - The port for that controller, identifying a bus
//! - The multiplexer and segment on that bus, if any
//! - The address of the device itself
//!

#![cfg_attr(target_os = "none", no_std)]

use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;

#[cfg(feature = "mock")]
pub mod mock;

/// The response code returned from a failed bus transaction.  These are
/// specific, not because the caller is expected to handle them differently,
/// but to give upstack software some modicum of context surrounding the
/// error.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum ResponseCode {
    /// Bad response from the bus implementation
    BadResponse = 1,
    /// Bad argument passed to the bus implementation
    BadArg = 2,
    /// Indicated I2C device did not acknowledge its address
    NoDevice = 3,
    /// Device does not have indicated register
    NoRegister = 8,
    /// I2C bus was spontaneously reset during operation
    BusReset = 17,
    /// I2C bus locked up and was reset
    BusLocked = 19,
    /// I2C controller appeared to be busy
    ControllerBusy = 21,
    /// I2C bus error
    BusError = 22,
    /// Requested operation is not supported by the controller
    OperationNotSupported = 25,
    /// Another initiator won arbitration for the bus
    ArbitrationLost = 27,
}

impl ResponseCode {
    /// Maps an errno-style status (as returned, negated, by SMBus primitives
    /// on hosted platforms) onto a response code.  Both `-EIO` and `EIO` are
    /// accepted; unknown values become [`ResponseCode::BadResponse`].
    pub fn from_errno(errno: i32) -> Self {
        match errno.unsigned_abs() {
            5 => ResponseCode::BusError,               // EIO
            6 => ResponseCode::NoDevice,               // ENXIO
            11 => ResponseCode::ArbitrationLost,       // EAGAIN
            16 => ResponseCode::ControllerBusy,        // EBUSY
            22 => ResponseCode::BadArg,                // EINVAL
            71 | 121 => ResponseCode::BusError,        // EPROTO, EREMOTEIO
            95 => ResponseCode::OperationNotSupported, // EOPNOTSUPP
            110 => ResponseCode::BusLocked,            // ETIMEDOUT
            _ => ResponseCode::BadResponse,
        }
    }
}

/// Interprets the raw return value of an SMBus word read: negative values
/// are failures, anything else carries the 16-bit word.
pub fn word_from_status(status: i32) -> Result<u16, ResponseCode> {
    if status < 0 {
        Err(ResponseCode::from_errno(status))
    } else {
        u16::try_from(status).map_err(|_| ResponseCode::BadResponse)
    }
}

/// Interprets the raw return value of an SMBus word write.
pub fn unit_from_status(status: i32) -> Result<(), ResponseCode> {
    if status < 0 {
        Err(ResponseCode::from_errno(status))
    } else {
        Ok(())
    }
}

///
/// The controller for a given I2C device.
///
#[derive(Copy, Clone, Debug, FromPrimitive, Eq, PartialEq)]
#[repr(u8)]
pub enum Controller {
    I2C0 = 0,
    I2C1 = 1,
    I2C2 = 2,
    I2C3 = 3,
    I2C4 = 4,
    I2C5 = 5,
    I2C6 = 6,
    I2C7 = 7,
    Mock = 0xff,
}

#[derive(Copy, Clone, Debug, FromPrimitive, Eq, PartialEq)]
#[allow(clippy::unusual_byte_groupings)]
pub enum ReservedAddress {
    GeneralCall = 0b0000_000,
    CBUSAddress = 0b0000_001,
    FutureBus = 0b0000_010,
    FuturePurposes = 0b0000_011,
    HighSpeedReserved00 = 0b0000_100,
    HighSpeedReserved01 = 0b0000_101,
    HighSpeedReserved10 = 0b0000_110,
    HighSpeedReserved11 = 0b0000_111,
    TenBit00 = 0b1111_100,
    TenBit01 = 0b1111_101,
    TenBit10 = 0b1111_110,
    TenBit11 = 0b1111_111,
}

impl ReservedAddress {
    /// Returns the reservation covering `address`, if any.
    pub fn check(address: u8) -> Option<Self> {
        Self::from_u8(address)
    }
}

///
/// The port index for a given I2C device.  Some controllers can have multiple
/// ports (which themselves are connected to different I2C buses), but only
/// one port can be active at a time.
///
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PortIndex(pub u8);

///
/// A multiplexer identifier for a given I2C bus.
///
#[derive(Copy, Clone, Debug, FromPrimitive, Eq, PartialEq)]
#[repr(u8)]
pub enum Mux {
    M1 = 1,
    M2 = 2,
    M3 = 3,
    M4 = 4,
}

///
/// A segment identifier on a given multiplexer.
///
#[derive(Copy, Clone, Debug, FromPrimitive, Eq, PartialEq)]
#[repr(u8)]
pub enum Segment {
    S1 = 1,
    S2 = 2,
    S3 = 3,
    S4 = 4,
    S5 = 5,
    S6 = 6,
    S7 = 7,
    S8 = 8,
}

///
/// The bus a device sits on: everything in an [`I2cDevice`] but its address.
/// Two devices can see each other's traffic exactly when their buses match.
///
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BusId {
    pub controller: Controller,
    pub port: PortIndex,
    pub segment: Option<(Mux, Segment)>,
}

///
/// The tuple that uniquely identifies an I2C device.  The multiplexer and
/// the segment are optional, but if one is present, the other must be.
///
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct I2cDevice {
    pub controller: Controller,
    pub port: PortIndex,
    pub segment: Option<(Mux, Segment)>,
    pub address: u8,
}

impl core::fmt::Display for I2cDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let addr = self.address;

        match self.segment {
            None => {
                write!(f, "{:?}:{:?} {:#x}", self.controller, self.port, addr)
            }
            Some((mux, segment)) => {
                write!(
                    f,
                    "{:?}:{:?}, {:?}:{:?} {:#x}",
                    self.controller, self.port, mux, segment, addr
                )
            }
        }
    }
}

impl I2cDevice {
    ///
    /// Return a new [`I2cDevice`].  This performs no bus access.
    ///
    pub fn new(
        controller: Controller,
        port: PortIndex,
        segment: Option<(Mux, Segment)>,
        address: u8,
    ) -> Self {
        Self {
            controller,
            port,
            segment,
            address,
        }
    }

    pub fn bus(&self) -> BusId {
        BusId {
            controller: self.controller,
            port: self.port,
            segment: self.segment,
        }
    }
}

///
/// A bus that can perform SMBus word transactions.
///
/// Each call is exactly one transaction on the wire: a command (register)
/// byte followed by a 16-bit data word, low byte first.  Implementations
/// must not retry; a failed transaction is reported as-is.
///
pub trait WordBus {
    /// Performs an SMBus "read word data" against `device`, using `reg` as
    /// the command byte.
    fn read_word_data(
        &self,
        device: &I2cDevice,
        reg: u8,
    ) -> Result<u16, ResponseCode>;

    /// Performs an SMBus "write word data" against `device`.
    fn write_word_data(
        &self,
        device: &I2cDevice,
        reg: u8,
        value: u16,
    ) -> Result<(), ResponseCode>;

    /// Whether the underlying controller can do word transactions at all.
    /// Drivers check this once, when a device is attached.
    fn supports_word_data(&self) -> bool {
        true
    }
}

impl<B: WordBus + ?Sized> WordBus for &B {
    fn read_word_data(
        &self,
        device: &I2cDevice,
        reg: u8,
    ) -> Result<u16, ResponseCode> {
        (**self).read_word_data(device, reg)
    }

    fn write_word_data(
        &self,
        device: &I2cDevice,
        reg: u8,
        value: u16,
    ) -> Result<(), ResponseCode> {
        (**self).write_word_data(device, reg, value)
    }

    fn supports_word_data(&self) -> bool {
        (**self).supports_word_data()
    }
}

///
/// A bus whose primitives report errno-style status words, as SMBus calls on
/// hosted platforms do: a negative value is a failure, and a successful read
/// carries the word in the low 16 bits.
///
pub trait SmbusStatus {
    fn read_word_status(&self, device: &I2cDevice, reg: u8) -> i32;

    fn write_word_status(
        &self,
        device: &I2cDevice,
        reg: u8,
        value: u16,
    ) -> i32;

    fn supports_word_data(&self) -> bool {
        true
    }
}

///
/// Adapts an [`SmbusStatus`] bus to [`WordBus`].
///
pub struct StatusBus<R>(pub R);

impl<R: SmbusStatus> WordBus for StatusBus<R> {
    fn read_word_data(
        &self,
        device: &I2cDevice,
        reg: u8,
    ) -> Result<u16, ResponseCode> {
        word_from_status(self.0.read_word_status(device, reg))
    }

    fn write_word_data(
        &self,
        device: &I2cDevice,
        reg: u8,
        value: u16,
    ) -> Result<(), ResponseCode> {
        unit_from_status(self.0.write_word_status(device, reg, value))
    }

    fn supports_word_data(&self) -> bool {
        self.0.supports_word_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert_eq!(ResponseCode::from_errno(-6), ResponseCode::NoDevice);
        assert_eq!(ResponseCode::from_errno(6), ResponseCode::NoDevice);
        assert_eq!(ResponseCode::from_errno(-110), ResponseCode::BusLocked);
        assert_eq!(ResponseCode::from_errno(-9999), ResponseCode::BadResponse);
        assert_eq!(
            ResponseCode::from_errno(i32::MIN),
            ResponseCode::BadResponse
        );
    }

    #[test]
    fn status_conversion() {
        assert_eq!(word_from_status(0x1234), Ok(0x1234));
        assert_eq!(word_from_status(-5), Err(ResponseCode::BusError));
        assert_eq!(word_from_status(0x1_0000), Err(ResponseCode::BadResponse));
        assert_eq!(unit_from_status(0), Ok(()));
        assert_eq!(unit_from_status(-11), Err(ResponseCode::ArbitrationLost));
    }

    struct Fixed {
        read: i32,
        write: i32,
    }

    impl SmbusStatus for Fixed {
        fn read_word_status(&self, _: &I2cDevice, _: u8) -> i32 {
            self.read
        }

        fn write_word_status(&self, _: &I2cDevice, _: u8, _: u16) -> i32 {
            self.write
        }
    }

    #[test]
    fn status_bus_maps_errno() {
        let dev = I2cDevice::new(Controller::I2C0, PortIndex(0), None, 0x38);

        let ok = StatusBus(Fixed {
            read: 0xbeef,
            write: 0,
        });
        assert_eq!(ok.read_word_data(&dev, 1), Ok(0xbeef));
        assert_eq!(ok.write_word_data(&dev, 1, 0), Ok(()));
        assert!(ok.supports_word_data());

        let bad = StatusBus(Fixed {
            read: -6,
            write: -110,
        });
        assert_eq!(bad.read_word_data(&dev, 1), Err(ResponseCode::NoDevice));
        assert_eq!(
            bad.write_word_data(&dev, 1, 0),
            Err(ResponseCode::BusLocked)
        );
    }

    #[test]
    fn bus_ignores_address() {
        let a = I2cDevice::new(Controller::I2C1, PortIndex(0), None, 0x38);
        let b = I2cDevice::new(Controller::I2C1, PortIndex(0), None, 0x39);
        let c = I2cDevice::new(Controller::I2C2, PortIndex(0), None, 0x38);
        let d = I2cDevice::new(
            Controller::I2C1,
            PortIndex(0),
            Some((Mux::M1, Segment::S1)),
            0x38,
        );
        assert_eq!(a.bus(), b.bus());
        assert_ne!(a.bus(), c.bus());
        assert_ne!(a.bus(), d.bus());
    }

    #[test]
    fn reserved_addresses() {
        assert_eq!(
            ReservedAddress::check(0x00),
            Some(ReservedAddress::GeneralCall)
        );
        assert_eq!(
            ReservedAddress::check(0x7c),
            Some(ReservedAddress::TenBit00)
        );
        assert_eq!(ReservedAddress::check(0x38), None);
    }

    #[test]
    fn display() {
        use std::string::ToString;

        let dev = I2cDevice::new(Controller::I2C2, PortIndex(1), None, 0x38);
        assert_eq!(dev.to_string(), "I2C2:PortIndex(1) 0x38");

        let dev = I2cDevice::new(
            Controller::I2C2,
            PortIndex(0),
            Some((Mux::M1, Segment::S3)),
            0x39,
        );
        assert_eq!(dev.to_string(), "I2C2:PortIndex(0), M1:S3 0x39");
    }
}
