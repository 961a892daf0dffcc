// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Register transport
//!
//! [`Transport`] turns a [`WordBus`] and an [`I2cDevice`] into register
//! reads and writes in logical bit order.  Every call is exactly one bus
//! transaction; there are no retries and nothing is cached.

use crate::bits::RegisterWord;
use crate::layout::WireEncoding;
use crate::CpldError;
use drv_i2c_api::{I2cDevice, ResponseCode, WordBus};
use ringbuf::*;

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    Read {
        address: u8,
        reg: u8,
        word: u16,
    },
    ReadFailed {
        address: u8,
        reg: u8,
        code: ResponseCode,
    },
    Write {
        address: u8,
        reg: u8,
        word: u16,
    },
    WriteFailed {
        address: u8,
        reg: u8,
        code: ResponseCode,
    },
}

ringbuf!(Trace, 32, Trace::None);

/// Exchanges the high and low nibble of each byte.  This is its own
/// inverse, so it serves for both directions.
#[inline]
pub const fn swap_nibbles(word: u16) -> u16 {
    ((word & 0xf0f0) >> 4) | ((word & 0x0f0f) << 4)
}

impl WireEncoding {
    #[inline]
    pub fn decode(self, wire: u16) -> u16 {
        match self {
            WireEncoding::Plain => wire,
            WireEncoding::NibbleSwapped => swap_nibbles(wire),
        }
    }

    #[inline]
    pub fn encode(self, logical: u16) -> u16 {
        // Both encodings are involutions.
        self.decode(logical)
    }
}

pub struct Transport<B> {
    bus: B,
    device: I2cDevice,
    encoding: WireEncoding,
}

impl<B: WordBus> Transport<B> {
    pub fn new(bus: B, device: I2cDevice, encoding: WireEncoding) -> Self {
        Self {
            bus,
            device,
            encoding,
        }
    }

    pub fn device(&self) -> &I2cDevice {
        &self.device
    }

    fn fail(&self, reg: u8, code: ResponseCode) -> CpldError {
        CpldError::Transport {
            address: self.device.address,
            register: reg,
            code,
        }
    }

    /// Reads register `reg` and returns it in logical bit order.
    pub fn read_word(&self, reg: u8) -> Result<RegisterWord, CpldError> {
        let address = self.device.address;

        match self.bus.read_word_data(&self.device, reg) {
            Ok(wire) => {
                let word = self.encoding.decode(wire);
                ringbuf_entry!(Trace::Read { address, reg, word });
                Ok(RegisterWord::from_bits(word))
            }
            Err(code) => {
                ringbuf_entry!(Trace::ReadFailed { address, reg, code });
                Err(self.fail(reg, code))
            }
        }
    }

    /// Writes `word`, given in logical bit order, to register `reg`.
    pub fn write_word(
        &self,
        reg: u8,
        word: RegisterWord,
    ) -> Result<(), CpldError> {
        let address = self.device.address;
        let wire = self.encoding.encode(word.0);

        match self.bus.write_word_data(&self.device, reg, wire) {
            Ok(()) => {
                ringbuf_entry!(Trace::Write {
                    address,
                    reg,
                    word: word.0
                });
                Ok(())
            }
            Err(code) => {
                ringbuf_entry!(Trace::WriteFailed { address, reg, code });
                Err(self.fail(reg, code))
            }
        }
    }
}
