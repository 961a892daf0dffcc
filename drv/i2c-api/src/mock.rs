// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A simulated bus for host-side driver tests
//!
//! [`MockBus`] holds a sparse register file keyed by device address and
//! register, stores words exactly as they would appear on the wire, logs
//! every transaction, and can be told to fail transactions against chosen
//! registers.  Registers that were never written read back as zero.

use crate::{I2cDevice, ResponseCode, WordBus};

const MAX_REGISTERS: usize = 64;
const MAX_TRANSACTIONS: usize = 256;
const MAX_FAULTS: usize = 8;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Read,
    Write,
}

/// One logged transaction.  `value` is the wire word read or written, and
/// is `None` when the transaction failed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Transaction {
    pub address: u8,
    pub reg: u8,
    pub direction: Direction,
    pub value: Option<u16>,
}

#[derive(Copy, Clone, Debug)]
struct Fault {
    address: u8,
    reg: Option<u8>,
    direction: Direction,
    code: ResponseCode,
}

impl Fault {
    fn matches(&self, address: u8, reg: u8, direction: Direction) -> bool {
        self.address == address
            && self.direction == direction
            && self.reg.is_none_or(|r| r == reg)
    }
}

struct State {
    registers: heapless::Vec<(u8, u8, u16), MAX_REGISTERS>,
    log: heapless::Vec<Transaction, MAX_TRANSACTIONS>,
    faults: heapless::Vec<Fault, MAX_FAULTS>,
}

impl State {
    fn record(&mut self, txn: Transaction) {
        // Once full, later transactions are not retained.
        let _ = self.log.push(txn);
    }

    fn fault(
        &self,
        address: u8,
        reg: u8,
        direction: Direction,
    ) -> Option<ResponseCode> {
        self.faults
            .iter()
            .find(|f| f.matches(address, reg, direction))
            .map(|f| f.code)
    }

    fn slot(&mut self, address: u8, reg: u8) -> Option<&mut u16> {
        self.registers
            .iter_mut()
            .find(|(a, r, _)| *a == address && *r == reg)
            .map(|(_, _, v)| v)
    }

    fn store(&mut self, address: u8, reg: u8, value: u16) {
        if let Some(slot) = self.slot(address, reg) {
            *slot = value;
        } else {
            assert!(
                self.registers.push((address, reg, value)).is_ok(),
                "mock register file is full"
            );
        }
    }

    fn load(&mut self, address: u8, reg: u8) -> u16 {
        self.slot(address, reg).map(|v| *v).unwrap_or(0)
    }
}

pub struct MockBus {
    state: spin::Mutex<State>,
    word_data: bool,
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBus {
    pub fn new() -> Self {
        Self {
            state: spin::Mutex::new(State {
                registers: heapless::Vec::new(),
                log: heapless::Vec::new(),
                faults: heapless::Vec::new(),
            }),
            word_data: true,
        }
    }

    /// A bus whose controller cannot do SMBus word transactions.
    pub fn without_word_data() -> Self {
        Self {
            word_data: false,
            ..Self::new()
        }
    }

    /// Sets the wire value of a register without logging a transaction.
    pub fn set_register(&self, address: u8, reg: u8, wire: u16) {
        self.state.lock().store(address, reg, wire);
    }

    /// Returns the wire value of a register without logging a transaction.
    pub fn register(&self, address: u8, reg: u8) -> u16 {
        self.state.lock().load(address, reg)
    }

    /// Makes transactions in `direction` against `address` fail with `code`;
    /// `reg` of `None` fails every register on that device.
    pub fn fail(
        &self,
        address: u8,
        reg: Option<u8>,
        direction: Direction,
        code: ResponseCode,
    ) {
        let fault = Fault {
            address,
            reg,
            direction,
            code,
        };
        assert!(
            self.state.lock().faults.push(fault).is_ok(),
            "too many mock faults"
        );
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// Returns a copy of the transaction log, oldest first.
    pub fn transactions(&self) -> heapless::Vec<Transaction, MAX_TRANSACTIONS> {
        self.state.lock().log.clone()
    }

    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }

    /// Counts logged transactions against `address` in `direction`.
    pub fn count(&self, address: u8, direction: Direction) -> usize {
        self.state
            .lock()
            .log
            .iter()
            .filter(|t| t.address == address && t.direction == direction)
            .count()
    }
}

impl WordBus for MockBus {
    fn read_word_data(
        &self,
        device: &I2cDevice,
        reg: u8,
    ) -> Result<u16, ResponseCode> {
        let mut state = self.state.lock();
        let address = device.address;
        let fault = state.fault(address, reg, Direction::Read);
        let value = match fault {
            Some(_) => None,
            None => Some(state.load(address, reg)),
        };
        state.record(Transaction {
            address,
            reg,
            direction: Direction::Read,
            value,
        });
        match fault {
            Some(code) => Err(code),
            None => Ok(value.unwrap_or(0)),
        }
    }

    fn write_word_data(
        &self,
        device: &I2cDevice,
        reg: u8,
        value: u16,
    ) -> Result<(), ResponseCode> {
        let mut state = self.state.lock();
        let address = device.address;
        let fault = state.fault(address, reg, Direction::Write);
        state.record(Transaction {
            address,
            reg,
            direction: Direction::Write,
            value: fault.is_none().then_some(value),
        });
        match fault {
            Some(code) => Err(code),
            None => {
                state.store(address, reg, value);
                Ok(())
            }
        }
    }

    fn supports_word_data(&self) -> bool {
        self.word_data
    }
}
