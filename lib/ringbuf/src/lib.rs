// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Trace ring buffers for CPLD drivers
//!
//! Each driver module that touches hardware keeps a small static ring buffer
//! of its own `Trace` type, recording bus transactions and failures as they
//! happen.  The buffers are meant to be read post-mortem (from a debugger or
//! a core dump) or from unit tests; nothing is ever formatted or printed on
//! the hot path.
//!
//! ## Constraints
//!
//! The payload type must implement both `Copy` and `PartialEq`, and must be
//! `Send` so the buffer can sit behind a lock in a `static`.
//!
//! If you use the variants of the `ringbuf!` macro that leave the name of the
//! buffer implicit, you can only have one per module.
//!
//! ## Creating a ring buffer
//!
//! ```ignore
//! #[derive(Copy, Clone, Debug, PartialEq)]
//! enum Trace {
//!     None,
//!     Read { reg: u8, word: u16 },
//! }
//!
//! ringbuf!(Trace, 16, Trace::None);
//!
//! fn read(reg: u8, word: u16) {
//!     ringbuf_entry!(Trace::Read { reg, word });
//! }
//! ```
//!
//! A second buffer in the same module needs a name:
//!
//! ```ignore
//! ringbuf!(FAULT_RINGBUF, Trace, 8, Trace::None);
//! ringbuf_entry!(FAULT_RINGBUF, Trace::Read { reg: 1, word: 0 });
//! ```
//!
//! ## Coalescing
//!
//! An entry identical to the most recent one (same source line, same
//! payload) bumps that entry's `count` instead of consuming a new slot, so a
//! polling loop that keeps seeing the same register value costs one slot.

#![cfg_attr(target_os = "none", no_std)]

/// Re-exported so that macro expansions can name the lock type without the
/// caller depending on `spin` directly.
pub use spin;

/// Declares a ring buffer in the current module.
///
/// `ringbuf!(NAME, Type, N, expr)` makes a ring buffer named `NAME`,
/// containing entries of type `Type`, with room for `N` such entries, all of
/// which are initialized to `expr`.
///
/// The actual type of `NAME` will be `spin::Mutex<Ringbuf<T, N>>`.  If the
/// name is omitted it defaults to `__RINGBUF`.
#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        #[used]
        static $name: $crate::spin::Mutex<$crate::Ringbuf<$t, $n>> =
            $crate::spin::Mutex::new($crate::Ringbuf {
                last: None,
                buffer: [$crate::RingbufEntry {
                    line: 0,
                    generation: 0,
                    count: 0,
                    payload: $init,
                }; $n],
            });
    };
    ($t:ty, $n:expr, $init:expr) => {
        $crate::ringbuf!(__RINGBUF, $t, $n, $init);
    };
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        #[allow(dead_code)]
        const _: $t = $init;
    };
    ($t:ty, $n:expr, $init:expr) => {
        #[allow(dead_code)]
        const _: $t = $init;
    };
}

/// Inserts data into a ring buffer declared with [`ringbuf!`].
///
/// `ringbuf_entry!(NAME, expr)` will insert `expr` into the ring buffer
/// called `NAME`; without a name, `__RINGBUF` is used.
#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! ringbuf_entry {
    ($buf:expr, $payload:expr) => {{
        // Evaluate the payload before taking the lock so that a payload
        // expression which itself traces cannot deadlock.
        let (p, buf) = ($payload, &$buf);
        $crate::Ringbuf::entry(
            &mut *$crate::spin::Mutex::lock(buf),
            line!() as u16,
            p,
        );
    }};
    ($payload:expr) => {
        $crate::ringbuf_entry!(__RINGBUF, $payload);
    };
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! ringbuf_entry {
    ($buf:expr, $payload:expr) => {{
        let _ = &$payload;
    }};
    ($payload:expr) => {{
        let _ = &$payload;
    }};
}

/// A single [`Ringbuf`] entry.  `line` is the source line that recorded it
/// and `generation` counts how many times the slot has been overwritten.
#[derive(Debug, Copy, Clone)]
pub struct RingbufEntry<T: Copy + PartialEq> {
    pub line: u16,
    pub generation: u16,
    pub count: u32,
    pub payload: T,
}

/// A ring buffer of parametrized type and size.  Instantiate it with the
/// [`ringbuf!`] macro rather than directly.
#[derive(Debug)]
pub struct Ringbuf<T: Copy + PartialEq, const N: usize> {
    pub last: Option<usize>,
    pub buffer: [RingbufEntry<T>; N],
}

impl<T: Copy + PartialEq, const N: usize> Ringbuf<T, { N }> {
    pub fn entry(&mut self, line: u16, payload: T) {
        // `None` is treated as an out-of-range index so that the first entry
        // lands in slot 0 and is never coalesced.
        let last = self.last.unwrap_or(usize::MAX);

        if let Some(ent) = self.buffer.get_mut(last) {
            if ent.line == line && ent.payload == payload {
                if let Some(new_count) = ent.count.checked_add(1) {
                    ent.count = new_count;
                    return;
                }
            }
        }

        let ndx = {
            let next = last.wrapping_add(1);
            if next >= self.buffer.len() {
                0
            } else {
                next
            }
        };

        let ent = &mut self.buffer[ndx];
        *ent = RingbufEntry {
            line,
            payload,
            count: 1,
            generation: ent.generation.wrapping_add(1),
        };

        self.last = Some(ndx);
    }

    /// Returns the most recently recorded entry, if any.
    pub fn last_entry(&self) -> Option<&RingbufEntry<T>> {
        self.buffer.get(self.last?)
    }

    /// Iterates over recorded entries from oldest to newest.  Slots that
    /// have never been written are skipped.
    pub fn iter(&self) -> impl Iterator<Item = &RingbufEntry<T>> + '_ {
        let start = match self.last {
            Some(last) => last + 1,
            None => N,
        };
        self.buffer[start.min(N)..]
            .iter()
            .chain(self.buffer[..start.min(N)].iter())
            .filter(|ent| ent.generation != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_uut<const N: usize>() -> Ringbuf<u32, N> {
        Ringbuf {
            last: None,
            buffer: [RingbufEntry {
                line: 0,
                generation: 0,
                count: 0,
                payload: 0,
            }; N],
        }
    }

    #[test]
    fn empty_has_no_entries() {
        let uut = make_uut::<4>();
        assert!(uut.last_entry().is_none());
        assert_eq!(uut.iter().count(), 0);
    }

    #[test]
    fn repeated_entries_coalesce() {
        let mut uut = make_uut::<4>();
        uut.entry(10, 7);
        uut.entry(10, 7);
        uut.entry(10, 7);

        let last = uut.last_entry().unwrap();
        assert_eq!(last.payload, 7);
        assert_eq!(last.count, 3);
        assert_eq!(uut.iter().count(), 1);
    }

    #[test]
    fn same_payload_other_line_does_not_coalesce() {
        let mut uut = make_uut::<4>();
        uut.entry(10, 7);
        uut.entry(11, 7);
        assert_eq!(uut.iter().count(), 2);
    }

    #[test]
    fn wraps_oldest_first() {
        let mut uut = make_uut::<3>();
        for p in 1..=5 {
            uut.entry(1, p);
        }

        let payloads: Vec<u32> = uut.iter().map(|e| e.payload).collect();
        assert_eq!(payloads, [3, 4, 5]);
        assert_eq!(uut.last_entry().unwrap().generation, 2);
    }

    ringbuf!(u32, 8, 0);

    #[test]
    fn macro_records_into_static() {
        ringbuf_entry!(0xdead);
        let buf = __RINGBUF.lock();
        assert_eq!(buf.last_entry().unwrap().payload, 0xdead);
    }
}
