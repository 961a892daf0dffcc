// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed-width bit sets
//!
//! [`BitSet`] is used both for logical port masks (bit *i* is port *i*) and
//! for register words (bit *i* is whatever the layout says it is).  Indices
//! at or beyond the width of the backing integer are never set and always
//! test false.

use core::ops::{BitAnd, BitOr};
use num_traits::{PrimInt, Unsigned};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct BitSet<T>(pub T);

/// One bit per port, in ascending port order.
pub type LogicalPortMask = BitSet<u32>;

/// A register value in logical (unswapped) bit order.
pub type RegisterWord = BitSet<u16>;

impl<T> BitSet<T> {
    /// Wraps a raw integer.  Usable through the aliases, which cannot be
    /// called as tuple-struct constructors.
    pub const fn from_bits(bits: T) -> Self {
        Self(bits)
    }
}

impl<T: PrimInt + Unsigned> BitSet<T> {
    /// Number of bits in the backing integer.
    #[inline]
    pub fn capacity() -> u32 {
        T::zero().count_zeros()
    }

    pub fn empty() -> Self {
        Self(T::zero())
    }

    /// A set containing every index below `width`.
    pub fn low(width: u32) -> Self {
        if width >= Self::capacity() {
            Self(T::max_value())
        } else {
            Self((T::one() << width as usize) - T::one())
        }
    }

    /// Returns a `BitSet` with only bit `index` set.
    pub fn bit(index: u32) -> Self {
        let mut s = Self::empty();
        s.set(index);
        s
    }

    #[inline]
    pub fn test(self, index: u32) -> bool {
        index < Self::capacity()
            && (self.0 & (T::one() << index as usize)) != T::zero()
    }

    #[inline]
    pub fn set(&mut self, index: u32) {
        if index < Self::capacity() {
            self.0 = self.0 | (T::one() << index as usize);
        }
    }

    #[inline]
    pub fn clear(&mut self, index: u32) {
        if index < Self::capacity() {
            self.0 = self.0 & !(T::one() << index as usize);
        }
    }

    /// Sets or clears bit `index` according to `value`.
    #[inline]
    pub fn assign(&mut self, index: u32, value: bool) {
        if value {
            self.set(index)
        } else {
            self.clear(index)
        }
    }

    /// Drops every bit at or above `width`.
    pub fn truncate(self, width: u32) -> Self {
        self & Self::low(width)
    }

    /// Complements the low `width` bits; higher bits come back clear.
    pub fn complement(self, width: u32) -> Self {
        Self(!self.0) & Self::low(width)
    }
}

impl<T: PrimInt> BitOr for BitSet<T> {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl<T: PrimInt> BitAnd for BitSet<T> {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl From<u16> for LogicalPortMask {
    fn from(local: u16) -> Self {
        Self(u32::from(local))
    }
}
