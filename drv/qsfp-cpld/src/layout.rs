// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Register maps
//!
//! A [`Layout`] describes how one CPLD part arranges its QSFP sideband lines
//! in registers.  Every port gets a group of `stride` bits inside some
//! register; within that group each [`Feature`] sits at a fixed offset.
//! Layouts are plain data: adding a part means adding a table, not code.

use crate::CpldError;
use static_assertions::const_assert;

/// A sideband line of a QSFP port.  Where it sits in a register is up to
/// each part's [`Layout`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Feature {
    /// LPMode, low-power mode request
    LpMode,
    /// ModPrsL, module absent when high
    ModAbs,
    /// IntL, interrupt pending when low
    Interrupt,
    /// ResetL, module held in reset when low
    Reset,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Polarity {
    /// A set hardware bit means the condition is true.
    ActiveHigh,
    /// A clear hardware bit means the condition is true.
    ActiveLow,
}

impl Polarity {
    #[inline]
    pub fn is_active_low(self) -> bool {
        self == Polarity::ActiveLow
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// How register words travel on the wire.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WireEncoding {
    Plain,
    /// The high and low nibble of each byte are exchanged.
    NibbleSwapped,
}

/// Where and how a feature lives in a port's bit group.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FeatureDesc {
    pub feature: Feature,
    /// Attribute name suffix
    pub name: &'static str,
    pub offset: u8,
    pub polarity: Polarity,
    pub access: Access,
}

impl FeatureDesc {
    pub fn writable(&self) -> bool {
        self.access == Access::ReadWrite
    }
}

/// A register holding the bit groups of `ports` consecutive ports, the
/// first of which is `first_port`.  Slot 0 is the least significant group.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RegisterGroup {
    pub reg: u8,
    pub first_port: u8,
    pub ports: u8,
}

impl RegisterGroup {
    pub fn covers(&self, port: u8) -> bool {
        port >= self.first_port && port - self.first_port < self.ports
    }
}

/// The CPLD parts this crate supports.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Variant {
    /// Port CPLD on the LY6: 16 ports per device in four registers, two
    /// devices per board
    Ly6,
    /// I/O CPLD on the LY9: four uplink ports in one register, plus an LED
    /// mode register
    Ly9,
}

impl Variant {
    pub fn layout(self) -> &'static Layout {
        match self {
            Variant::Ly6 => &LY6,
            Variant::Ly9 => &LY9,
        }
    }

    /// Whether devices of this part are banked, i.e. whether each device
    /// serves one slice of a larger port space chosen at attach time.
    pub fn banked(self) -> bool {
        self.layout().banks > 1
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct Layout {
    pub variant: Variant,
    /// Ports served by one device
    pub ports: u8,
    /// Bits per port group
    pub stride: u8,
    /// Register groups, in ascending port order
    pub groups: &'static [RegisterGroup],
    pub features: &'static [FeatureDesc],
    pub encoding: WireEncoding,
    /// Devices that together make up the board's port space
    pub banks: u8,
    pub led_mode: Option<u8>,
    /// Front-panel numbers of each port, for parts whose attributes are
    /// named per port; empty for parts with per-bank aggregate attributes.
    pub port_labels: &'static [u8],
}

impl Layout {
    pub fn feature(&self, feature: Feature) -> Result<&FeatureDesc, CpldError> {
        self.features
            .iter()
            .find(|d| d.feature == feature)
            .ok_or(CpldError::InvalidSelector)
    }

    pub fn feature_by_name(
        &self,
        name: &str,
    ) -> Result<&FeatureDesc, CpldError> {
        self.features
            .iter()
            .find(|d| d.name == name)
            .ok_or(CpldError::InvalidSelector)
    }

    /// Finds the register group holding `port` and the port's slot in it.
    pub fn locate(
        &self,
        port: u8,
    ) -> Result<(&RegisterGroup, u8), CpldError> {
        self.groups
            .iter()
            .find(|g| g.covers(port))
            .map(|g| (g, port - g.first_port))
            .ok_or(CpldError::InvalidSelector)
    }

    /// Bit position of `desc` for the port in `slot` of its register.
    #[inline]
    pub fn bit(&self, slot: u8, desc: &FeatureDesc) -> u32 {
        u32::from(self.stride) * u32::from(slot) + u32::from(desc.offset)
    }

    /// Checks the invariants the engine relies on: groups are contiguous in
    /// port order starting at 0 and cover every port exactly once, every
    /// group fits in a 16-bit word, and every feature fits in a group.
    pub const fn is_well_formed(&self) -> bool {
        let mut next = 0u8;
        let mut i = 0;
        while i < self.groups.len() {
            let g = &self.groups[i];
            if g.first_port != next
                || g.ports as u32 * self.stride as u32 > 16
            {
                return false;
            }
            next += g.ports;
            i += 1;
        }

        let mut i = 0;
        while i < self.features.len() {
            if self.features[i].offset >= self.stride {
                return false;
            }
            let mut j = i + 1;
            while j < self.features.len() {
                if self.features[j].offset == self.features[i].offset {
                    return false;
                }
                j += 1;
            }
            i += 1;
        }

        next == self.ports
            && self.banks >= 1
            && self.ports as u32 * self.banks as u32 <= 32
            && self.groups.len() <= MAX_GROUPS
            && (self.port_labels.is_empty()
                || self.port_labels.len() == self.ports as usize)
    }
}

/// Upper bound on register groups in any layout.
pub const MAX_GROUPS: usize = 4;

const LY6: Layout = Layout {
    variant: Variant::Ly6,
    ports: 16,
    stride: 4,
    groups: &[
        RegisterGroup {
            reg: 0x01,
            first_port: 0,
            ports: 4,
        },
        RegisterGroup {
            reg: 0x02,
            first_port: 4,
            ports: 4,
        },
        RegisterGroup {
            reg: 0x03,
            first_port: 8,
            ports: 4,
        },
        RegisterGroup {
            reg: 0x04,
            first_port: 12,
            ports: 4,
        },
    ],
    features: &[
        FeatureDesc {
            feature: Feature::ModAbs,
            name: "present",
            offset: 1,
            polarity: Polarity::ActiveLow,
            access: Access::ReadOnly,
        },
        FeatureDesc {
            feature: Feature::Interrupt,
            name: "interrupt",
            offset: 2,
            polarity: Polarity::ActiveLow,
            access: Access::ReadOnly,
        },
        FeatureDesc {
            feature: Feature::LpMode,
            name: "lp_mode",
            offset: 0,
            polarity: Polarity::ActiveHigh,
            access: Access::ReadWrite,
        },
        FeatureDesc {
            feature: Feature::Reset,
            name: "reset",
            offset: 3,
            polarity: Polarity::ActiveLow,
            access: Access::ReadWrite,
        },
    ],
    encoding: WireEncoding::NibbleSwapped,
    banks: 2,
    led_mode: None,
    port_labels: &[],
};

// The LY9 reports raw line levels: "present" reads 1 when the module is
// absent, "reset" reads 0 while the module is held in reset.
const LY9: Layout = Layout {
    variant: Variant::Ly9,
    ports: 4,
    stride: 4,
    groups: &[RegisterGroup {
        reg: 0x01,
        first_port: 0,
        ports: 4,
    }],
    features: &[
        FeatureDesc {
            feature: Feature::LpMode,
            name: "lpmode",
            offset: 0,
            polarity: Polarity::ActiveHigh,
            access: Access::ReadWrite,
        },
        FeatureDesc {
            feature: Feature::ModAbs,
            name: "present",
            offset: 1,
            polarity: Polarity::ActiveHigh,
            access: Access::ReadOnly,
        },
        FeatureDesc {
            feature: Feature::Reset,
            name: "reset",
            offset: 3,
            polarity: Polarity::ActiveHigh,
            access: Access::ReadWrite,
        },
        FeatureDesc {
            feature: Feature::Interrupt,
            name: "int",
            offset: 2,
            polarity: Polarity::ActiveHigh,
            access: Access::ReadOnly,
        },
    ],
    encoding: WireEncoding::Plain,
    banks: 1,
    led_mode: Some(0x02),
    // Slot order within the I/O group register
    port_labels: &[50, 49, 52, 51],
};

const_assert!(LY6.is_well_formed());
const_assert!(LY9.is_well_formed());
