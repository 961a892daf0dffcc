// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Named text attributes
//!
//! Management software on these boards reads and writes CPLD state as short
//! text values under fixed names.  Two naming schemes exist:
//!
//! - Banked parts expose one aggregate mask per feature and bank, e.g.
//!   `qsfp2_lp_mode`, shown as `0x%02x` and written as hex.
//! - Parts with labelled ports expose one flag per feature and port, e.g.
//!   `qsfp49_present`, shown as `0` or `1` and written as any integer in
//!   C-style notation, where non-zero means set.  These parts also get
//!   `io_dump`, and `qsfp_led_mode` when they have an LED register.

use crate::bits::LogicalPortMask;
use crate::cpld::QsfpCpld;
use crate::layout::Layout;
use crate::{CpldError, Feature};
use core::fmt;
use drv_i2c_api::WordBus;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Attribute {
    /// A feature for every port of the device
    Mask(Feature),
    /// A feature for one local port
    Port { feature: Feature, port: u8 },
    LedMode,
    /// The first port register, raw
    IoDump,
}

/// An attribute of a particular device, as named to management software.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AttrDesc {
    pub attribute: Attribute,
    pub writable: bool,
    /// Bank or port label following `qsfp`; attributes without one are
    /// named by `suffix` alone, or `qsfp_` + `suffix` for the LED mode.
    pub prefix: Option<u8>,
    pub suffix: &'static str,
}

impl fmt::Display for AttrDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.prefix, self.attribute) {
            (Some(n), _) => write!(f, "qsfp{}_{}", n, self.suffix),
            (None, Attribute::LedMode) => write!(f, "qsfp_{}", self.suffix),
            (None, _) => f.write_str(self.suffix),
        }
    }
}

/// A value read from an attribute.  Its `Display` impl produces the
/// attribute's text.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttrValue {
    Mask(u32),
    Flag(bool),
    Decimal(u16),
    Raw(u16),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            AttrValue::Mask(m) => write!(f, "0x{:02x}", m),
            AttrValue::Flag(b) => f.write_str(if b { "1" } else { "0" }),
            AttrValue::Decimal(d) => write!(f, "{}", d),
            AttrValue::Raw(r) => write!(f, "0x{:x}", r),
        }
    }
}

/// Upper bound on attributes any one device exposes.
pub const MAX_ATTRIBUTES: usize = 24;

const LED_MODE: &str = "led_mode";
const IO_DUMP: &str = "io_dump";

/// Lists the attributes a device of `layout` exposes, given its bank.
pub fn attributes(
    layout: &Layout,
    bank: Option<u8>,
) -> heapless::Vec<AttrDesc, MAX_ATTRIBUTES> {
    let mut out: heapless::Vec<AttrDesc, MAX_ATTRIBUTES> = heapless::Vec::new();
    let mut push = |d: AttrDesc| {
        // Layouts stay well under MAX_ATTRIBUTES; see the test below.
        let _ = out.push(d);
    };

    if layout.port_labels.is_empty() {
        for desc in layout.features {
            push(AttrDesc {
                attribute: Attribute::Mask(desc.feature),
                writable: desc.writable(),
                prefix: Some(bank.unwrap_or(1)),
                suffix: desc.name,
            });
        }
    } else {
        for (port, &label) in layout.port_labels.iter().enumerate() {
            for desc in layout.features {
                push(AttrDesc {
                    attribute: Attribute::Port {
                        feature: desc.feature,
                        port: port as u8,
                    },
                    writable: desc.writable(),
                    prefix: Some(label),
                    suffix: desc.name,
                });
            }
        }
        if layout.led_mode.is_some() {
            push(AttrDesc {
                attribute: Attribute::LedMode,
                writable: true,
                prefix: None,
                suffix: LED_MODE,
            });
        }
        push(AttrDesc {
            attribute: Attribute::IoDump,
            writable: false,
            prefix: None,
            suffix: IO_DUMP,
        });
    }

    out
}

/// Resolves an attribute name for a device of `layout` in `bank`.
pub fn lookup(
    layout: &Layout,
    bank: Option<u8>,
    name: &str,
) -> Result<AttrDesc, CpldError> {
    let found = if let Some(rest) = name.strip_prefix("qsfp") {
        if let Some(suffix) = rest.strip_prefix('_') {
            (suffix == LED_MODE).then_some((None, suffix))
        } else {
            rest.split_once('_').and_then(|(n, suffix)| {
                // Reject signs, leading zeros and the like.
                let canonical = !n.is_empty()
                    && n.bytes().all(|b| b.is_ascii_digit())
                    && !(n.len() > 1 && n.starts_with('0'));
                canonical
                    .then(|| n.parse::<u8>().ok())
                    .flatten()
                    .map(|n| (Some(n), suffix))
            })
        }
    } else {
        (name == IO_DUMP).then_some((None, name))
    };

    let (prefix, suffix) = found.ok_or(CpldError::InvalidSelector)?;

    attributes(layout, bank)
        .into_iter()
        .find(|d| d.prefix == prefix && d.suffix == suffix)
        .ok_or(CpldError::InvalidSelector)
}

/// Parses a mask written as hex, with or without a `0x` prefix.
pub fn parse_hex(text: &str) -> Result<u32, CpldError> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CpldError::ParseError);
    }
    u32::from_str_radix(digits, 16).map_err(|_| CpldError::ParseError)
}

/// Parses an integer the way C's `strtoul` does with base 0: an optional
/// `+`, then `0x` means hex, a leading `0` means octal, anything else is
/// decimal.
pub fn parse_auto(text: &str) -> Result<u32, CpldError> {
    let text = text.trim();
    let text = text.strip_prefix('+').unwrap_or(text);
    let (digits, radix) = if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        (hex, 16)
    } else if text.len() > 1 && text.starts_with('0') {
        (&text[1..], 8)
    } else {
        (text, 10)
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CpldError::ParseError);
    }
    u32::from_str_radix(digits, radix).map_err(|_| CpldError::ParseError)
}

/// Parses a plain decimal number.
pub fn parse_decimal(text: &str) -> Result<u16, CpldError> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CpldError::ParseError);
    }
    text.parse().map_err(|_| CpldError::ParseError)
}

impl<B: WordBus> QsfpCpld<B> {
    pub fn attributes(&self) -> heapless::Vec<AttrDesc, MAX_ATTRIBUTES> {
        attributes(self.layout(), self.bank().map(|b| b.index()))
    }

    pub fn lookup(&self, name: &str) -> Result<AttrDesc, CpldError> {
        lookup(self.layout(), self.bank().map(|b| b.index()), name)
    }

    /// Reads the named attribute.
    pub fn show(&self, name: &str) -> Result<AttrValue, CpldError> {
        match self.lookup(name)?.attribute {
            Attribute::Mask(f) => {
                self.get_feature_mask(f).map(|m| AttrValue::Mask(m.0))
            }
            Attribute::Port { feature, port } => {
                self.get_port(feature, port).map(AttrValue::Flag)
            }
            Attribute::LedMode => self.led_mode().map(AttrValue::Decimal),
            Attribute::IoDump => {
                let dump = self.dump()?;
                dump.first()
                    .map(|&(_, word)| AttrValue::Raw(word))
                    .ok_or(CpldError::UnsupportedOperation)
            }
        }
    }

    /// Writes `text` to the named attribute.  Writability is checked before
    /// the text is parsed, and both before any bus access.
    pub fn store(&self, name: &str, text: &str) -> Result<(), CpldError> {
        let desc = self.lookup(name)?;
        if !desc.writable {
            return Err(CpldError::UnsupportedOperation);
        }

        match desc.attribute {
            Attribute::Mask(f) => {
                let mask = parse_hex(text)?;
                self.set_feature_mask(f, LogicalPortMask::from_bits(mask))
            }
            Attribute::Port { feature, port } => {
                let value = parse_auto(text)?;
                self.set_port(feature, port, value != 0)
            }
            Attribute::LedMode => self.set_led_mode(parse_decimal(text)?),
            Attribute::IoDump => Err(CpldError::UnsupportedOperation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpld::Bank;
    use crate::transport::swap_nibbles;
    use crate::Variant;
    use drv_i2c_api::mock::MockBus;
    use drv_i2c_api::{Controller, I2cDevice, PortIndex};

    fn dev(address: u8) -> I2cDevice {
        I2cDevice::new(Controller::Mock, PortIndex(0), None, address)
    }

    fn names(layout: &Layout, bank: Option<u8>) -> Vec<String> {
        attributes(layout, bank)
            .iter()
            .map(|d| d.to_string())
            .collect()
    }

    #[test]
    fn ly6_names() {
        assert_eq!(
            names(Variant::Ly6.layout(), Some(2)),
            [
                "qsfp2_present",
                "qsfp2_interrupt",
                "qsfp2_lp_mode",
                "qsfp2_reset"
            ]
        );
    }

    #[test]
    fn ly9_names() {
        let n = names(Variant::Ly9.layout(), None);
        assert_eq!(n.len(), 4 * 4 + 2);
        assert_eq!(n[0], "qsfp50_lpmode");
        assert_eq!(n[5], "qsfp49_present");
        assert!(n.contains(&"qsfp52_int".to_string()));
        assert_eq!(n[16], "qsfp_led_mode");
        assert_eq!(n[17], "io_dump");
    }

    #[test]
    fn catalogue_fits() {
        for v in [Variant::Ly6, Variant::Ly9] {
            let l = v.layout();
            let expected = if l.port_labels.is_empty() {
                l.features.len()
            } else {
                l.port_labels.len() * l.features.len() + 2
            };
            assert_eq!(attributes(l, Some(1)).len(), expected);
            assert!(expected <= MAX_ATTRIBUTES);
        }
    }

    #[test]
    fn lookup_names() {
        let ly6 = Variant::Ly6.layout();
        assert_eq!(
            lookup(ly6, Some(1), "qsfp1_reset").unwrap().attribute,
            Attribute::Mask(Feature::Reset)
        );
        // Wrong bank, and names of the other part.
        for bad in ["qsfp2_reset", "qsfp1_int", "qsfp01_reset", "io_dump"] {
            assert_eq!(
                lookup(ly6, Some(1), bad),
                Err(CpldError::InvalidSelector),
                "{}",
                bad
            );
        }

        let ly9 = Variant::Ly9.layout();
        assert_eq!(
            lookup(ly9, None, "qsfp51_reset").unwrap().attribute,
            Attribute::Port {
                feature: Feature::Reset,
                port: 3
            }
        );
        assert_eq!(
            lookup(ly9, None, "qsfp_led_mode").unwrap().attribute,
            Attribute::LedMode
        );
        for bad in ["qsfp53_int", "qsfp+49_int", "qsfp49", "qsfp_io_dump", ""] {
            assert_eq!(
                lookup(ly9, None, bad),
                Err(CpldError::InvalidSelector),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn hex_parsing() {
        assert_eq!(parse_hex("0x1f"), Ok(0x1f));
        assert_eq!(parse_hex("0XFF\n"), Ok(0xff));
        assert_eq!(parse_hex(" beef "), Ok(0xbeef));
        for bad in ["", "0x", "12g", "-1", "0x 1", "1_0", "123456789"] {
            assert_eq!(parse_hex(bad), Err(CpldError::ParseError), "{}", bad);
        }
    }

    #[test]
    fn auto_parsing() {
        assert_eq!(parse_auto("1"), Ok(1));
        assert_eq!(parse_auto("0"), Ok(0));
        assert_eq!(parse_auto("0x10"), Ok(16));
        assert_eq!(parse_auto("010\n"), Ok(8));
        assert_eq!(parse_auto("+1"), Ok(1));
        assert_eq!(parse_auto(" +0x10"), Ok(16));
        assert_eq!(parse_auto("+010"), Ok(8));
        for bad in ["", "08", "0x", "one", "1a", "+", "++1", "-1", "+ 1"] {
            assert_eq!(parse_auto(bad), Err(CpldError::ParseError), "{}", bad);
        }
    }

    #[test]
    fn decimal_parsing() {
        assert_eq!(parse_decimal("3\n"), Ok(3));
        assert_eq!(parse_decimal("65536"), Err(CpldError::ParseError));
        assert_eq!(parse_decimal("0x3"), Err(CpldError::ParseError));
    }

    #[test]
    fn ly6_show_and_store() {
        let bus = MockBus::new();
        let cpld =
            QsfpCpld::new(&bus, dev(0x38), Variant::Ly6, Some(Bank::One))
                .unwrap();
        bus.set_register(0x38, 1, swap_nibbles(0x0001));

        assert_eq!(cpld.show("qsfp1_lp_mode").unwrap().to_string(), "0x01");
        // Unwritten registers read zero, so every active-low line is
        // asserted.
        assert_eq!(cpld.show("qsfp1_present").unwrap().to_string(), "0xffff");
        assert_eq!(cpld.show("qsfp1_interrupt"), Ok(AttrValue::Mask(0xffff)));

        cpld.store("qsfp1_lp_mode", "0x8001\n").unwrap();
        assert_eq!(cpld.show("qsfp1_lp_mode"), Ok(AttrValue::Mask(0x8001)));

        assert_eq!(
            cpld.store("qsfp1_present", "0x0"),
            Err(CpldError::UnsupportedOperation)
        );
        assert_eq!(
            cpld.store("qsfp1_reset", "zz"),
            Err(CpldError::ParseError)
        );
    }

    #[test]
    fn ly9_show_and_store() {
        let bus = MockBus::new();
        let cpld = QsfpCpld::new(&bus, dev(0x3a), Variant::Ly9, None).unwrap();
        bus.set_register(0x3a, 1, 0x0002);

        assert_eq!(cpld.show("qsfp50_present"), Ok(AttrValue::Flag(true)));
        assert_eq!(cpld.show("qsfp49_present").unwrap().to_string(), "0");
        assert_eq!(cpld.show("io_dump").unwrap().to_string(), "0x2");

        cpld.store("qsfp49_lpmode", "0x1").unwrap();
        assert_eq!(bus.register(0x3a, 1), 0x0012);
        cpld.store("qsfp49_lpmode", "0").unwrap();
        assert_eq!(bus.register(0x3a, 1), 0x0002);
        cpld.store("qsfp49_lpmode", "+1\n").unwrap();
        assert_eq!(bus.register(0x3a, 1), 0x0012);

        cpld.store("qsfp_led_mode", "3").unwrap();
        assert_eq!(cpld.show("qsfp_led_mode").unwrap().to_string(), "3");

        assert_eq!(
            cpld.store("io_dump", "0"),
            Err(CpldError::UnsupportedOperation)
        );
        assert_eq!(
            cpld.store("qsfp51_int", "1"),
            Err(CpldError::UnsupportedOperation)
        );
    }
}
