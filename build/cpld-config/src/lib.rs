// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Board descriptions of QSFP CPLDs
//!
//! A board lists its CPLDs in TOML:
//!
//! ```toml
//! [[cpld]]
//! name = "port-cpld-1"
//! variant = "ly6"
//! controller = 0
//! port = "A"
//! address = 0x38
//! bank = 1
//! ```
//!
//! Everything is checked before any device is attached, and if an attach
//! still fails, the devices attached before it are detached again, so a bad
//! board file never leaves a registry half-populated.

use anyhow::{anyhow, bail, Context, Result};
use drv_i2c_api::{
    Controller, I2cDevice, Mux, PortIndex, ReservedAddress, Segment, WordBus,
};
use drv_qsfp_cpld::registry::{DeviceHandle, Registry};
use drv_qsfp_cpld::{Bank, Variant};
use num_traits::FromPrimitive;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BoardConfig {
    #[serde(default)]
    pub cpld: Vec<CpldConfig>,
}

#[derive(Copy, Clone, Debug, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum VariantName {
    Ly6,
    Ly9,
}

impl From<VariantName> for Variant {
    fn from(v: VariantName) -> Self {
        match v {
            VariantName::Ly6 => Variant::Ly6,
            VariantName::Ly9 => Variant::Ly9,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CpldConfig {
    /// device name, unique within the board
    pub name: String,

    pub variant: VariantName,

    /// I2C controller
    pub controller: u8,

    /// I2C port, as a letter (`A` is port 0) or a number; defaults to 0
    pub port: Option<String>,

    /// I2C address
    pub address: u8,

    /// I2C mux, if any
    pub mux: Option<u8>,

    /// I2C segment, if any
    pub segment: Option<u8>,

    /// bank served by this device, for banked parts only
    pub bank: Option<u8>,

    /// description of device
    pub description: Option<String>,
}

fn port_index(port: Option<&str>) -> Result<PortIndex> {
    let Some(port) = port else {
        return Ok(PortIndex(0));
    };

    match port.as_bytes() {
        [c] if c.is_ascii_alphabetic() => {
            Ok(PortIndex(c.to_ascii_uppercase() - b'A'))
        }
        _ => port
            .parse()
            .map(PortIndex)
            .map_err(|_| anyhow!("invalid I2C port {port:?}")),
    }
}

impl CpldConfig {
    pub fn device(&self) -> Result<I2cDevice> {
        let controller = match Controller::from_u8(self.controller) {
            Some(Controller::Mock) | None => {
                bail!("invalid I2C controller {}", self.controller)
            }
            Some(c) => c,
        };

        let port = port_index(self.port.as_deref())?;

        let segment = match (self.mux, self.segment) {
            (None, None) => None,
            (Some(m), Some(s)) => {
                let mux = Mux::from_u8(m)
                    .ok_or_else(|| anyhow!("invalid mux {m}"))?;
                let segment = Segment::from_u8(s)
                    .ok_or_else(|| anyhow!("invalid segment {s}"))?;
                Some((mux, segment))
            }
            _ => bail!("mux and segment must be specified together"),
        };

        if self.address > 0x7f {
            bail!("address {:#x} is not a 7-bit address", self.address);
        }
        if let Some(r) = ReservedAddress::check(self.address) {
            bail!("address {:#x} is reserved ({r:?})", self.address);
        }

        Ok(I2cDevice::new(controller, port, segment, self.address))
    }

    pub fn bank(&self) -> Result<Option<Bank>> {
        let variant = Variant::from(self.variant);

        match (variant.banked(), self.bank) {
            (true, Some(b)) => Bank::from_index(b)
                .map(Some)
                .map_err(|_| anyhow!("bank must be 1 or 2, not {b}")),
            (true, None) => bail!("{:?} devices need a bank", self.variant),
            (false, Some(_)) => {
                bail!("{:?} devices do not take a bank", self.variant)
            }
            (false, None) => Ok(None),
        }
    }

    fn attach<B: WordBus, const N: usize>(
        &self,
        registry: &mut Registry<B, N>,
        bus: B,
    ) -> Result<DeviceHandle> {
        let device = self.device()?;
        registry
            .attach(bus, device, self.variant.into(), self.bank()?)
            .map_err(|e| {
                anyhow!("failed to attach {:?} at {device}: {e:?}", self.name)
            })
    }
}

impl BoardConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("failed to parse CPLD configuration")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&text)
            .with_context(|| format!("in {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        let mut devices = HashSet::new();
        let mut banks = HashSet::new();

        for c in &self.cpld {
            if !names.insert(c.name.as_str()) {
                bail!("duplicate device name {:?}", c.name);
            }

            let device =
                c.device().with_context(|| format!("device {:?}", c.name))?;
            let bank =
                c.bank().with_context(|| format!("device {:?}", c.name))?;

            let bus = (
                device.controller as u8,
                device.port.0,
                device.segment.map(|(m, s)| (m as u8, s as u8)),
            );

            if !devices.insert((bus, device.address)) {
                bail!(
                    "device {:?}: another device is already at {device}",
                    c.name
                );
            }

            if let Some(b) = bank {
                if !banks.insert((bus, c.variant, b.index())) {
                    bail!(
                        "device {:?}: bank {} is already served on this bus",
                        c.name,
                        b.index()
                    );
                }
            }
        }

        Ok(())
    }

    /// Validates the configuration, then attaches every device, returning
    /// each device's name and handle in configuration order.
    ///
    /// Either every device is attached or none is: on failure, devices
    /// attached by this call are detached before the error is returned.
    pub fn attach_all<B: WordBus + Clone, const N: usize>(
        &self,
        registry: &mut Registry<B, N>,
        bus: B,
    ) -> Result<Vec<(String, DeviceHandle)>> {
        self.validate()?;

        let mut out = vec![];
        for c in &self.cpld {
            match c.attach(registry, bus.clone()) {
                Ok(handle) => out.push((c.name.clone(), handle)),
                Err(e) => {
                    for (_, handle) in out.drain(..).rev() {
                        // Issued by this call and not yet released.
                        let _ = registry.detach(handle);
                    }
                    return Err(e);
                }
            }
        }

        Ok(out)
    }

}
