//! SuperIO and LPC EC chip autodetection
//!
//! Each chip family is probed at a short list of candidate ports. At every
//! port the family's config key is sent, the chip id registers are read and
//! compared against [`SUPERIO_TABLE`]. The first exact match in table order
//! wins.

use super::{ConfigKey, ConfigSession, EneIndexedIo};
use crate::portio::{PortIo, PortIoError, PortIoResult};

/// How the id registers of a family are reached
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterAccess {
    /// Index/data pair at port and port+1
    IndexData,
    /// ENE ECRAM window at port+1..port+3
    EneIndexed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChipFamily {
    Ite,
    Smsc,
    Ene,
}

impl ChipFamily {
    pub fn vendor(self) -> &'static str {
        match self {
            ChipFamily::Ite => "ite",
            ChipFamily::Smsc => "smsc",
            ChipFamily::Ene => "ene",
        }
    }

    pub fn ports(self) -> &'static [u16] {
        match self {
            ChipFamily::Ite | ChipFamily::Smsc => &[0x2e, 0x4e],
            ChipFamily::Ene => &[0x380, 0xfd60],
        }
    }

    pub fn key(self) -> ConfigKey {
        match self {
            ChipFamily::Ite => ConfigKey::Ite,
            ChipFamily::Smsc => ConfigKey::Smsc,
            ChipFamily::Ene => ConfigKey::None,
        }
    }

    pub fn access(self) -> RegisterAccess {
        match self {
            ChipFamily::Ite | ChipFamily::Smsc => RegisterAccess::IndexData,
            ChipFamily::Ene => RegisterAccess::EneIndexed,
        }
    }

    /// Registers holding the id bytes, in comparison order
    pub fn id_registers(self) -> &'static [u16] {
        match self {
            ChipFamily::Ite => &[0x20, 0x21],
            ChipFamily::Smsc => &[0x20],
            // Hardware version, EDI id
            ChipFamily::Ene => &[0xff00, 0xff24],
        }
    }

    /// Register read after a match to report the chip revision
    pub fn version_register(self) -> u16 {
        match self {
            ChipFamily::Ite => 0x22,
            ChipFamily::Smsc => 0x21,
            ChipFamily::Ene => 0xff01,
        }
    }
}

/// A known chip and the id bytes identifying it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SioChip {
    pub family: ChipFamily,
    pub name: &'static str,
    /// One or two id bytes, compared against the family's id registers
    pub id: &'static [u8],
}

impl SioChip {
    pub fn vendor(&self) -> &'static str {
        self.family.vendor()
    }
}

/// Known chips. Table order is probe priority.
pub const SUPERIO_TABLE: &[SioChip] = &[
    SioChip {
        family: ChipFamily::Ite,
        name: "it8772",
        id: &[0x87, 0x72],
    },
    SioChip {
        family: ChipFamily::Ite,
        name: "it8728",
        id: &[0x87, 0x28],
    },
    SioChip {
        family: ChipFamily::Ite,
        name: "it8518",
        id: &[0x85, 0x18],
    },
    SioChip {
        family: ChipFamily::Smsc,
        name: "mec1308",
        id: &[0x4d],
    },
    SioChip {
        family: ChipFamily::Smsc,
        name: "mec1310",
        id: &[0x04],
    },
    SioChip {
        family: ChipFamily::Ene,
        name: "kb932",
        id: &[0xa2, 0x02],
    },
    SioChip {
        family: ChipFamily::Ene,
        name: "kb940",
        id: &[0xa3, 0x04],
    },
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetectedChip {
    pub vendor: &'static str,
    pub name: &'static str,
    pub port: u16,
    pub id: Vec<u8>,
    pub version: u8,
}

/// Read the id bytes and version of `family` at `port` in one config session
fn read_identity(
    io: &mut dyn PortIo,
    family: ChipFamily,
    port: u16,
) -> PortIoResult<(Vec<u8>, u8)> {
    match family.access() {
        RegisterAccess::IndexData => {
            let mut session = ConfigSession::enter(io, port, family.key())?;
            let mut id = Vec::with_capacity(2);
            for reg in family.id_registers() {
                id.push(session.read(*reg as u8)?);
            }
            let version = session.read(family.version_register() as u8)?;
            session.finish()?;
            Ok((id, version))
        }
        RegisterAccess::EneIndexed => {
            let mut ene = EneIndexedIo::new(io, port);
            let mut id = Vec::with_capacity(2);
            for reg in family.id_registers() {
                id.push(ene.read(*reg)?);
            }
            let version = ene.read(family.version_register())?;
            Ok((id, version))
        }
    }
}

/// Detects the first known chip and remembers the result
///
/// The detector is owned by whoever sets up the platform and is passed to
/// later callers. Once a probe completed, found or not, its result is
/// returned again without touching the bus.
pub struct SuperIoDetector {
    families: Vec<ChipFamily>,
    extra_ports: Vec<u16>,
    table: &'static [SioChip],
    result: Option<Option<DetectedChip>>,
}

impl SuperIoDetector {
    /// Probe every family in the table
    pub fn new() -> Self {
        Self::for_families(&[ChipFamily::Ite, ChipFamily::Smsc, ChipFamily::Ene])
    }

    pub fn for_families(families: &[ChipFamily]) -> Self {
        SuperIoDetector {
            families: families.to_vec(),
            extra_ports: vec![],
            table: SUPERIO_TABLE,
            result: None,
        }
    }

    /// Use a different chip table, mostly useful for tests and odd platforms
    pub fn with_table(mut self, table: &'static [SioChip]) -> Self {
        self.table = table;
        self
    }

    /// Also probe these ports for index/data families (e.g. 0x162e, 0x164e)
    pub fn with_extra_ports(mut self, ports: &[u16]) -> Self {
        self.extra_ports = ports.to_vec();
        self
    }

    /// Result of an earlier probe, if one completed
    pub fn cached(&self) -> Option<&Option<DetectedChip>> {
        self.result.as_ref()
    }

    /// Detect the chip, probing the bus only the first time
    ///
    /// `Ok(None)` means no known chip answered, which is a normal outcome.
    pub fn probe(&mut self, io: &mut dyn PortIo) -> PortIoResult<Option<DetectedChip>> {
        if let Some(result) = &self.result {
            trace!("Using cached SuperIO detection result");
            return Ok(result.clone());
        }
        let result = self.probe_uncached(io)?;
        match &result {
            Some(chip) => debug!(
                "Found {} {} at {:#06X} (version {:#04X})",
                chip.vendor, chip.name, chip.port, chip.version
            ),
            None => debug!("No known SuperIO chip found"),
        }
        self.result = Some(result.clone());
        Ok(result)
    }

    fn candidate_ports(&self, family: ChipFamily) -> Vec<u16> {
        let mut ports = family.ports().to_vec();
        if family.access() == RegisterAccess::IndexData {
            for port in &self.extra_ports {
                if !ports.contains(port) {
                    ports.push(*port);
                }
            }
        }
        ports
    }

    fn probe_uncached(&self, io: &mut dyn PortIo) -> PortIoResult<Option<DetectedChip>> {
        for family in &self.families {
            let candidates: Vec<&SioChip> =
                self.table.iter().filter(|c| c.family == *family).collect();
            if candidates.is_empty() {
                continue;
            }
            for port in self.candidate_ports(*family) {
                let (id, version) = match read_identity(io, *family, port) {
                    Ok(identity) => identity,
                    Err(PortIoError::OutOfRange { .. }) => {
                        debug!("{:?} registers at {:#06X} are out of range", family, port);
                        continue;
                    }
                    Err(err) => return Err(err),
                };
                trace!("{:?} at {:#06X}: id {:02X?}", family, port, id);

                let found = candidates.iter().find(|c| {
                    !c.id.is_empty() && c.id.len() <= id.len() && id[..c.id.len()] == *c.id
                });
                if let Some(chip) = found {
                    return Ok(Some(DetectedChip {
                        vendor: chip.vendor(),
                        name: chip.name,
                        port,
                        id: chip.id.to_vec(),
                        version,
                    }));
                }
            }
        }
        Ok(None)
    }
}

impl Default for SuperIoDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn detect_named(
    detector: &mut SuperIoDetector,
    io: &mut dyn PortIo,
    name: &str,
) -> PortIoResult<Option<u16>> {
    Ok(detector
        .probe(io)?
        .filter(|chip| chip.name == name)
        .map(|chip| chip.port))
}

/// Port of an ITE IT8772 SuperIO, if present
pub fn it8772_detect(detector: &mut SuperIoDetector, io: &mut dyn PortIo) -> PortIoResult<Option<u16>> {
    detect_named(detector, io, "it8772")
}

/// Port of an SMSC MEC1308 EC, if present
pub fn mec1308_detect(detector: &mut SuperIoDetector, io: &mut dyn PortIo) -> PortIoResult<Option<u16>> {
    detect_named(detector, io, "mec1308")
}

/// Base port of an ENE KB932 EC, if present
pub fn ene_kb932_detect(detector: &mut SuperIoDetector, io: &mut dyn PortIo) -> PortIoResult<Option<u16>> {
    detect_named(detector, io, "kb932")
}
