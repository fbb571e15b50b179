//! SuperIO register access
//!
//! A SuperIO chip is configured through an index/data register pair: the
//! register number is written to the base port, the value is then read from or
//! written to base+1. There is no acknowledgement, a missing chip usually
//! reads back as 0xFF.

use crate::portio::{IoWidth, PortIo, PortIoError, PortIoResult};

pub mod detect;

pub use detect::{
    ene_kb932_detect, it8772_detect, mec1308_detect, ChipFamily, DetectedChip, SioChip,
    SuperIoDetector, SUPERIO_TABLE,
};

/// Standard register holding the first chip id byte
pub const SIO_REG_DEVID: u8 = 0x20;
/// Global configuration control register
pub const SIO_REG_CONFIG_CTRL: u8 = 0x02;
/// Logical device select register
pub const SIO_REG_LDN: u8 = 0x07;

/// Port `offset` above `base`, which must still be inside the port space
fn port_at(base: u16, offset: u16) -> PortIoResult<u16> {
    base.checked_add(offset).ok_or(PortIoError::OutOfRange {
        port: base,
        width: IoWidth::Byte,
    })
}

/// Read a register through the index/data pair at `port`
pub fn sio_read(io: &mut dyn PortIo, port: u16, reg: u8) -> PortIoResult<u8> {
    let data = port_at(port, 1)?;
    io.write8(port, reg)?;
    io.read8(data)
}

/// Write a register through the index/data pair at `port`
pub fn sio_write(io: &mut dyn PortIo, port: u16, reg: u8, value: u8) -> PortIoResult<()> {
    let data = port_at(port, 1)?;
    io.write8(port, reg)?;
    io.write8(data, value)
}

/// Vendor specific handshake to enter and leave configuration mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigKey {
    /// Registers are always accessible
    None,
    /// ITE: 87 01 55 55 (or 55 aa when not at 0x2e), exit by setting bit 1 of register 0x02
    Ite,
    /// SMSC/Microchip: 55 to enter, aa to exit
    Smsc,
    /// Winbond/Nuvoton: 87 87 to enter, aa to exit
    Winbond,
}

impl ConfigKey {
    pub fn enter(self, io: &mut dyn PortIo, port: u16) -> PortIoResult<()> {
        trace!("Entering {:?} config mode at {:#06X}", self, port);
        match self {
            ConfigKey::None => Ok(()),
            ConfigKey::Ite => {
                let last = if port == 0x2e { 0x55 } else { 0xaa };
                write_key(io, port, &[0x87, 0x01, 0x55, last])
            }
            ConfigKey::Smsc => io.write8(port, 0x55),
            ConfigKey::Winbond => write_key(io, port, &[0x87, 0x87]),
        }
    }

    pub fn exit(self, io: &mut dyn PortIo, port: u16) -> PortIoResult<()> {
        trace!("Leaving {:?} config mode at {:#06X}", self, port);
        match self {
            ConfigKey::None => Ok(()),
            // Register 0x02 is write-only, bit 1 returns the chip to wait-for-key
            ConfigKey::Ite => sio_write(io, port, SIO_REG_CONFIG_CTRL, 0x02),
            ConfigKey::Smsc | ConfigKey::Winbond => io.write8(port, 0xaa),
        }
    }
}

/// Unlock keys go byte by byte to the index port
fn write_key(io: &mut dyn PortIo, port: u16, key: &[u8]) -> PortIoResult<()> {
    for byte in key {
        io.write8(port, *byte)?;
    }
    Ok(())
}

/// A SuperIO chip held in configuration mode
///
/// Call [`ConfigSession::finish`] to leave configuration mode and see errors.
/// A dropped session still tries to leave it, because a chip left in config
/// mode can break its normal function.
pub struct ConfigSession<'a> {
    io: &'a mut dyn PortIo,
    port: u16,
    key: ConfigKey,
    active: bool,
}

impl<'a> ConfigSession<'a> {
    pub fn enter(io: &'a mut dyn PortIo, port: u16, key: ConfigKey) -> PortIoResult<Self> {
        port_at(port, 1)?;
        key.enter(io, port)?;
        Ok(ConfigSession {
            io,
            port,
            key,
            active: true,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn read(&mut self, reg: u8) -> PortIoResult<u8> {
        sio_read(self.io, self.port, reg)
    }

    pub fn write(&mut self, reg: u8, value: u8) -> PortIoResult<()> {
        sio_write(self.io, self.port, reg, value)
    }

    /// Select a logical device before accessing its registers
    pub fn select_ldn(&mut self, ldn: u8) -> PortIoResult<()> {
        self.write(SIO_REG_LDN, ldn)
    }

    pub fn finish(mut self) -> PortIoResult<()> {
        self.active = false;
        self.key.exit(self.io, self.port)
    }
}

impl Drop for ConfigSession<'_> {
    fn drop(&mut self) {
        if self.active {
            if let Err(err) = self.key.exit(self.io, self.port) {
                warn!(
                    "Failed to leave config mode at {:#06X}: {}",
                    self.port, err
                );
            }
        }
    }
}

/// ENE ECs map their 16-bit ECRAM into the port space as an indexed window:
/// high address byte at base+1, low byte at base+2, data at base+3
pub struct EneIndexedIo<'a> {
    io: &'a mut dyn PortIo,
    base: u16,
}

impl<'a> EneIndexedIo<'a> {
    pub fn new(io: &'a mut dyn PortIo, base: u16) -> Self {
        EneIndexedIo { io, base }
    }

    /// Latch `addr` and return the data port
    fn select(&mut self, addr: u16) -> PortIoResult<u16> {
        let data = port_at(self.base, 3)?;
        self.io.write8(self.base + 1, (addr >> 8) as u8)?;
        self.io.write8(self.base + 2, addr as u8)?;
        Ok(data)
    }

    pub fn read(&mut self, addr: u16) -> PortIoResult<u8> {
        let data = self.select(addr)?;
        self.io.read8(data)
    }

    pub fn write(&mut self, addr: u16, value: u8) -> PortIoResult<()> {
        let data = self.select(addr)?;
        self.io.write8(data, value)
    }
}
