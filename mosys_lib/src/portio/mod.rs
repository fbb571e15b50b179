//! Access to the x86 I/O port address space
//!
//! Two backends implement [`PortIo`]:
//! - [`raw::RawPortIo`] executes `in`/`out` instructions directly (needs root and ioperm on Linux)
//! - [`file::FilePortIo`] reads and writes a device node such as `/dev/port` at an offset

use std::fmt;
use std::path::{Path, PathBuf};

pub mod file;
#[cfg(all(feature = "raw_pio", any(target_arch = "x86", target_arch = "x86_64")))]
pub mod raw;

pub use file::{FilePortIo, PortRange};

/// Number of bytes transferred by a single port access
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoWidth {
    Byte = 1,
    Word = 2,
    Dword = 4,
}

impl IoWidth {
    pub fn bytes(self) -> usize {
        self as usize
    }

    pub fn from_bytes(bytes: u8) -> Option<Self> {
        match bytes {
            1 => Some(IoWidth::Byte),
            2 => Some(IoWidth::Word),
            4 => Some(IoWidth::Dword),
            _ => None,
        }
    }

    /// Largest value that fits in this width
    pub fn mask(self) -> u32 {
        match self {
            IoWidth::Byte => 0xFF,
            IoWidth::Word => 0xFFFF,
            IoWidth::Dword => 0xFFFF_FFFF,
        }
    }
}

#[derive(Debug)]
pub enum PortIoError {
    /// No backing range covers the requested port and width
    OutOfRange { port: u16, width: IoWidth },
    /// The backing device node could not be opened
    Open { path: PathBuf, source: std::io::Error },
    /// The device node transferred fewer bytes than requested
    Short {
        port: u16,
        expected: usize,
        actual: usize,
    },
    Io(std::io::Error),
    PermissionDenied(String),
    /// Backend is not available on this build or architecture
    Unsupported(&'static str),
}

impl fmt::Display for PortIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortIoError::OutOfRange { port, width } => write!(
                f,
                "Port {:#06X} (width {}) is outside all known I/O ranges",
                port,
                width.bytes()
            ),
            PortIoError::Open { path, source } => {
                write!(f, "Failed to open {}: {}", path.display(), source)
            }
            PortIoError::Short {
                port,
                expected,
                actual,
            } => write!(
                f,
                "Short transfer at port {:#06X}: {} of {} bytes",
                port, actual, expected
            ),
            PortIoError::Io(err) => write!(f, "I/O error: {}", err),
            PortIoError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            PortIoError::Unsupported(what) => write!(f, "Unsupported: {}", what),
        }
    }
}

impl std::error::Error for PortIoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PortIoError::Open { source, .. } => Some(source),
            PortIoError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PortIoError {
    fn from(err: std::io::Error) -> Self {
        PortIoError::Io(err)
    }
}

pub type PortIoResult<T> = Result<T, PortIoError>;

/// Read and write registers in the I/O port space
pub trait PortIo {
    fn read(&mut self, port: u16, width: IoWidth) -> PortIoResult<u32>;
    fn write(&mut self, port: u16, width: IoWidth, value: u32) -> PortIoResult<()>;

    fn read8(&mut self, port: u16) -> PortIoResult<u8> {
        Ok(self.read(port, IoWidth::Byte)? as u8)
    }
    fn read16(&mut self, port: u16) -> PortIoResult<u16> {
        Ok(self.read(port, IoWidth::Word)? as u16)
    }
    fn read32(&mut self, port: u16) -> PortIoResult<u32> {
        self.read(port, IoWidth::Dword)
    }
    fn write8(&mut self, port: u16, value: u8) -> PortIoResult<()> {
        self.write(port, IoWidth::Byte, value.into())
    }
    fn write16(&mut self, port: u16, value: u16) -> PortIoResult<()> {
        self.write(port, IoWidth::Word, value.into())
    }
    fn write32(&mut self, port: u16, value: u32) -> PortIoResult<()> {
        self.write(port, IoWidth::Dword, value)
    }

    /// Read `len` consecutive byte registers starting at `port`
    fn read_block(&mut self, port: u16, len: usize) -> PortIoResult<Vec<u8>> {
        let mut buffer = vec![0_u8; len];
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = self.read8(port.wrapping_add(i as u16))?;
        }
        Ok(buffer)
    }

    /// Write consecutive byte registers starting at `port`
    fn write_block(&mut self, port: u16, data: &[u8]) -> PortIoResult<()> {
        for (i, byte) in data.iter().enumerate() {
            self.write8(port.wrapping_add(i as u16), *byte)?;
        }
        Ok(())
    }
}

impl<T: PortIo + ?Sized> PortIo for &mut T {
    fn read(&mut self, port: u16, width: IoWidth) -> PortIoResult<u32> {
        (**self).read(port, width)
    }
    fn write(&mut self, port: u16, width: IoWidth, value: u32) -> PortIoResult<()> {
        (**self).write(port, width, value)
    }
}

impl<T: PortIo + ?Sized> PortIo for Box<T> {
    fn read(&mut self, port: u16, width: IoWidth) -> PortIoResult<u32> {
        (**self).read(port, width)
    }
    fn write(&mut self, port: u16, width: IoWidth, value: u32) -> PortIoResult<()> {
        (**self).write(port, width, value)
    }
}

/// Which port I/O implementation to use
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortIoBackend {
    /// Device node if it exists, otherwise direct port I/O
    #[default]
    Auto,
    /// Direct `in`/`out` instructions
    Raw,
    /// Offset I/O on a device node like /dev/port
    File,
}

fn backing_file_exists(ranges: &[PortRange]) -> bool {
    ranges
        .first()
        .map(|r| Path::new(&r.path).exists())
        .unwrap_or(false)
}

/// Pick a backend once at startup
pub fn open_port_io(backend: PortIoBackend, ranges: Vec<PortRange>) -> PortIoResult<Box<dyn PortIo>> {
    let backend = match backend {
        PortIoBackend::Auto if backing_file_exists(&ranges) => PortIoBackend::File,
        PortIoBackend::Auto => PortIoBackend::Raw,
        other => other,
    };
    debug!("Using {:?} port I/O backend", backend);

    match backend {
        PortIoBackend::File => Ok(Box::new(FilePortIo::new(ranges))),
        _ => open_raw(),
    }
}

#[cfg(all(feature = "raw_pio", any(target_arch = "x86", target_arch = "x86_64")))]
fn open_raw() -> PortIoResult<Box<dyn PortIo>> {
    Ok(Box::new(raw::RawPortIo::new()?))
}
#[cfg(not(all(feature = "raw_pio", any(target_arch = "x86", target_arch = "x86_64"))))]
fn open_raw() -> PortIoResult<Box<dyn PortIo>> {
    Err(PortIoError::Unsupported(
        "direct port I/O needs the raw_pio feature on x86",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::SimBus;

    #[test]
    fn width_helpers() {
        assert_eq!(IoWidth::from_bytes(2), Some(IoWidth::Word));
        assert_eq!(IoWidth::from_bytes(3), None);
        assert_eq!(IoWidth::Dword.bytes(), 4);
        assert_eq!(IoWidth::Word.mask(), 0xFFFF);
    }

    #[test]
    fn block_transfers_use_consecutive_ports() {
        let mut bus = SimBus::new();
        bus.write_block(0x880, &[1, 2, 3]).unwrap();
        assert_eq!(bus.read_block(0x880, 4).unwrap(), vec![1, 2, 3, 0]);
        assert_eq!(bus.read8(0x882).unwrap(), 3);
    }

    #[test]
    fn auto_falls_back_to_file_when_node_exists() {
        let path = std::env::temp_dir().join(format!("mosys-auto-{}", std::process::id()));
        std::fs::write(&path, [0xAA_u8; 16]).unwrap();
        let ranges = vec![PortRange {
            base: 0,
            length: 16,
            path: path.to_string_lossy().to_string(),
            offset: 0,
        }];
        let mut io = open_port_io(PortIoBackend::Auto, ranges).unwrap();
        assert_eq!(io.read8(3).unwrap(), 0xAA);
        std::fs::remove_file(path).unwrap();
    }
}
