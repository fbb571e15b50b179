//! Port I/O through a byte-addressable device node
//!
//! On Linux `/dev/port` exposes the whole 64K port space at an offset equal to
//! the port number. Other nodes can be mapped in with extra [`PortRange`]s.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use serde::Deserialize;

use super::{IoWidth, PortIo, PortIoError, PortIoResult};

pub const DEV_PORT: &str = "/dev/port";

/// A window of the port space backed by a file
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PortRange {
    /// First port covered by this range
    pub base: u16,
    /// Number of ports covered, up to 0x10000
    pub length: u32,
    /// Device node backing the range
    pub path: String,
    /// File offset corresponding to `base`
    #[serde(default)]
    pub offset: u64,
}

impl PortRange {
    fn contains(&self, port: u16, width: IoWidth) -> bool {
        let start = u32::from(port);
        let end = start + width.bytes() as u32;
        start >= u32::from(self.base) && end <= u32::from(self.base).saturating_add(self.length)
    }

    fn file_offset(&self, port: u16) -> u64 {
        self.offset.saturating_add(u64::from(port - self.base))
    }
}

/// The whole port space through `/dev/port`
pub fn default_ranges() -> Vec<PortRange> {
    vec![PortRange {
        base: 0,
        length: 0x10000,
        path: DEV_PORT.to_string(),
        offset: 0,
    }]
}

pub struct FilePortIo {
    ranges: Vec<PortRange>,
    files: HashMap<String, File>,
}

impl FilePortIo {
    pub fn new(ranges: Vec<PortRange>) -> Self {
        FilePortIo {
            ranges,
            files: HashMap::new(),
        }
    }

    /// Translate a port into the backing file and offset
    fn lookup(&mut self, port: u16, width: IoWidth) -> PortIoResult<(&File, u64)> {
        let range = self
            .ranges
            .iter()
            .find(|r| r.contains(port, width))
            .ok_or(PortIoError::OutOfRange { port, width })?;
        let offset = range.file_offset(port);

        if !self.files.contains_key(&range.path) {
            trace!("Opening {} for port I/O", range.path);
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&range.path)
                .map_err(|source| {
                    if source.kind() == ErrorKind::PermissionDenied {
                        error!("Must be root to use {} for port I/O.", range.path);
                    }
                    PortIoError::Open {
                        path: PathBuf::from(&range.path),
                        source,
                    }
                })?;
            self.files.insert(range.path.clone(), file);
        }
        // Inserted above if it was missing
        let file = self
            .files
            .get(&range.path)
            .ok_or(PortIoError::Unsupported("lost file handle"))?;
        Ok((file, offset))
    }
}

impl PortIo for FilePortIo {
    fn read(&mut self, port: u16, width: IoWidth) -> PortIoResult<u32> {
        let (file, offset) = self.lookup(port, width)?;
        let mut buf = [0_u8; 4];
        let expected = width.bytes();
        let actual = file.read_at(&mut buf[..expected], offset)?;
        if actual != expected {
            return Err(PortIoError::Short {
                port,
                expected,
                actual,
            });
        }
        let value = u32::from_le_bytes(buf);
        trace!("inb/w/l({:#06X}) = {:#X}", port, value);
        Ok(value)
    }

    fn write(&mut self, port: u16, width: IoWidth, value: u32) -> PortIoResult<()> {
        let (file, offset) = self.lookup(port, width)?;
        let buf = value.to_le_bytes();
        let expected = width.bytes();
        let actual = file.write_at(&buf[..expected], offset)?;
        if actual != expected {
            return Err(PortIoError::Short {
                port,
                expected,
                actual,
            });
        }
        trace!("outb/w/l({:#06X}, {:#X})", port, value);
        Ok(())
    }
}
