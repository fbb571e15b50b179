//! Direct port I/O with `in`/`out` instructions
//!
//! Linux userspace first has to be granted access to the ports with ioperm,
//! which only root may do and which kernel lockdown mode blocks.

use hwio::{Io, Pio};

use super::{IoWidth, PortIo, PortIoError, PortIoResult};
#[cfg(feature = "linux_pio")]
use crate::os_specific;

/// Ports are unlocked in pages of this many ports
#[cfg(feature = "linux_pio")]
const IOPERM_PAGE: u32 = 0x100;

pub struct RawPortIo {
    /// One flag per 256-port page that ioperm was granted for
    #[cfg(feature = "linux_pio")]
    granted: Vec<bool>,
}

impl RawPortIo {
    pub fn new() -> PortIoResult<Self> {
        #[cfg(feature = "linux_pio")]
        if !os_specific::is_root() {
            error!("Must be root to use port based I/O.");
            return Err(PortIoError::PermissionDenied(
                "direct port I/O requires root".to_string(),
            ));
        }

        Ok(RawPortIo {
            #[cfg(feature = "linux_pio")]
            granted: vec![false; (0x10000 / IOPERM_PAGE) as usize],
        })
    }

    #[cfg(feature = "linux_pio")]
    fn request_access(&mut self, port: u16, width: IoWidth) -> PortIoResult<()> {
        let first = u32::from(port) / IOPERM_PAGE;
        let last = (u32::from(port) + width.bytes() as u32 - 1) / IOPERM_PAGE;
        for page in first..=last.min(0xFF) {
            if self.granted[page as usize] {
                continue;
            }
            let res = unsafe {
                libc::ioperm(
                    (page * IOPERM_PAGE) as libc::c_ulong,
                    IOPERM_PAGE as libc::c_ulong,
                    1,
                )
            };
            if res != 0 {
                error!("ioperm failed. portio driver is likely block by Linux kernel lockdown mode");
                return Err(PortIoError::PermissionDenied(format!(
                    "ioperm({:#06X}) failed: {}",
                    page * IOPERM_PAGE,
                    std::io::Error::last_os_error()
                )));
            }
            self.granted[page as usize] = true;
        }
        Ok(())
    }

    #[cfg(not(feature = "linux_pio"))]
    fn request_access(&mut self, _port: u16, _width: IoWidth) -> PortIoResult<()> {
        Ok(())
    }
}

impl PortIo for RawPortIo {
    fn read(&mut self, port: u16, width: IoWidth) -> PortIoResult<u32> {
        self.request_access(port, width)?;
        let value = match width {
            IoWidth::Byte => u32::from(Pio::<u8>::new(port).read()),
            IoWidth::Word => u32::from(Pio::<u16>::new(port).read()),
            IoWidth::Dword => Pio::<u32>::new(port).read(),
        };
        trace!("in({:#06X}, {}) = {:#X}", port, width.bytes(), value);
        Ok(value)
    }

    fn write(&mut self, port: u16, width: IoWidth, value: u32) -> PortIoResult<()> {
        self.request_access(port, width)?;
        trace!("out({:#06X}, {}, {:#X})", port, width.bytes(), value);
        match width {
            IoWidth::Byte => Pio::<u8>::new(port).write(value as u8),
            IoWidth::Word => Pio::<u16>::new(port).write(value as u16),
            IoWidth::Dword => Pio::<u32>::new(port).write(value),
        }
        Ok(())
    }
}
