use std::path::PathBuf;

use num_traits::FromPrimitive;

use crate::chromium_ec::protocol::*;
use crate::chromium_ec::{
    read_memory_via_cmd, EcDriver, EcDriverType, EcError, EcResponseStatus, EcResult, LpcProtocol,
};
use crate::clock::{poll_until, Clock};
use crate::lock::{EcLock, DEFAULT_LOCK_TIMEOUT_MS};
use crate::portio::PortIo;

/// Give up when the EC is busy for longer than this
pub const EC_LPC_TIMEOUT_US: u64 = 1_000_000;
/// Delay between two reads of the status register
pub const EC_LPC_POLL_INTERVAL_US: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LpcEcConfig {
    /// Force a protocol instead of asking the EC
    pub protocol: LpcProtocol,
    pub timeout_us: u64,
    pub poll_interval_us: u64,
    /// Lock file held around every command, no locking if unset
    pub lock_path: Option<PathBuf>,
    pub lock_timeout_ms: u64,
}

impl Default for LpcEcConfig {
    fn default() -> Self {
        LpcEcConfig {
            protocol: LpcProtocol::Auto,
            timeout_us: EC_LPC_TIMEOUT_US,
            poll_interval_us: EC_LPC_POLL_INTERVAL_US,
            lock_path: None,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}

/// EC on the LPC bus, driven by direct port I/O
pub struct LpcEc<'a> {
    io: &'a mut dyn PortIo,
    clock: &'a dyn Clock,
    family: EcDriverType,
    config: LpcEcConfig,
    /// Protocol in use, once known
    protocol: Option<LpcProtocol>,
}

/// Largest request payload the protocol can carry
fn max_request_size(protocol: LpcProtocol) -> usize {
    match protocol {
        LpcProtocol::V3 => EC_PROTO3_MAX_DATA_SIZE,
        LpcProtocol::V2 | LpcProtocol::Auto => EC_PROTO2_MAX_PARAM_SIZE,
        LpcProtocol::Legacy => EC_OLD_PARAM_SIZE,
    }
}

fn check_request_size(protocol: LpcProtocol, size: usize) -> EcResult<()> {
    let max = max_request_size(protocol);
    if size > max {
        return Err(EcError::RequestTooBig { size, max });
    }
    Ok(())
}

/// Only v3 packets have room for 16-bit command numbers
fn lpc_command(command: u16) -> EcResult<u8> {
    u8::try_from(command).map_err(|_| {
        EcError::DeviceError(format!(
            "Command {:#06X} needs protocol version 3",
            command
        ))
    })
}

impl<'a> LpcEc<'a> {
    pub fn new(
        io: &'a mut dyn PortIo,
        clock: &'a dyn Clock,
        family: EcDriverType,
        config: LpcEcConfig,
    ) -> Self {
        let protocol = match (family, config.protocol) {
            (EcDriverType::Gec, _) => Some(LpcProtocol::Legacy),
            (EcDriverType::CrosEc, LpcProtocol::Auto) => None,
            (EcDriverType::CrosEc, protocol) => Some(protocol),
        };
        LpcEc {
            io,
            clock,
            family,
            config,
            protocol,
        }
    }

    pub fn family(&self) -> EcDriverType {
        self.family
    }

    /// Check for the "EC" signature in the memory map
    pub fn has_memmap(&mut self) -> EcResult<bool> {
        let id = self.io.read_block(EC_LPC_ADDR_MEMMAP + EC_MEMMAP_ID, 2)?;
        Ok(id == b"EC")
    }

    /// The protocol in use, asking the EC on first use
    pub fn protocol(&mut self) -> EcResult<LpcProtocol> {
        if let Some(protocol) = self.protocol {
            return Ok(protocol);
        }
        let protocol = self.probe_protocol()?;
        debug!("EC speaks protocol {:?}", protocol);
        self.protocol = Some(protocol);
        Ok(protocol)
    }

    fn probe_protocol(&mut self) -> EcResult<LpcProtocol> {
        if !self.has_memmap()? {
            debug!("No EC memory map, assuming legacy protocol");
            return Ok(LpcProtocol::Legacy);
        }
        let flags = self
            .io
            .read8(EC_LPC_ADDR_MEMMAP + EC_MEMMAP_HOST_CMD_FLAGS)?;
        trace!("Host command flags: {:#04X}", flags);
        Ok(if flags & EC_HOST_CMD_FLAG_VERSION_3 != 0 {
            LpcProtocol::V3
        } else if flags & EC_HOST_CMD_FLAG_LPC_ARGS_SUPPORTED != 0 {
            LpcProtocol::V2
        } else {
            LpcProtocol::Legacy
        })
    }

    fn lock(&self) -> EcResult<Option<EcLock>> {
        match &self.config.lock_path {
            Some(path) => Ok(Some(EcLock::acquire(
                path,
                self.config.lock_timeout_ms,
                self.clock,
            )?)),
            None => Ok(None),
        }
    }

    fn wait_for_ready(&mut self) -> EcResult<()> {
        let io = &mut *self.io;
        let res = poll_until(
            self.clock,
            self.config.timeout_us,
            self.config.poll_interval_us,
            || Ok::<bool, EcError>((io.read8(EC_LPC_ADDR_HOST_CMD)? & EC_LPC_STATUS_BUSY_MASK) == 0),
        )?;
        res.map_err(|timeout| {
            debug!("EC still busy after {} us", timeout.waited_us);
            EcError::Timeout {
                waited_us: timeout.waited_us,
            }
        })
    }

    fn read_result(&mut self) -> EcResult<()> {
        let result = self.io.read8(EC_LPC_ADDR_HOST_DATA)?;
        match result {
            0 => Ok(()),
            code => match EcResponseStatus::from_u8(code) {
                Some(status) => Err(EcError::Response(status)),
                None => Err(EcError::UnknownResponseCode(code.into())),
            },
        }
    }

    fn send_command_v3(
        &mut self,
        command: u16,
        command_version: u8,
        data: &[u8],
        insize: usize,
    ) -> EcResult<Vec<u8>> {
        let request = pack_request(command, command_version, data)?;

        self.wait_for_ready()?;
        self.io.write_block(EC_LPC_ADDR_HOST_PACKET, &request)?;
        self.io.write8(EC_LPC_ADDR_HOST_CMD, EC_COMMAND_PROTOCOL_3)?;
        self.wait_for_ready()?;
        self.read_result()?;

        let header_bytes = self.io.read_block(EC_LPC_ADDR_HOST_PACKET, HEADER_LEN)?;
        let header = unpack_response_header(&header_bytes)?;
        let size = usize::from(header.data_len);
        let max = insize.min(EC_PROTO3_MAX_DATA_SIZE);
        if size > max {
            return Err(EcError::ResponseTooBig { size, max });
        }
        let response = self
            .io
            .read_block(EC_LPC_ADDR_HOST_PACKET + HEADER_LEN as u16, size)?;

        // Header and data add up to zero
        let sum = checksum_fold(&header_bytes).wrapping_add(checksum_fold(&response));
        if sum != 0 {
            let actual = header.checksum;
            return Err(EcError::InvalidChecksum {
                expected: actual.wrapping_sub(sum),
                actual,
            });
        }
        Ok(response)
    }

    fn send_command_v2(
        &mut self,
        command: u16,
        command_version: u8,
        data: &[u8],
        insize: usize,
    ) -> EcResult<Vec<u8>> {
        let command = lpc_command(command)?;
        let args = EcLpcHostArgs::request(command, command_version, data)?;

        self.wait_for_ready()?;
        self.io.write_block(EC_LPC_ADDR_HOST_PARAM, data)?;
        self.io.write_block(EC_LPC_ADDR_HOST_ARGS, &args.to_bytes())?;
        self.io.write8(EC_LPC_ADDR_HOST_CMD, command)?;
        self.wait_for_ready()?;
        self.read_result()?;

        let bytes = self.io.read_block(EC_LPC_ADDR_HOST_ARGS, 4)?;
        let mut frame = [0_u8; 4];
        frame.copy_from_slice(&bytes);
        let response = EcLpcHostArgs::from_bytes(frame);
        if response.flags & EC_HOST_ARGS_FLAG_TO_HOST == 0 {
            debug!("Args frame came back with flags {:#04X}", response.flags);
            return Err(EcError::ProtocolMismatch);
        }

        let size = usize::from(response.data_size);
        let max = insize.min(EC_PROTO2_MAX_PARAM_SIZE);
        if size > max {
            return Err(EcError::ResponseTooBig { size, max });
        }
        let data = self.io.read_block(EC_LPC_ADDR_HOST_PARAM, size)?;

        let expected = response.compute_checksum(command, &data);
        if expected != response.checksum {
            return Err(EcError::InvalidChecksum {
                expected,
                actual: response.checksum,
            });
        }
        Ok(data)
    }

    /// Unframed exchange: no version, no length and no checksum
    fn send_command_legacy(
        &mut self,
        command: u16,
        command_version: u8,
        data: &[u8],
        insize: usize,
    ) -> EcResult<Vec<u8>> {
        let command = lpc_command(command)?;
        check_request_size(LpcProtocol::Legacy, data.len())?;
        if command_version != 0 {
            debug!(
                "Legacy protocol can't send command version {}",
                command_version
            );
        }

        self.wait_for_ready()?;
        self.io.write_block(EC_LPC_ADDR_OLD_PARAM, data)?;
        self.io.write8(EC_LPC_ADDR_HOST_CMD, command)?;
        self.wait_for_ready()?;
        self.read_result()?;

        let size = insize.min(EC_OLD_PARAM_SIZE);
        Ok(self.io.read_block(EC_LPC_ADDR_OLD_PARAM, size)?)
    }
}

impl EcDriver for LpcEc<'_> {
    fn name(&self) -> &'static str {
        match self.family {
            EcDriverType::CrosEc => "cros_ec_lpc",
            EcDriverType::Gec => "gec_lpc",
        }
    }

    fn send_command_sized(
        &mut self,
        command: u16,
        command_version: u8,
        data: &[u8],
        insize: usize,
    ) -> EcResult<Vec<u8>> {
        trace!(
            "send_command(command={:#X}, ver={}, data_len={})",
            command,
            command_version,
            data.len()
        );
        check_request_size(self.protocol.unwrap_or(LpcProtocol::Auto), data.len())?;

        let _lock = self.lock()?;
        let protocol = self.protocol()?;
        check_request_size(protocol, data.len())?;

        match protocol {
            LpcProtocol::V3 => self.send_command_v3(command, command_version, data, insize),
            LpcProtocol::V2 => {
                match self.send_command_v2(command, command_version, data, insize) {
                    Err(EcError::ProtocolMismatch) => {
                        self.protocol = Some(LpcProtocol::Legacy);
                        if data.len() > EC_OLD_PARAM_SIZE {
                            // A legacy EC already ran the framed attempt on stale parameters
                            warn!(
                                "EC doesn't understand args frames and {} bytes don't fit the legacy protocol, command {:#X} may have run",
                                data.len(),
                                command
                            );
                            return Err(EcError::ProtocolMismatch);
                        }
                        warn!("EC doesn't understand args frames, falling back to legacy protocol");
                        self.send_command_legacy(command, command_version, data, insize)
                    }
                    res => res,
                }
            }
            LpcProtocol::Legacy | LpcProtocol::Auto => {
                self.send_command_legacy(command, command_version, data, insize)
            }
        }
    }

    fn read_memory(&mut self, offset: u16, length: u16) -> EcResult<Vec<u8>> {
        if self.family == EcDriverType::Gec {
            return read_memory_via_cmd(self, offset, length);
        }
        if u32::from(offset) + u32::from(length) > u32::from(EC_MEMMAP_SIZE) {
            return Err(EcError::DeviceError(format!(
                "Memory map range {:#X}+{:#X} is out of bounds",
                offset, length
            )));
        }
        Ok(self
            .io
            .read_block(EC_LPC_ADDR_MEMMAP + offset, usize::from(length))?)
    }
}
