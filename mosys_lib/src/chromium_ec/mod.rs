//! Chrome EC and Google EC host command interface over LPC
//!
//! Both families talk to the EC through a few fixed I/O ports. See
//! [`protocol`] for the wire format and [`portio::LpcEc`] for the transport.
//!
//! Typed commands implement [`command::EcRequest`] and can be sent through any
//! [`EcDriver`].

use std::fmt;

use num_derive::FromPrimitive;

use crate::lock::LockError;
use crate::portio::PortIoError;
use crate::util;

pub mod command;
pub mod commands;
pub mod portio;
pub mod protocol;

use command::EcRequestRaw;
use commands::*;

pub use portio::{LpcEc, LpcEcConfig};

/// Response codes returned by commands
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcResponseStatus {
    Success = 0,
    InvalidCommand = 1,
    Error = 2,
    InvalidParameter = 3,
    AccessDenied = 4,
    InvalidResponse = 5,
    InvalidVersion = 6,
    InvalidChecksum = 7,
    /// Accepted, command in progress
    InProgress = 8,
    /// No response available
    Unavailable = 9,
    /// We got a timeout
    Timeout = 10,
    /// Table / data overflow
    Overflow = 11,
    /// Header contains invalid data
    InvalidHeader = 12,
    /// Didn't get the entire request
    RequestTruncated = 13,
    /// Response was too big to handle
    ResponseTooBig = 14,
    /// Communications bus error
    BusError = 15,
    /// Up but too busy.  Should retry
    Busy = 16,
}

#[derive(Debug)]
pub enum EcError {
    /// The EC processed the command and reported an error
    Response(EcResponseStatus),
    /// The EC reported a result code this library doesn't know
    UnknownResponseCode(u32),
    /// The EC stayed busy for longer than the timeout
    Timeout { waited_us: u64 },
    InvalidChecksum { expected: u8, actual: u8 },
    /// The EC didn't answer in the framing of the request
    ProtocolMismatch,
    RequestTooBig { size: usize, max: usize },
    ResponseTooBig { size: usize, max: usize },
    /// Couldn't get exclusive access to the EC
    Lock(String),
    PortIo(PortIoError),
    // Everything else
    DeviceError(String),
}

impl fmt::Display for EcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcError::Response(status) => write!(f, "EC responded with {:?}", status),
            EcError::UnknownResponseCode(code) => {
                write!(f, "EC responded with unknown code {}", code)
            }
            EcError::Timeout { waited_us } => {
                write!(f, "EC still busy after {} us", waited_us)
            }
            EcError::InvalidChecksum { expected, actual } => write!(
                f,
                "Invalid response checksum. Expected {:#04X}, got {:#04X}",
                expected, actual
            ),
            EcError::ProtocolMismatch => write!(f, "EC doesn't speak the requested protocol"),
            EcError::RequestTooBig { size, max } => {
                write!(f, "Request of {} bytes is larger than {} bytes", size, max)
            }
            EcError::ResponseTooBig { size, max } => {
                write!(f, "Response of {} bytes is larger than {} bytes", size, max)
            }
            EcError::Lock(msg) => write!(f, "Failed to lock EC: {}", msg),
            EcError::PortIo(err) => write!(f, "{}", err),
            EcError::DeviceError(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for EcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EcError::PortIo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PortIoError> for EcError {
    fn from(err: PortIoError) -> Self {
        EcError::PortIo(err)
    }
}

impl From<LockError> for EcError {
    fn from(err: LockError) -> Self {
        EcError::Lock(err.to_string())
    }
}

pub type EcResult<T> = Result<T, EcError>;

/// Which EC family to talk to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EcDriverType {
    /// Chrome EC with memory map and framed host commands
    #[default]
    CrosEc,
    /// Original Google EC, unframed commands only
    Gec,
}

/// Host command protocol generation on the LPC bus
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LpcProtocol {
    /// Ask the EC through its memory map
    #[default]
    Auto,
    V3,
    V2,
    Legacy,
}

/// A way of sending host commands to an EC
pub trait EcDriver {
    fn name(&self) -> &'static str;

    /// Send a command, accepting at most `insize` bytes of response
    fn send_command_sized(
        &mut self,
        command: u16,
        command_version: u8,
        data: &[u8],
        insize: usize,
    ) -> EcResult<Vec<u8>>;

    fn send_command(&mut self, command: u16, command_version: u8, data: &[u8]) -> EcResult<Vec<u8>> {
        self.send_command_sized(command, command_version, data, usize::MAX)
    }

    /// Read from the EC memory map
    fn read_memory(&mut self, offset: u16, length: u16) -> EcResult<Vec<u8>>;
}

/// Send a hello and check the answer
///
/// `Ok(false)` means something answered, but not like an EC.
pub fn hello(ec: &mut dyn EcDriver) -> EcResult<bool> {
    let res = EcRequestHello {
        in_data: EC_HELLO_IN,
    }
    .send_command(ec)?;
    let out = res.out_data;
    if out != EC_HELLO_OUT {
        debug!(
            "Hello mismatch. Expected {:#010X}, got {:#010X}",
            EC_HELLO_OUT, out
        );
        return Ok(false);
    }
    Ok(true)
}

pub fn version_info(ec: &mut dyn EcDriver) -> EcResult<String> {
    let data = EcRequestGetBuildInfo {}.send_command_vec(ec)?;
    Ok(util::c_string(&data))
}

pub fn flash_version(ec: &mut dyn EcDriver) -> EcResult<(String, String, EcCurrentImage)> {
    let v = EcRequestGetVersion {}.send_command(ec)?;
    let ro = util::c_string(&v.version_string_ro);
    let rw = util::c_string(&v.version_string_rw);
    let image = <EcCurrentImage as num_traits::FromPrimitive>::from_u32(v.current_image)
        .unwrap_or(EcCurrentImage::Unknown);
    Ok((ro, rw, image))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcChipInfo {
    pub vendor: String,
    pub name: String,
    pub revision: String,
}

pub fn chip_info(ec: &mut dyn EcDriver) -> EcResult<EcChipInfo> {
    let info = EcRequestGetChipInfo {}.send_command(ec)?;
    Ok(EcChipInfo {
        vendor: util::c_string(&info.vendor),
        name: util::c_string(&info.name),
        revision: util::c_string(&info.revision),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcProtocolInfo {
    pub protocol_versions: u32,
    pub max_request_packet_size: u16,
    pub max_response_packet_size: u16,
    pub flags: u32,
}

impl EcProtocolInfo {
    pub fn supports(&self, version: u32) -> bool {
        version < 32 && self.protocol_versions & (1 << version) != 0
    }
}

pub fn protocol_info(ec: &mut dyn EcDriver) -> EcResult<EcProtocolInfo> {
    let info = EcRequestGetProtocolInfo {}.send_command(ec)?;
    Ok(EcProtocolInfo {
        protocol_versions: info.protocol_versions,
        max_request_packet_size: info.max_request_packet_size,
        max_response_packet_size: info.max_response_packet_size,
        flags: info.flags,
    })
}

/// Check whether an EC of the driver's family answers
///
/// Chrome ECs must show their signature in the memory map before anything is
/// sent. Nothing answering in time is not an error.
pub fn detect_ec(ec: &mut LpcEc) -> EcResult<bool> {
    if ec.family() == EcDriverType::CrosEc && !ec.has_memmap()? {
        debug!("No EC signature in memory map");
        return Ok(false);
    }
    match hello(ec) {
        Err(EcError::Timeout { waited_us }) => {
            debug!("Nothing answered hello within {} us", waited_us);
            Ok(false)
        }
        res => res,
    }
}

/// Read memory map bytes with EC_CMD_READ_MEMMAP
pub fn read_memory_via_cmd(ec: &mut dyn EcDriver, offset: u16, length: u16) -> EcResult<Vec<u8>> {
    if u32::from(offset) + u32::from(length) > u32::from(protocol::EC_MEMMAP_SIZE) {
        return Err(EcError::DeviceError(format!(
            "Memory map range {:#X}+{:#X} is out of bounds",
            offset, length
        )));
    }
    let data = EcRequestReadMemMap {
        offset: offset as u8,
        size: length as u8,
    }
    .send_command_vec_sized(ec, usize::from(length))?;
    if data.len() != usize::from(length) {
        return Err(EcError::DeviceError(format!(
            "Read {} bytes from memory map, expected {}",
            data.len(),
            length
        )));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::testutil::{attach, FakeClock, FakeCrosEc, FakeEcMode, SimBus};

    fn ec<'a>(bus: &'a mut SimBus, clock: &'a FakeClock) -> LpcEc<'a> {
        LpcEc::new(bus, clock, EcDriverType::CrosEc, LpcEcConfig::default())
    }

    #[test]
    fn hello_detects_ec() {
        let mut bus = SimBus::floating();
        attach(&mut bus, FakeCrosEc::new(FakeEcMode::V3));
        let clock = FakeClock::new();
        assert!(hello(&mut ec(&mut bus, &clock)).unwrap());
    }

    #[test]
    fn hello_wrong_answer_is_not_an_error() {
        let mut bus = SimBus::floating();
        let fake = attach(&mut bus, FakeCrosEc::new(FakeEcMode::V2));
        fake.borrow_mut().hello_delta = 0x0102_0305;
        let clock = FakeClock::new();
        assert!(!hello(&mut ec(&mut bus, &clock)).unwrap());
    }

    #[test]
    fn version_strings() {
        let mut bus = SimBus::floating();
        attach(&mut bus, FakeCrosEc::new(FakeEcMode::V3));
        let clock = FakeClock::new();
        let mut ec = ec(&mut bus, &clock);

        let (ro, rw, image) = flash_version(&mut ec).unwrap();
        assert_eq!(ro, "fake_v1.0ro");
        assert_eq!(rw, "fake_v1.1rw");
        assert_eq!(image, EcCurrentImage::RW);
        assert_eq!(version_info(&mut ec).unwrap(), "fake 2012-06-01 builder");
    }

    #[test]
    fn chip_and_protocol_info() {
        let mut bus = SimBus::floating();
        attach(&mut bus, FakeCrosEc::new(FakeEcMode::V2));
        let clock = FakeClock::new();
        let mut ec = ec(&mut bus, &clock);

        let chip = chip_info(&mut ec).unwrap();
        assert_eq!(
            chip,
            EcChipInfo {
                vendor: "ite".to_string(),
                name: "it8518".to_string(),
                revision: "B1".to_string(),
            }
        );
        let info = protocol_info(&mut ec).unwrap();
        assert!(info.supports(2));
        assert!(info.supports(3));
        assert!(!info.supports(1));
        assert_eq!(info.max_request_packet_size, 0xf8);
    }

    #[test]
    fn unknown_command_reports_ec_status() {
        let mut bus = SimBus::floating();
        attach(&mut bus, FakeCrosEc::new(FakeEcMode::V3));
        let clock = FakeClock::new();
        let res = ec(&mut bus, &clock).send_command(0x99, 0, &[]);
        assert!(matches!(
            res,
            Err(EcError::Response(EcResponseStatus::InvalidCommand))
        ));
    }

    #[test]
    fn memmap_through_command() {
        let mut bus = SimBus::floating();
        attach(&mut bus, FakeCrosEc::new(FakeEcMode::V2));
        let clock = FakeClock::new();
        let mut ec = ec(&mut bus, &clock);
        assert_eq!(read_memory_via_cmd(&mut ec, 0x20, 2).unwrap(), b"EC");
        assert!(read_memory_via_cmd(&mut ec, 0xf0, 0x20).is_err());
    }

    #[test]
    fn detect_present_ec() {
        let mut bus = SimBus::floating();
        attach(&mut bus, FakeCrosEc::new(FakeEcMode::V3));
        let clock = FakeClock::new();
        assert!(detect_ec(&mut ec(&mut bus, &clock)).unwrap());

        let mut bus = SimBus::floating();
        attach(&mut bus, FakeCrosEc::gec());
        let mut gec = LpcEc::new(&mut bus, &clock, EcDriverType::Gec, LpcEcConfig::default());
        assert!(detect_ec(&mut gec).unwrap());
    }

    #[test]
    fn detect_absent_ec() {
        let mut bus = SimBus::floating();
        let clock = FakeClock::new();
        assert!(!detect_ec(&mut ec(&mut bus, &clock)).unwrap());
        // Only the signature was read
        assert_eq!(bus.transactions, 2);
        assert_eq!(clock.now_us(), 0);

        // Without a memory map only the timeout tells
        let mut gec = LpcEc::new(&mut bus, &clock, EcDriverType::Gec, LpcEcConfig::default());
        assert!(!detect_ec(&mut gec).unwrap());
        assert_eq!(clock.now_us(), portio::EC_LPC_TIMEOUT_US);
    }

    #[test]
    fn error_display() {
        let err = EcError::InvalidChecksum {
            expected: 0x12,
            actual: 0x13,
        };
        assert_eq!(
            err.to_string(),
            "Invalid response checksum. Expected 0x12, got 0x13"
        );
        assert_eq!(
            EcError::Response(EcResponseStatus::Busy).to_string(),
            "EC responded with Busy"
        );
    }
}
