//! Wire format of the Chrome EC LPC host command interface
//!
//! Three generations share the same I/O ports:
//! - legacy: raw parameters at 0x880, no framing, no checksum
//! - version 2: an args frame at 0x800 with flags, version, size and checksum,
//!   parameters at 0x804
//! - version 3: a self-contained packet at 0x800, kicked off with 0xDA

use log::Level;

use crate::chromium_ec::{EcError, EcResult};
use crate::util;

/*
 * Value written to legacy command port / prefix byte to indicate protocol
 * 3+ structs are being used.  Usage is bus-dependent.
 */
pub const EC_COMMAND_PROTOCOL_3: u8 = 0xda;

// LPC command status byte masks
/// EC has written data but host hasn't consumed it yet
pub const EC_LPC_STATUS_TO_HOST: u8 = 0x01;
/// Host has written data/command but EC hasn't consumed it yet
pub const EC_LPC_STATUS_FROM_HOST: u8 = 0x02;
/// EC is still processing a command
pub const EC_LPC_STATUS_PROCESSING: u8 = 0x04;
/// EC is busy
pub const EC_LPC_STATUS_BUSY_MASK: u8 = EC_LPC_STATUS_FROM_HOST | EC_LPC_STATUS_PROCESSING;

// I/O addresses for host command
pub const EC_LPC_ADDR_HOST_DATA: u16 = 0x200;
pub const EC_LPC_ADDR_HOST_CMD: u16 = 0x204;

// I/O addresses for host command args and params
// Protocol version 2
pub const EC_LPC_ADDR_HOST_ARGS: u16 = 0x800; /* And 0x801, 0x802, 0x803 */
pub const EC_LPC_ADDR_HOST_PARAM: u16 = 0x804; /* For version 2 params; size is
                                                * EC_PROTO2_MAX_PARAM_SIZE */
/// Maximum parameter and response size of a version 2 command
pub const EC_PROTO2_MAX_PARAM_SIZE: usize = 0xfc;

// Protocol version 3
pub const EC_LPC_ADDR_HOST_PACKET: u16 = 0x800; /* Offset of version 3 packet */
pub const EC_LPC_HOST_PACKET_SIZE: u16 = 0x100; /* Max size of version 3 packet */

// Legacy protocol, no args frame
pub const EC_LPC_ADDR_OLD_PARAM: u16 = 0x880;
pub const EC_OLD_PARAM_SIZE: usize = 0x80;

/// Memory mapped region with EC state
pub const EC_LPC_ADDR_MEMMAP: u16 = 0x900;
/// Total size of EC memory mapped region
pub const EC_MEMMAP_SIZE: u16 = 255;
/// 0x20 == 'E', 0x21 == 'C'
pub const EC_MEMMAP_ID: u16 = 0x20;
/// Host command interface flags (8 bits)
pub const EC_MEMMAP_HOST_CMD_FLAGS: u16 = 0x27;

// Flags in EC_MEMMAP_HOST_CMD_FLAGS
/// Host cmd interface supports the version 2 args frame
pub const EC_HOST_CMD_FLAG_LPC_ARGS_SUPPORTED: u8 = 0x01;
/// Host cmd interface supports version 3 protocol
pub const EC_HOST_CMD_FLAG_VERSION_3: u8 = 0x02;

// Flags in EcLpcHostArgs
/// Args are from host
pub const EC_HOST_ARGS_FLAG_FROM_HOST: u8 = 0x01;
/// Args are from EC
pub const EC_HOST_ARGS_FLAG_TO_HOST: u8 = 0x02;

/// Args frame of protocol version 2, 4 bytes at EC_LPC_ADDR_HOST_ARGS
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EcLpcHostArgs {
    pub flags: u8,
    pub command_version: u8,
    /// Size of the parameters (request) or response data
    pub data_size: u8,
    /// Sum of command, flags, command_version, data_size and all data bytes
    pub checksum: u8,
}

impl EcLpcHostArgs {
    /// Build the frame for a host request, checksum included
    pub fn request(command: u8, command_version: u8, data: &[u8]) -> EcResult<Self> {
        if data.len() > EC_PROTO2_MAX_PARAM_SIZE {
            return Err(EcError::RequestTooBig {
                size: data.len(),
                max: EC_PROTO2_MAX_PARAM_SIZE,
            });
        }
        let mut args = EcLpcHostArgs {
            flags: EC_HOST_ARGS_FLAG_FROM_HOST,
            command_version,
            data_size: data.len() as u8,
            checksum: 0,
        };
        args.checksum = args.compute_checksum(command, data);
        Ok(args)
    }

    /// Checksum as the other side computes it, ignoring the stored one
    pub fn compute_checksum(&self, command: u8, data: &[u8]) -> u8 {
        let header = command
            .wrapping_add(self.flags)
            .wrapping_add(self.command_version)
            .wrapping_add(self.data_size);
        header.wrapping_add(checksum_fold(data))
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        [self.flags, self.command_version, self.data_size, self.checksum]
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        EcLpcHostArgs {
            flags: bytes[0],
            command_version: bytes[1],
            data_size: bytes[2],
            checksum: bytes[3],
        }
    }
}

pub const EC_HOST_REQUEST_VERSION: u8 = 3;

/// Request header of version 3
#[repr(C, packed)]
pub struct EcHostRequest {
    /// Version of this request structure (must be 3)
    pub struct_version: u8,

    /// Checksum of entire request (header and data)
    /// Everything added together adds up to 0 (wrapping around u8 limit)
    pub checksum: u8,

    /// Command number
    pub command: u16,

    /// Command version, usually 0
    pub command_version: u8,

    /// Reserved byte in protocol v3. Must be 0
    pub reserved: u8,

    /// Data length. Data is immediately after the header
    pub data_len: u16,
}

pub const EC_HOST_RESPONSE_VERSION: u8 = 3;

/// Response header of version 3
#[repr(C, packed)]
pub struct EcHostResponse {
    /// Version of this request structure (must be 3)
    pub struct_version: u8,

    /// Checksum of entire request (header and data)
    pub checksum: u8,

    /// Status code of response. See enum _EcStatus
    pub result: u16,

    /// Data length. Data is immediately after the header
    pub data_len: u16,

    /// Reserved byte in protocol v3. Must be 0
    pub reserved: u16,
}
pub const HEADER_LEN: usize = std::mem::size_of::<EcHostResponse>();
/// Largest data payload that fits into a version 3 packet
pub const EC_PROTO3_MAX_DATA_SIZE: usize = EC_LPC_HOST_PACKET_SIZE as usize - HEADER_LEN;

/// Plain wrapping sum of all bytes
pub fn checksum_fold(numbers: &[u8]) -> u8 {
    numbers.iter().fold(0u8, |acc, x| acc.wrapping_add(*x))
}

/// Byte that makes all buffers together sum up to zero
pub fn checksum_buffers(buffers: &[&[u8]]) -> u8 {
    let cs = buffers
        .iter()
        .map(|x| checksum_fold(x))
        .fold(0u8, |acc, x| acc.wrapping_add(x))
        .wrapping_neg();
    if log_enabled!(Level::Trace) {
        trace!("Checksum of {} buffers is: {:#X}", buffers.len(), cs);
    }
    cs
}

pub fn checksum_buffer(buffer: &[u8]) -> u8 {
    checksum_buffers(&[buffer])
}

/// Serialize a version 3 request packet, checksum included
pub fn pack_request(command: u16, command_version: u8, data: &[u8]) -> EcResult<Vec<u8>> {
    let offset = std::mem::size_of::<EcHostRequest>();
    if data.len() > EC_LPC_HOST_PACKET_SIZE as usize - offset {
        return Err(EcError::RequestTooBig {
            size: data.len(),
            max: EC_LPC_HOST_PACKET_SIZE as usize - offset,
        });
    }
    let mut request = EcHostRequest {
        struct_version: EC_HOST_REQUEST_VERSION,
        checksum: 0,
        command,
        command_version,
        reserved: 0,
        data_len: data.len() as u16,
    };

    let mut buffer = vec![0_u8; offset + data.len()];
    buffer[offset..].copy_from_slice(data);
    let r_bytes: &[u8] = unsafe { util::any_as_u8_slice(&request) };
    buffer[..offset].copy_from_slice(r_bytes);

    request.checksum = checksum_buffer(&buffer);
    let r_bytes: &[u8] = unsafe { util::any_as_u8_slice(&request) };
    buffer[..offset].copy_from_slice(r_bytes);

    if log_enabled!(Level::Trace) {
        trace!("Request packet:\n{}", util::format_multiline_buffer(&buffer, 0));
    }
    Ok(buffer)
}

/// Parse the fields of a version 3 request packet
pub fn unpack_request_header(bytes: &[u8]) -> EcResult<EcHostRequest> {
    unsafe { util::read_struct(bytes) }
        .ok_or_else(|| EcError::DeviceError("Request packet too short".to_string()))
}

/// Parse and sanity check a version 3 response header
pub fn unpack_response_header(bytes: &[u8]) -> EcResult<EcHostResponse> {
    let response: EcHostResponse = unsafe { util::read_struct(bytes) }
        .ok_or_else(|| EcError::DeviceError("Response header too short".to_string()))?;

    if response.struct_version != EC_HOST_RESPONSE_VERSION {
        return Err(EcError::DeviceError(format!(
            "Struct version invalid. Should be {:#X}, is {:#X}",
            EC_HOST_RESPONSE_VERSION, response.struct_version
        )));
    }
    if response.reserved != 0 {
        return Err(EcError::DeviceError(format!(
            "Reserved invalid. Should be 0, is {:#X}",
            { response.reserved }
        )));
    }
    Ok(response)
}
