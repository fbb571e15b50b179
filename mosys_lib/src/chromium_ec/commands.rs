use num_derive::FromPrimitive;

use super::command::*;

/// Value sent with a hello request
pub const EC_HELLO_IN: u32 = 0xf0e0d0c0;
/// What a healthy EC answers to [`EC_HELLO_IN`]
pub const EC_HELLO_OUT: u32 = 0xf1e2d3c4;

#[repr(C, packed)]
pub struct EcRequestHello {
    pub in_data: u32,
}

#[repr(C, packed)]
pub struct EcResponseHello {
    /// Input data plus 0x01020304
    pub out_data: u32,
}

impl EcRequest<EcResponseHello> for EcRequestHello {
    fn command_id() -> EcCommands {
        EcCommands::Hello
    }
}

#[repr(C, packed)]
pub struct EcRequestGetVersion {}

#[repr(C, packed)]
pub struct EcResponseGetVersion {
    /// Null-terminated version of the RO firmware
    pub version_string_ro: [u8; 32],
    /// Null-terminated version of the RW firmware
    pub version_string_rw: [u8; 32],
    /// Used to be the RW-B string
    pub reserved: [u8; 32],
    /// Which EC image is currently in-use. See enum EcCurrentImage
    pub current_image: u32,
}
impl EcRequest<EcResponseGetVersion> for EcRequestGetVersion {
    fn command_id() -> EcCommands {
        EcCommands::GetVersion
    }
}

/// Which of the two EC images is currently in-use
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive)]
pub enum EcCurrentImage {
    Unknown = 0,
    RO = 1,
    RW = 2,
}

/// Response is a null-terminated string, so no fixed struct
#[repr(C, packed)]
pub struct EcRequestGetBuildInfo {}
impl EcRequest<()> for EcRequestGetBuildInfo {
    fn command_id() -> EcCommands {
        EcCommands::GetBuildInfo
    }
}

#[repr(C, packed)]
pub struct EcRequestGetChipInfo {}

#[repr(C, packed)]
pub struct EcResponseGetChipInfo {
    /// Null-terminated strings
    pub vendor: [u8; 32],
    pub name: [u8; 32],
    pub revision: [u8; 32],
}
impl EcRequest<EcResponseGetChipInfo> for EcRequestGetChipInfo {
    fn command_id() -> EcCommands {
        EcCommands::GetChipInfo
    }
}

/// Read a range of the memory map through a command, for ECs whose memory map
/// is not directly accessible
#[repr(C, packed)]
pub struct EcRequestReadMemMap {
    pub offset: u8,
    pub size: u8,
}
impl EcRequest<()> for EcRequestReadMemMap {
    fn command_id() -> EcCommands {
        EcCommands::ReadMemMap
    }
}

#[repr(C, packed)]
pub struct EcRequestGetProtocolInfo {}

#[repr(C, packed)]
pub struct EcResponseGetProtocolInfo {
    /// Bit N set means protocol version N is supported
    pub protocol_versions: u32,
    pub max_request_packet_size: u16,
    pub max_response_packet_size: u16,
    pub flags: u32,
}
impl EcRequest<EcResponseGetProtocolInfo> for EcRequestGetProtocolInfo {
    fn command_id() -> EcCommands {
        EcCommands::GetProtocolInfo
    }
}
