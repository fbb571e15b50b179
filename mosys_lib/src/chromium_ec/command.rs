use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::util;

use super::{EcDriver, EcError, EcResult};

#[non_exhaustive]
#[derive(Debug, FromPrimitive, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EcCommands {
    /// Check that the EC is alive, it answers with a known transform of the input
    Hello = 0x01,
    GetVersion = 0x02,
    GetBuildInfo = 0x04,
    GetChipInfo = 0x05,
    /// Command to read data from EC memory map
    ReadMemMap = 0x07,
    /// Which protocol versions and packet sizes the EC supports
    GetProtocolInfo = 0x0B,
}

pub trait EcRequest<R> {
    fn command_id() -> EcCommands;
    // Can optionally override this
    fn command_version() -> u8 {
        0
    }
}

impl<T: EcRequest<R>, R> EcRequestRaw<R> for T {
    fn command_id_u16() -> u16 {
        Self::command_id() as u16
    }
    fn command_version() -> u8 {
        <Self as EcRequest<R>>::command_version()
    }
}

pub trait EcRequestRaw<R> {
    fn command_id_u16() -> u16;
    fn command_version() -> u8;

    fn format_request(&self) -> &[u8]
    where
        Self: Sized,
    {
        unsafe { util::any_as_u8_slice(self) }
    }

    /// Send the request, accepting a response of any size the driver allows
    fn send_command_vec(&self, ec: &mut dyn EcDriver) -> EcResult<Vec<u8>>
    where
        Self: Sized,
    {
        self.send_command_vec_sized(ec, usize::MAX)
    }

    /// Send the request, expecting at most `insize` bytes back
    fn send_command_vec_sized(&self, ec: &mut dyn EcDriver, insize: usize) -> EcResult<Vec<u8>>
    where
        Self: Sized,
    {
        let request = self.format_request();
        let response = ec.send_command_sized(
            Self::command_id_u16(),
            <Self as EcRequestRaw<R>>::command_version(),
            request,
            insize,
        )?;
        trace!(
            "send_command<{:X?}>",
            <EcCommands as FromPrimitive>::from_u16(Self::command_id_u16())
        );
        trace!("  Request:  {:?}", request);
        trace!("  Response: {:?}", response);
        Ok(response)
    }

    fn send_command(&self, ec: &mut dyn EcDriver) -> EcResult<R>
    where
        Self: Sized,
    {
        let response = self.send_command_vec_sized(ec, std::mem::size_of::<R>())?;
        if response.len() != std::mem::size_of::<R>() {
            return Err(EcError::DeviceError(format!(
                "Returned data size ({}) is not the expected size: {}",
                response.len(),
                std::mem::size_of::<R>()
            )));
        }
        unsafe { util::read_struct(&response) }
            .ok_or_else(|| EcError::DeviceError("Response too short".to_string()))
    }
}
