//! A library to inspect SuperIO chips and Chrome OS embedded controllers
//! through the x86 I/O port space, and building tools to do so.

#[macro_use]
extern crate log;

pub mod chromium_ec;
pub mod clock;
pub mod commandline;
pub mod config;
pub mod lock;
mod os_specific;
pub mod portio;
pub mod superio;
#[cfg(test)]
mod testutil;
mod util;

pub mod built_info {
    // The file has been placed there by the build script.
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}
