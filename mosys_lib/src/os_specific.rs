//! Helper functions that need OS/platform specific implementations

use std::{thread, time};

/// Sleep a number of microseconds
pub fn sleep(micros: u64) {
    let duration = time::Duration::from_micros(micros);
    thread::sleep(duration);
}

/// Whether the current process runs with root privileges
#[cfg(unix)]
pub fn is_root() -> bool {
    nix::unistd::Uid::effective().is_root()
}
#[cfg(not(unix))]
pub fn is_root() -> bool {
    false
}
