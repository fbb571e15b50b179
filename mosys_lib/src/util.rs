//! Miscellaneous utility functions to use across modules

use std::fmt::Write;

/// Convert any type to a u8 slice (Like a C byte buffer)
///
/// # Safety
/// `T` must be a plain-old-data type without padding, typically `#[repr(C, packed)]`.
pub unsafe fn any_as_u8_slice<T: Sized>(p: &T) -> &[u8] {
    let len = ::std::mem::size_of::<T>();
    ::std::slice::from_raw_parts((p as *const T) as *const u8, len)
}

/// Read a plain-old-data struct from the start of a byte buffer
///
/// Returns `None` if the buffer is too short to hold `T`.
///
/// # Safety
/// Every bit pattern must be a valid `T`, which holds for `#[repr(C, packed)]`
/// structs made only of integers and byte arrays.
pub unsafe fn read_struct<T: Sized>(bytes: &[u8]) -> Option<T> {
    if bytes.len() < std::mem::size_of::<T>() {
        return None;
    }
    Some(std::ptr::read_unaligned(bytes.as_ptr() as *const T))
}

pub fn format_buffer(buffer: &[u8]) -> String {
    let mut s = String::with_capacity(buffer.len() * 5);
    for (i, byte) in buffer.iter().enumerate() {
        if i > 0 {
            s.push(' ');
        }
        let _ = write!(s, "{:#04X}", byte);
    }
    s
}

/// Format a byte buffer like xxd, 16 bytes per line
///
/// `offset` is the address of the first byte, used for the line prefix.
pub fn format_multiline_buffer(buffer: &[u8], offset: usize) -> String {
    let mut s = String::new();
    for (line, chunk) in buffer.chunks(16).enumerate() {
        let _ = write!(s, "{:08X}:", offset + line * 16);
        for pair in chunk.chunks(2) {
            s.push(' ');
            for byte in pair {
                let _ = write!(s, "{:02x}", byte);
            }
        }
        // Pad short last line so the ASCII column lines up
        let written = chunk.len() * 2 + (chunk.len() + 1) / 2;
        for _ in written..40 {
            s.push(' ');
        }
        s.push_str("  ");
        for byte in chunk {
            let c = *byte as char;
            s.push(if c.is_ascii_graphic() || c == ' ' { c } else { '.' });
        }
        s.push('\n');
    }
    s
}

/// Print a byte buffer like xxd
pub fn print_multiline_buffer(buffer: &[u8], offset: usize) {
    print!("{}", format_multiline_buffer(buffer, offset));
}

/// Interpret a fixed-size, NUL-padded C string field
pub fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).to_string()
}
