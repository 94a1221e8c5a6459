//! The wire-protocol `Log` channel: formats a record and submits it as a
//! packet (or stages it into a caller-supplied buffer for later send).
//!
//! Core, always-on functionality: the record a firmware module sends to the
//! host over the same framed stream RPC traffic rides on.

use core::fmt::{self, Write as _};

use crate::channel::{Channel, LogLevel};
use crate::framer::Framer;

/// Longest formatted message `log`/`log_to_buffer` will stage. Longer
/// output is truncated, not rejected.
pub const MAX_MESSAGE_LEN: usize = 192;

/// Formats `args` into `buf` as `[level<<5|module : 1][length : 1][bytes :
/// length]`, without touching any ring. Returns the number of bytes
/// written, so callers in restricted contexts (e.g. inside an RPC handler,
/// which must not itself call `send`) can stage a record and have an outer
/// scope transmit it.
pub fn log_to_buffer(
    buf: &mut [u8],
    level: LogLevel,
    module: u8,
    args: fmt::Arguments<'_>,
) -> usize {
    if buf.len() < 2 {
        return 0;
    }
    let mut formatted: heapless::String<MAX_MESSAGE_LEN> = heapless::String::new();
    let _ = formatted.write_fmt(args);

    let room = (buf.len() - 2).min(u8::MAX as usize);
    let len = formatted.len().min(room);

    buf[0] = level.pack_header(module);
    buf[1] = len as u8;
    buf[2..2 + len].copy_from_slice(&formatted.as_bytes()[..len]);
    2 + len
}

/// Formats `args` and sends it immediately on the `Log` channel.
pub fn log<const RX_SIZE: usize, const TX_SIZE: usize, const MAX_PKT: usize>(
    framer: &Framer<RX_SIZE, TX_SIZE, MAX_PKT>,
    level: LogLevel,
    module: u8,
    args: fmt::Arguments<'_>,
) -> bool {
    let mut buf = [0u8; MAX_PKT];
    let n = log_to_buffer(&mut buf, level, module, args);
    if n == 0 {
        return false;
    }
    framer.send(Channel::Log, &buf[..n])
}

/// Convenience entry point mirroring `log(level, module, fmt, ...)`:
/// formats with `core::format_args!` and sends on the `Log` channel.
#[macro_export]
macro_rules! ccf_log {
    ($framer:expr, $level:expr, $module:expr, $($arg:tt)+) => {
        $crate::log::log($framer, $level, $module, core::format_args!($($arg)+))
    };
}
