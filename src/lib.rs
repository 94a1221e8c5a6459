//! Comms-CCF: framing, integrity and typed RPC core for an embedded
//! communications stream (typically a UART) that carries remote procedure
//! calls, structured logs and trace events over one unsynchronised byte
//! pipe.
//!
//! Layering, leaves first:
//!
//! - [`smallest_uint`] — compile-time narrowest-width selection for
//!   length-prefix fields.
//! - [`fnv1a`] — the 32-bit checksum appended to every frame.
//! - [`cobs`] — self-synchronising byte-stuffing framing.
//! - [`value`] — the tagged-value wire codec used for RPC data and schema.
//! - [`ring`] — the lock-free SPSC packet ring shared by ISR and task.
//! - [`channel`] — the one-byte RPC/Log/Trace multiplex tag and log levels.
//! - [`framer`] — wires the above into the RX/TX byte pipeline.
//! - [`rpc`] — the statically built typed call table.
//! - [`log`] — the `Log` channel's record format.
//! - [`transport`] — the byte in/out driver contract.
#![no_std]

pub mod channel;
pub mod cobs;
pub mod fnv1a;
pub mod framer;
pub mod log;
pub mod ring;
pub mod rpc;
pub mod smallest_uint;
pub mod transport;
pub mod value;

pub use channel::{Channel, LogLevel};
pub use fnv1a::ChecksumError;
pub use framer::Framer;
pub use rpc::{Call, DispatchError, Rpc, RpcCall};
pub use transport::{Transport, TransportDriver, TransportError};
pub use value::Value;
