//! Transport abstraction: the raw byte in/out driver and its ISR hooks.
//!
//! Framing, checksums, the rings and RPC dispatch all live in this crate;
//! the transport only has to move bytes. Users implement [`Transport`] for
//! their UART (or other byte-stream) peripheral and drive a [`Framer`] with
//! it from two places: the RX interrupt, which calls
//! [`Framer::receive_byte`] for each received byte, and `tx_available`/
//! `tx_done`, which pull queued bytes via [`Framer::characters_to_send`].

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::framer::Framer;
use crate::ring::Frame;

/// Error trait for transport implementations.
pub trait TransportError: fmt::Debug + fmt::Display {}

/// Raw byte in/out for one UART-like peripheral. Implementations are not
/// expected to buffer, retry or frame anything; `write_byte` is called at
/// most once per TX-done interrupt, driven by [`TransportDriver`].
pub trait Transport {
    type Error: TransportError;

    /// Starts transmitting a single byte. Completion is signalled
    /// out-of-band by the peripheral's TX-done interrupt.
    fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error>;
}

/// Drives a [`Transport`] from a [`Framer`]'s TX ring, one byte per call,
/// guarding the application-initiated kick (`tx_available`) and the ISR
/// completion callback (`tx_done`) against running the start-next-byte
/// sequence twice. Both call sites run the check-and-start sequence inside
/// [`critical_section::with`]: on targets where `write_byte` can complete
/// synchronously and re-enter `tx_done` before `tx_available` returns (the
/// donor reference's own `uart0` driver notes this), the two call sites
/// would otherwise race on `self.current`.
///
/// Holds the currently in-flight [`Frame`] across calls so only one byte
/// is pulled per `write_byte`; the frame (and the ring bytes behind it) is
/// only released once fully drained.
pub struct TransportDriver<'f, const RX_SIZE: usize, const TX_SIZE: usize, const MAX_PKT: usize, T: Transport>
{
    framer: &'f Framer<RX_SIZE, TX_SIZE, MAX_PKT>,
    transport: T,
    tx_busy: AtomicBool,
    current: Option<Frame<'f, TX_SIZE, MAX_PKT>>,
}

impl<'f, const RX_SIZE: usize, const TX_SIZE: usize, const MAX_PKT: usize, T: Transport>
    TransportDriver<'f, RX_SIZE, TX_SIZE, MAX_PKT, T>
{
    pub fn new(framer: &'f Framer<RX_SIZE, TX_SIZE, MAX_PKT>, transport: T) -> Self {
        TransportDriver { framer, transport, tx_busy: AtomicBool::new(false), current: None }
    }

    /// Called by the application after `Framer::send` (or `poll`) queued
    /// new bytes. No-op if a transmission is already in flight.
    pub fn tx_available(&mut self) {
        critical_section::with(|_cs| {
            if self.tx_busy.swap(true, Ordering::AcqRel) {
                return;
            }
            if !self.start_next_byte() {
                self.tx_busy.store(false, Ordering::Release);
            }
        });
    }

    /// Called from the TX-complete interrupt. Starts the next queued byte,
    /// if any; otherwise clears `tx_busy` so a later `tx_available` call
    /// restarts transmission.
    pub fn tx_done(&mut self) {
        critical_section::with(|_cs| {
            if !self.start_next_byte() {
                self.tx_busy.store(false, Ordering::Release);
            }
        });
    }

    fn start_next_byte(&mut self) -> bool {
        loop {
            if self.current.is_none() {
                self.current = self.framer.characters_to_send();
            }
            let Some(frame) = self.current.as_mut() else {
                return false;
            };
            match frame.next() {
                Some(byte) => return self.transport.write_byte(byte).is_ok(),
                None => {
                    // Exhausted: dropping releases these ring bytes, then
                    // loop round to see if another frame is queued.
                    self.current = None;
                }
            }
        }
    }
}
