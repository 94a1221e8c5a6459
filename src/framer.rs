//! RX/TX byte pipeline: owns the two packet rings and the byte-stuffing
//! decoder, and is the only place channel multiplexing, checksum
//! verification and RPC dispatch meet.

use core::cell::UnsafeCell;

use crate::channel::Channel;
use crate::cobs;
use crate::fnv1a;
use crate::ring::PacketRing;
use crate::rpc::Rpc;

const ERR_BAD_RPC: &[u8] = b"Bad RPC!\n";
const ERR_CORRUPTED: &[u8] = b"Corrupted request\n";
const ERR_FAILED: &[u8] = b"RPC failed\n";

/// Owns the RX/TX rings and the per-byte decoder for one framed stream.
///
/// `receive_byte` and `characters_to_send` are ISR-safe; `poll` and `send`
/// run from the single application task and must never be called from the
/// transport interrupt.
pub struct Framer<const RX_SIZE: usize, const TX_SIZE: usize, const MAX_PKT: usize> {
    rx_ring: PacketRing<RX_SIZE, MAX_PKT>,
    tx_ring: PacketRing<TX_SIZE, MAX_PKT>,
    decoder: UnsafeCell<cobs::Decoder>,
}

// Safety: `decoder` is mutated only from `receive_byte`, which the caller
// must only ever invoke from the single RX producer context (the transport
// ISR, never concurrently with itself). `rx_ring`/`tx_ring` already carry
// their own SPSC safety argument.
unsafe impl<const RX_SIZE: usize, const TX_SIZE: usize, const MAX_PKT: usize> Sync
    for Framer<RX_SIZE, TX_SIZE, MAX_PKT>
{
}

impl<const RX_SIZE: usize, const TX_SIZE: usize, const MAX_PKT: usize> Default
    for Framer<RX_SIZE, TX_SIZE, MAX_PKT>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const RX_SIZE: usize, const TX_SIZE: usize, const MAX_PKT: usize>
    Framer<RX_SIZE, TX_SIZE, MAX_PKT>
{
    pub fn new() -> Self {
        Framer {
            rx_ring: PacketRing::new(),
            tx_ring: PacketRing::new(),
            decoder: UnsafeCell::new(cobs::Decoder::new()),
        }
    }

    /// Feeds one received byte through the decoder into the RX ring.
    /// ISR-safe. Returns `true` when a frame boundary (`0x00`) was just
    /// seen, as a hint to wake the polling task.
    pub fn receive_byte(&self, b: u8) -> bool {
        // Safety: see the `unsafe impl Sync` note above.
        let decoder = unsafe { &mut *self.decoder.get() };
        match decoder.feed(b) {
            cobs::Fed::FrameEnd => {
                if self.rx_ring.dropping() {
                    #[cfg(feature = "defmt")]
                    defmt::debug!("comms_ccf: rx ring overflowed, dropping frame");
                    self.rx_ring.reset_dropped();
                } else {
                    self.rx_ring.notify();
                }
                true
            }
            cobs::Fed::Data(byte) => {
                self.rx_ring.push_back(byte);
                false
            }
            cobs::Fed::Control => false,
        }
    }

    /// ISR-safe. The transport pulls queued TX bytes from the returned
    /// frame; dropping it advances the ring past the sent bytes.
    pub fn characters_to_send(&self) -> Option<crate::ring::Frame<'_, TX_SIZE, MAX_PKT>> {
        self.tx_ring.next_frame()
    }

    /// Drains the RX ring frame by frame, dispatching RPC requests and
    /// queueing replies. Never called from ISR context. Returns `true` if
    /// any reply was queued, as a hint to kick the transport.
    pub fn poll(&self, rpc: &Rpc<'_>) -> bool {
        let mut queued = false;
        while let Some(frame) = self.rx_ring.next_frame() {
            let mut buf = [0u8; MAX_PKT];
            let mut n = 0;
            for b in frame {
                if n < buf.len() {
                    buf[n] = b;
                    n += 1;
                }
            }
            if self.handle_frame(&buf[..n], rpc) {
                queued = true;
            }
        }
        queued
    }

    fn handle_frame(&self, frame: &[u8], rpc: &Rpc<'_>) -> bool {
        if frame.len() < 1 + fnv1a::CHECKSUM_LEN + 1 {
            return self.send(Channel::Rpc, ERR_BAD_RPC);
        }
        match fnv1a::check_at_end(frame) {
            Ok(true) => {}
            _ => {
                #[cfg(feature = "defmt")]
                defmt::debug!("comms_ccf: checksum mismatch, dropping frame ({} bytes)", frame.len());
                return self.send(Channel::Rpc, ERR_CORRUPTED);
            }
        }

        let channel = Channel::from_tag(frame[0]);
        let payload = &frame[1..frame.len() - fnv1a::CHECKSUM_LEN];

        match channel {
            Channel::Rpc => self.handle_rpc(payload, rpc),
            Channel::Log | Channel::Trace | Channel::Reserved(_) => false,
        }
    }

    fn handle_rpc(&self, payload: &[u8], rpc: &Rpc<'_>) -> bool {
        if payload.len() < 2 {
            return self.send(Channel::Rpc, ERR_BAD_RPC);
        }
        let seq_no = payload[0];
        let function = payload[1];
        let args = &payload[2..];

        let mut ret_buf = [0u8; MAX_PKT];
        match rpc.call(function, args, &mut ret_buf) {
            Ok(n) => {
                let mut reply = [0u8; MAX_PKT];
                let header_len = 2;
                if header_len + n > reply.len() {
                    return self.send(Channel::Rpc, ERR_FAILED);
                }
                reply[0] = seq_no;
                reply[1] = function;
                reply[header_len..header_len + n].copy_from_slice(&ret_buf[..n]);
                self.send(Channel::Rpc, &reply[..header_len + n])
            }
            Err(_e) => {
                #[cfg(feature = "defmt")]
                defmt::debug!("comms_ccf: rpc dispatch failed: {}", _e);
                self.send(Channel::Rpc, ERR_FAILED)
            }
        }
    }

    /// Prepends the channel byte, appends the checksum, byte-stuffs the
    /// whole thing into the TX ring and pushes the terminating zero. Never
    /// called from ISR context.
    pub fn send(&self, channel: Channel, payload: &[u8]) -> bool {
        let body_len = 1 + payload.len() + fnv1a::CHECKSUM_LEN;
        if body_len > MAX_PKT {
            return false;
        }
        let mut body = [0u8; MAX_PKT];
        body[0] = channel.tag();
        body[1..1 + payload.len()].copy_from_slice(payload);
        if fnv1a::put_at_end(&mut body[..body_len]).is_err() {
            return false;
        }

        for byte in cobs::Encoder::new(&body[..body_len]) {
            self.tx_ring.push_back(byte);
        }
        self.tx_ring.push_back(0);

        if self.tx_ring.dropping() {
            self.tx_ring.reset_dropped();
            false
        } else {
            self.tx_ring.notify();
            true
        }
    }
}
