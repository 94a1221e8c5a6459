//! Lock-free single-producer / single-consumer packet ring.
//!
//! Stores whole, length-prefixed packets in a flat byte buffer. One
//! producer (in practice, the transport ISR on RX, or the owning task on
//! TX) calls [`PacketRing::push_back`]/[`PacketRing::notify`]; one consumer
//! calls [`PacketRing::next_frame`]. The two roles never touch the same
//! buffer region at the same time, so no locking is required — only the
//! ordering discipline documented on each method.

use core::cell::{Cell, UnsafeCell};
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::smallest_uint;

/// A packet ring over `SIZE` bytes (must be a power of two) holding packets
/// of at most `MAX_PKT` bytes each.
pub struct PacketRing<const SIZE: usize, const MAX_PKT: usize> {
    buf: UnsafeCell<[u8; SIZE]>,
    read: AtomicUsize,
    write: AtomicUsize,
    notified: AtomicUsize,
    dropped: Cell<bool>,
    len_width: usize,
}

// Safety: `buf` is only ever written at indices in `[write, write+1)` by the
// single producer, and only ever read at indices in `[read, notified)` by
// the single consumer; `push_back` never advances `write` past a byte the
// consumer could be reading, and `next_frame`/`Frame::drop` never advance
// `read` past a byte the producer has not yet committed via `notify`. The
// two ranges are therefore always disjoint under the single-producer/
// single-consumer discipline documented on each method.
unsafe impl<const SIZE: usize, const MAX_PKT: usize> Sync for PacketRing<SIZE, MAX_PKT> {}

impl<const SIZE: usize, const MAX_PKT: usize> Default for PacketRing<SIZE, MAX_PKT> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SIZE: usize, const MAX_PKT: usize> PacketRing<SIZE, MAX_PKT> {
    pub fn new() -> Self {
        debug_assert!(SIZE.is_power_of_two(), "ring size must be a power of two");
        PacketRing {
            buf: UnsafeCell::new([0u8; SIZE]),
            read: AtomicUsize::new(0),
            write: AtomicUsize::new(0),
            notified: AtomicUsize::new(0),
            dropped: Cell::new(false),
            len_width: smallest_uint::width_for(MAX_PKT as u64),
        }
    }

    /// Resets all indices and the dropped flag to the empty state. Intended
    /// for startup only: requires exclusive access.
    pub fn reset(&mut self) {
        *self.read.get_mut() = 0;
        *self.write.get_mut() = 0;
        *self.notified.get_mut() = 0;
        self.dropped.set(false);
    }

    fn write_byte(&self, idx: usize, byte: u8) {
        let i = idx % SIZE;
        // Safety: see the `unsafe impl Sync` note above.
        unsafe { (*self.buf.get())[i] = byte };
    }

    fn read_byte(&self, idx: usize) -> u8 {
        let i = idx % SIZE;
        // Safety: see the `unsafe impl Sync` note above.
        unsafe { (*self.buf.get())[i] }
    }

    /// Producer path: ISR-safe, non-blocking. Appends one payload byte to
    /// the in-progress packet, reserving the length-prefix slot the first
    /// time a packet is started. Sets `dropped` instead of writing past
    /// capacity or past `MAX_PKT`.
    pub fn push_back(&self, byte: u8) {
        if self.dropped.get() {
            return;
        }
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Relaxed);
        let notified = self.notified.load(Ordering::Relaxed);

        let candidate_write = if write == notified { write + self.len_width } else { write };
        let in_progress_len = candidate_write - notified - self.len_width;

        let would_overflow = candidate_write + 1 - read > SIZE;
        let would_exceed_pkt = in_progress_len + 1 > MAX_PKT;
        if would_overflow || would_exceed_pkt {
            self.dropped.set(true);
            return;
        }

        self.write_byte(candidate_write, byte);
        self.write.store(candidate_write + 1, Ordering::Release);
    }

    /// Producer path: commits the in-progress packet, making it visible to
    /// the consumer. A no-op if nothing was pushed since the last commit.
    pub fn notify(&self) {
        if self.dropped.get() {
            let notified = self.notified.load(Ordering::Relaxed);
            self.write.store(notified, Ordering::Relaxed);
            self.dropped.set(false);
            return;
        }
        let write = self.write.load(Ordering::Relaxed);
        let notified = self.notified.load(Ordering::Relaxed);
        if write == notified {
            return;
        }
        let len = write - notified - self.len_width;
        for i in 0..self.len_width {
            self.write_byte(notified + i, ((len >> (8 * i)) & 0xFF) as u8);
        }
        self.notified.store(write, Ordering::Release);
    }

    /// Producer path: discards the in-progress (over-sized) packet.
    pub fn reset_dropped(&self) {
        if self.dropped.get() {
            let notified = self.notified.load(Ordering::Relaxed);
            self.write.store(notified, Ordering::Relaxed);
            self.dropped.set(false);
        }
    }

    /// Whether the in-progress packet has exceeded its size bound and is
    /// being silently discarded.
    pub fn dropping(&self) -> bool {
        self.dropped.get()
    }

    /// Consumer path: yields the next complete packet, if any. The
    /// returned [`Frame`] releases its bytes (advances `read`) on drop, so
    /// frames must be consumed in order, one at a time.
    pub fn next_frame(&self) -> Option<Frame<'_, SIZE, MAX_PKT>> {
        let read = self.read.load(Ordering::Relaxed);
        let notified = self.notified.load(Ordering::Acquire);
        if read == notified {
            return None;
        }
        let mut len: usize = 0;
        for i in 0..self.len_width {
            len |= (self.read_byte(read + i) as usize) << (8 * i);
        }
        let start = read + self.len_width;
        let end = start + len;
        Some(Frame { ring: self, pos: start, end })
    }
}

/// One delimited packet borrowed from a [`PacketRing`]. Iterates the
/// packet's bytes in order; dropping it (even without fully iterating)
/// releases the bytes back to the ring.
pub struct Frame<'a, const SIZE: usize, const MAX_PKT: usize> {
    ring: &'a PacketRing<SIZE, MAX_PKT>,
    pos: usize,
    end: usize,
}

impl<'a, const SIZE: usize, const MAX_PKT: usize> Frame<'a, SIZE, MAX_PKT> {
    pub fn len(&self) -> usize {
        self.end - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == self.end
    }
}

impl<'a, const SIZE: usize, const MAX_PKT: usize> Iterator for Frame<'a, SIZE, MAX_PKT> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.pos >= self.end {
            return None;
        }
        let b = self.ring.read_byte(self.pos);
        self.pos += 1;
        Some(b)
    }
}

impl<'a, const SIZE: usize, const MAX_PKT: usize> Drop for Frame<'a, SIZE, MAX_PKT> {
    fn drop(&mut self) {
        self.ring.read.store(self.end, Ordering::Release);
    }
}
