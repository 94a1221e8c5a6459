//! Self-synchronising byte-stuffing codec.
//!
//! Turns an arbitrary byte payload into a stream containing no zero bytes
//! (plus a single terminating zero), and recovers the original bytes from
//! such a stream one input byte at a time. See the module-level wire-format
//! description in the project root docs for the chunk layout.

/// Longest run of literal bytes a single chunk header can describe.
const MAX_RUN_LEN: u8 = 254;

/// Maximum number of encoded bytes (including the terminating zero) for a
/// payload of `payload_len` bytes.
pub const fn max_encoded_len(payload_len: usize) -> usize {
    payload_len + (payload_len + 254) / 254 + 1
}

/// Lazy, random-access encoder: yields the byte-stuffed form of `data` one
/// byte at a time without ever materialising the whole frame. Does not
/// include the terminating zero; callers append it once the iterator is
/// exhausted.
pub struct Encoder<'a> {
    data: &'a [u8],
    run_len: u8,
    run_idx: u8,
    header_output: bool,
}

impl<'a> Encoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let run_len = Self::find_run_len(data);
        Encoder { data, run_len, run_idx: 0, header_output: false }
    }

    fn find_run_len(data: &[u8]) -> u8 {
        let mut n: u8 = 0;
        while (n as usize) < data.len() && n < MAX_RUN_LEN && data[n as usize] != 0 {
            n += 1;
        }
        n
    }

    fn at_end(&self) -> bool {
        self.run_idx as usize == self.data.len() && self.header_output
    }
}

impl<'a> Iterator for Encoder<'a> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.at_end() {
            return None;
        }

        let out = if !self.header_output {
            self.run_len + 1
        } else {
            self.data[self.run_idx as usize]
        };

        if !self.header_output {
            self.header_output = true;
        } else if self.run_idx < self.run_len {
            self.run_idx += 1;
        }

        if self.run_idx == self.run_len {
            if (self.run_idx as usize) < self.data.len() {
                if self.run_len < MAX_RUN_LEN {
                    // Skip the real zero byte the run boundary stands for.
                    self.run_idx += 1;
                }
                self.header_output = false;
            }
            self.data = &self.data[self.run_idx as usize..];
            self.run_idx = 0;
            self.run_len = Self::find_run_len(self.data);
        }

        Some(out)
    }
}

/// Result of feeding one byte to the [`Decoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fed {
    /// The byte was chunk metadata (a header); nothing to emit.
    Control,
    /// Emit this payload byte.
    Data(u8),
    /// This was the zero byte terminating the frame; the decoder has reset.
    FrameEnd,
}

/// Per-byte decoder state machine. Call [`Decoder::feed`] once per received
/// byte, in order, including the terminating zero.
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    run_remaining: u8,
    run_was_max: bool,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Decoder { run_remaining: 0, run_was_max: true }
    }

    /// Resets to the start-of-frame state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn feed(&mut self, byte: u8) -> Fed {
        if byte == 0 {
            self.reset();
            return Fed::FrameEnd;
        }
        if self.run_remaining == 0 {
            let emit_zero = self.start_run(byte);
            return if emit_zero { Fed::Data(0) } else { Fed::Control };
        }
        self.run_remaining -= 1;
        if self.run_remaining == 0 && self.run_was_max {
            // This byte is the continuation header reserved by the
            // previous max-length run, not data: reinterpret its value as
            // a new header and skip to the next run.
            self.start_run(byte);
            return Fed::Control;
        }
        Fed::Data(byte)
    }

    /// Starts a new run from a header byte. Returns whether the implied
    /// zero of the *previous* run must be emitted now (it is deferred to
    /// this point because whether a completed non-max run carried a real
    /// embedded zero can only be told apart from "that was the final
    /// chunk" once another header byte actually arrives).
    fn start_run(&mut self, byte: u8) -> bool {
        let prev_was_max = self.run_was_max;
        self.run_remaining = byte;
        self.run_was_max = byte == 255;
        if !self.run_was_max {
            self.run_remaining -= 1;
        }
        !prev_was_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::Vec as HVec;

    fn encode(data: &[u8]) -> HVec<u8, 512> {
        Encoder::new(data).collect()
    }

    fn decode(encoded: &[u8]) -> HVec<u8, 512> {
        let mut dec = Decoder::new();
        let mut out = HVec::new();
        for &b in encoded {
            if let Fed::Data(v) = dec.feed(b) {
                out.push(v).unwrap();
            }
        }
        out
    }

    #[test]
    fn vectors_encode() {
        assert_eq!(encode(&[]).as_slice(), &[0x01]);
        assert_eq!(encode(&[0x00]).as_slice(), &[0x01, 0x01]);
        assert_eq!(encode(&[0x11]).as_slice(), &[0x02, 0x11]);
        assert_eq!(
            encode(&[0x11, 0x22, 0x00, 0x33]).as_slice(),
            &[0x03, 0x11, 0x22, 0x02, 0x33]
        );

        let run: HVec<u8, 254> = (1..=254u16).map(|v| v as u8).collect();
        let mut expected: HVec<u8, 512> = HVec::new();
        expected.push(0xFF).unwrap();
        expected.extend_from_slice(&run).unwrap();
        assert_eq!(encode(&run).as_slice(), expected.as_slice());

        let run255: HVec<u8, 255> = (1..=255u16).map(|v| v as u8).collect();
        let mut expected2: HVec<u8, 512> = HVec::new();
        expected2.push(0xFF).unwrap();
        expected2.extend_from_slice(&run255[..254]).unwrap();
        expected2.push(0x02).unwrap();
        expected2.push(0xFF).unwrap();
        assert_eq!(encode(&run255).as_slice(), expected2.as_slice());
    }

    #[test]
    fn vectors_decode() {
        assert_eq!(decode(&[0x01]).as_slice(), &[] as &[u8]);
        assert_eq!(decode(&[0x01, 0x01]).as_slice(), &[0x00]);
        assert_eq!(decode(&[0x02, 0x11]).as_slice(), &[0x11]);
        assert_eq!(
            decode(&[0x03, 0x11, 0x22, 0x02, 0x33]).as_slice(),
            &[0x11, 0x22, 0x00, 0x33]
        );
    }

    #[test]
    fn round_trips_for_arbitrary_payloads() {
        let payloads: &[&[u8]] = &[
            &[],
            &[0],
            &[0, 0, 0],
            &[1, 2, 3, 4, 5],
            &[0xFF; 300],
            &[0; 300],
        ];
        for payload in payloads {
            let encoded = encode(payload);
            let decoded = decode(&encoded);
            assert_eq!(decoded.as_slice(), *payload, "payload {:?}", payload);
        }
    }

    #[test]
    fn feed_signals_frame_end_on_zero() {
        let mut dec = Decoder::new();
        assert_eq!(dec.feed(0x02), Fed::Control);
        assert_eq!(dec.feed(0x11), Fed::Data(0x11));
        assert_eq!(dec.feed(0x00), Fed::FrameEnd);
    }

    #[test]
    fn max_encoded_len_matches_worst_case_overhead() {
        assert_eq!(max_encoded_len(0), 1);
        assert_eq!(max_encoded_len(254), 254 + 1 + 1);
    }
}
