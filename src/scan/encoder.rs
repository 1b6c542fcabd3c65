//! Run-length encoding of per-element match outcomes.
//!
//! Matches are spatially correlated in practice, so scan results are emitted
//! as maximal spans of consecutive matching elements instead of a
//! per-element bitmap; follow-up scan memory stays proportional to match
//! count, not region size. One encoder instance is the shared bookkeeping
//! behind every scanner variant and the pointer search kernels.

use crate::snapshot::ElementRange;

/// Streaming encoder for one element range. Elements are pushed in address
/// order at a fixed byte stride; an open run closes on the first mismatch or
/// at range end, emitting one [`ElementRange`].
#[derive(Debug)]
pub struct RunLengthEncoder {
    element_size: usize,
    stride: usize,
    /// Logical byte length of the scanned range. Spans reaching past it were
    /// produced from vector over-read of adjacent memory and are discarded
    /// whole, never truncated.
    valid_length: usize,
    read_offset: usize,
    run_start: usize,
    run_elements: usize,
    run_open: bool,
    ranges: Vec<ElementRange>,
}

impl RunLengthEncoder {
    pub fn new(element_size: usize, stride: usize, valid_length: usize) -> Self {
        Self {
            element_size,
            stride,
            valid_length,
            read_offset: 0,
            run_start: 0,
            run_elements: 0,
            run_open: false,
            ranges: Vec::new(),
        }
    }

    /// Rebind the encoder for reuse on another range (pooled contexts).
    pub fn reset(&mut self, element_size: usize, stride: usize, valid_length: usize) {
        self.element_size = element_size;
        self.stride = stride;
        self.valid_length = valid_length;
        self.read_offset = 0;
        self.run_start = 0;
        self.run_elements = 0;
        self.run_open = false;
        self.ranges.clear();
    }

    #[inline]
    pub fn read_offset(&self) -> usize {
        self.read_offset
    }

    /// Record a matching element and advance one stride.
    ///
    /// A lane whose element bytes extend past the logical range end was
    /// evaluated against over-read bytes of adjacent memory; it is never a
    /// candidate and counts as a miss, closing any open run at the boundary.
    #[inline]
    pub fn encode_match(&mut self) {
        if self.read_offset + self.element_size > self.valid_length {
            self.encode_miss();
            return;
        }
        if !self.run_open {
            self.run_start = self.read_offset;
            self.run_elements = 0;
            self.run_open = true;
        }
        self.run_elements += 1;
        self.read_offset += self.stride;
    }

    /// Record a mismatching element and advance one stride.
    #[inline]
    pub fn encode_miss(&mut self) {
        self.close_current_run();
        self.read_offset += self.stride;
    }

    /// Record `count` consecutive mismatches.
    #[inline]
    pub fn encode_misses(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.close_current_run();
        self.read_offset += count * self.stride;
    }

    /// Jump the cursor forward to an element start offset, closing any open
    /// run. Used by anchor-accelerated scans that skip non-candidates.
    #[inline]
    pub fn skip_to(&mut self, byte_offset: usize) {
        debug_assert!(byte_offset >= self.read_offset);
        debug_assert_eq!((byte_offset - self.read_offset) % self.stride, 0);
        if byte_offset > self.read_offset {
            self.close_current_run();
            self.read_offset = byte_offset;
        }
    }

    /// Feed the low `lanes` bits of a vector compare mask, bit 0 first.
    #[inline]
    pub fn encode_mask(&mut self, mask: u64, lanes: usize) {
        debug_assert!(lanes <= 64);
        for bit in 0..lanes {
            if mask & (1u64 << bit) != 0 {
                self.encode_match();
            } else {
                self.encode_miss();
            }
        }
    }

    /// Close and emit the open run, if any. Runs can only contain in-bounds
    /// elements, so the emitted span always ends at or before the logical
    /// range end; a span that does not is dropped entirely rather than
    /// truncated, as its tail was built from over-read bytes.
    fn close_current_run(&mut self) {
        if !self.run_open {
            return;
        }
        self.run_open = false;
        let length = (self.run_elements - 1) * self.stride + self.element_size;
        if self.run_start + length <= self.valid_length {
            self.ranges.push(ElementRange::new(self.run_start, length));
        }
    }

    /// Finish encoding: close the trailing run with the over-read check and
    /// return the emitted ranges.
    pub fn finish(&mut self) -> Vec<ElementRange> {
        self.close_current_run();
        std::mem::take(&mut self.ranges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(outcomes: &[bool], element_size: usize, stride: usize, valid_length: usize) -> Vec<ElementRange> {
        let mut encoder = RunLengthEncoder::new(element_size, stride, valid_length);
        for &matched in outcomes {
            if matched {
                encoder.encode_match();
            } else {
                encoder.encode_miss();
            }
        }
        encoder.finish()
    }

    #[test]
    fn maximal_runs_are_emitted() {
        // match match miss match miss miss match match match
        let out = encode(
            &[true, true, false, true, false, false, true, true, true],
            4,
            4,
            36,
        );
        assert_eq!(
            out,
            vec![
                ElementRange::new(0, 8),
                ElementRange::new(12, 4),
                ElementRange::new(24, 12),
            ]
        );
    }

    #[test]
    fn staggered_stride_overlapping_span_length() {
        // Two consecutive matches at stride 1 with 4-byte elements cover
        // 5 bytes.
        let out = encode(&[true, true, false], 4, 1, 16);
        assert_eq!(out, vec![ElementRange::new(0, 5)]);
    }

    #[test]
    fn sparse_stride_span_length() {
        let out = encode(&[true, true], 4, 8, 16);
        assert_eq!(out, vec![ElementRange::new(0, 12)]);
    }

    #[test]
    fn overread_lanes_never_become_matches() {
        // Range logically holds 3 elements (12 bytes); the vector engine
        // evaluated a 4th lane from over-read bytes and it matched. The run
        // closes at the boundary with only in-bounds elements.
        let out = encode(&[true, true, true, true], 4, 4, 12);
        assert_eq!(out, vec![ElementRange::new(0, 12)]);

        // A match wholly inside over-read territory emits nothing.
        let out = encode(&[true, false, false, true], 4, 4, 12);
        assert_eq!(out, vec![ElementRange::new(0, 4)]);

        // Staggered: an element straddling the boundary (starts in bounds,
        // bytes run past it) is not a candidate either.
        let out = encode(&[true, true, true, true, true], 4, 1, 6);
        assert_eq!(out, vec![ElementRange::new(0, 6)]);
    }

    #[test]
    fn skip_to_closes_open_run() {
        let mut encoder = RunLengthEncoder::new(4, 4, 64);
        encoder.encode_match();
        encoder.skip_to(32);
        encoder.encode_match();
        let out = encoder.finish();
        assert_eq!(out, vec![ElementRange::new(0, 4), ElementRange::new(32, 4)]);
    }

    #[test]
    fn mask_feed_matches_scalar_feed() {
        let mut a = RunLengthEncoder::new(4, 4, 256);
        a.encode_mask(0b1100_1101, 8);
        let mut b = RunLengthEncoder::new(4, 4, 256);
        for &m in &[true, false, true, true, false, false, true, true] {
            if m {
                b.encode_match();
            } else {
                b.encode_miss();
            }
        }
        assert_eq!(a.finish(), b.finish());
    }
}
