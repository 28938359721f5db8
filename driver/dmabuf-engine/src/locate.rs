//! The offset translator: logical byte ranges to per-segment slices.

use crate::segment::Segment;

/// One piece of a logical byte range, confined to a single segment.
pub(crate) struct SegmentSlice<'a> {
    pub segment: &'a Segment,
    /// Offset of the piece within its segment.
    pub offset: u64,
    /// Length of the piece; never zero, never crossing the segment end.
    pub len: u64,
}

/// Resolve the logical range `[offset, offset + len)` against the segment
/// list, yielding one [`SegmentSlice`] per touched segment in insertion
/// order.
///
/// Pure and restartable; every call walks from the first segment. The total
/// yielded length is `min(len, total - offset)` (zero when `offset` is at or
/// past the end).
pub(crate) fn locate(segments: &[Segment], offset: u64, len: u64) -> SliceWalk<'_> {
    SliceWalk {
        segments: segments.iter(),
        skip: offset,
        remaining: len,
    }
}

pub(crate) struct SliceWalk<'a> {
    segments: core::slice::Iter<'a, Segment>,
    skip: u64,
    remaining: u64,
}

impl<'a> Iterator for SliceWalk<'a> {
    type Item = SegmentSlice<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.remaining == 0 {
                return None;
            }
            let segment = self.segments.next()?;
            if self.skip >= segment.size() {
                self.skip -= segment.size();
                continue;
            }
            let offset = self.skip;
            self.skip = 0;
            let len = (segment.size() - offset).min(self.remaining);
            self.remaining -= len;
            return Some(SegmentSlice {
                segment,
                offset,
                len,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmabuf_addresses::DeviceAddress;

    fn segments(sizes: &[u64]) -> Vec<Segment> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| Segment::for_test(size, DeviceAddress::new(i as u64 * 0x10_0000)))
            .collect()
    }

    fn spans(segments: &[Segment], offset: u64, len: u64) -> Vec<(usize, u64, u64)> {
        locate(segments, offset, len)
            .map(|s| {
                let index = segments
                    .iter()
                    .position(|seg| core::ptr::eq(seg, s.segment))
                    .unwrap();
                (index, s.offset, s.len)
            })
            .collect()
    }

    #[test]
    fn empty_request_yields_nothing() {
        let segs = segments(&[0x1000, 0x1000]);
        assert!(spans(&segs, 0, 0).is_empty());
    }

    #[test]
    fn offset_past_end_yields_nothing() {
        let segs = segments(&[0x1000, 0x1000]);
        assert!(spans(&segs, 0x2000, 16).is_empty());
        assert!(spans(&segs, 0x9000, 16).is_empty());
    }

    #[test]
    fn single_segment_interior() {
        let segs = segments(&[0x4000]);
        assert_eq!(spans(&segs, 0x100, 0x200), vec![(0, 0x100, 0x200)]);
    }

    #[test]
    fn crosses_one_boundary() {
        let segs = segments(&[0x1000, 0x1000]);
        assert_eq!(
            spans(&segs, 0xF00, 0x200),
            vec![(0, 0xF00, 0x100), (1, 0, 0x100)]
        );
    }

    #[test]
    fn crosses_many_boundaries_and_clamps() {
        let segs = segments(&[0x1000, 0x2000, 0x1000]);
        // Starts inside the first segment, swallows the second whole,
        // and is clamped by the end of the third.
        assert_eq!(
            spans(&segs, 0x800, 0x10000),
            vec![(0, 0x800, 0x800), (1, 0, 0x2000), (2, 0, 0x1000)]
        );
    }

    #[test]
    fn skips_whole_leading_segments() {
        let segs = segments(&[0x1000, 0x2000, 0x1000]);
        assert_eq!(spans(&segs, 0x3000, 0x800), vec![(2, 0, 0x800)]);
    }

    #[test]
    fn yielded_lengths_sum_to_clamped_request() {
        let segs = segments(&[0x1000, 0x3000, 0x2000]);
        let total: u64 = 0x6000;
        for &(offset, len) in &[(0u64, 0x6000u64), (0x500, 0x100), (0x5F00, 0x400), (0, 0x9000)]
        {
            let sum: u64 = locate(&segs, offset, len).map(|s| s.len).sum();
            assert_eq!(sum, len.min(total - offset.min(total)));
            assert!(locate(&segs, offset, len).all(|s| s.len > 0));
        }
    }

    #[test]
    fn restartable_and_independent() {
        let segs = segments(&[0x1000, 0x1000]);
        let first: Vec<_> = locate(&segs, 0x800, 0x1000).map(|s| (s.offset, s.len)).collect();
        let second: Vec<_> = locate(&segs, 0x800, 0x1000).map(|s| (s.offset, s.len)).collect();
        assert_eq!(first, second);
    }
}
