//! Byte-stream reassembly of fixed-size frames.

use bytes::BytesMut;

/// Cuts a byte stream into whole frames of one fixed size.
///
/// A read can end anywhere inside a frame; the tail is kept until the next
/// read completes it. Frames are handed out in arrival order.
#[derive(Debug)]
pub struct StreamReassembler {
    packet_size: usize,
    partial: BytesMut,
}

impl StreamReassembler {
    #[must_use]
    pub fn new(packet_size: usize) -> Self {
        Self {
            packet_size: packet_size.max(1),
            partial: BytesMut::with_capacity(packet_size),
        }
    }

    /// Feed received bytes, calling `on_packet` once per completed frame.
    ///
    /// Returns the number of frames completed.
    pub fn push<F>(&mut self, mut data: &[u8], mut on_packet: F) -> usize
    where
        F: FnMut(&[u8]),
    {
        let mut completed = 0;

        if !self.partial.is_empty() {
            let need = self.packet_size - self.partial.len();
            let take = need.min(data.len());
            self.partial.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.partial.len() == self.packet_size {
                on_packet(&self.partial);
                self.partial.clear();
                completed += 1;
            }
        }

        while data.len() >= self.packet_size {
            let (packet, rest) = data.split_at(self.packet_size);
            on_packet(packet);
            data = rest;
            completed += 1;
        }

        if !data.is_empty() {
            self.partial.extend_from_slice(data);
        }
        completed
    }

    /// Whether a fragment shorter than one frame is buffered.
    #[inline]
    #[must_use]
    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }

    #[must_use]
    pub fn partial_len(&self) -> usize {
        self.partial.len()
    }

    pub fn reset(&mut self) {
        self.partial.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: usize, size: usize) -> Vec<u8> {
        (0..n)
            .flat_map(|i| std::iter::repeat(i as u8).take(size))
            .collect()
    }

    #[test]
    fn test_whole_frames() {
        let mut r = StreamReassembler::new(4);
        let mut seen = Vec::new();
        let n = r.push(&frames(3, 4), |p| seen.push(p.to_vec()));
        assert_eq!(n, 3);
        assert_eq!(seen, vec![vec![0; 4], vec![1; 4], vec![2; 4]]);
        assert!(!r.has_partial());
    }

    #[test]
    fn test_fragment_across_reads() {
        let data = frames(2, 5);
        let mut r = StreamReassembler::new(5);
        let mut seen = Vec::new();

        assert_eq!(r.push(&data[..3], |p| seen.push(p.to_vec())), 0);
        assert_eq!(r.partial_len(), 3);
        assert_eq!(r.push(&data[3..7], |p| seen.push(p.to_vec())), 1);
        assert_eq!(r.partial_len(), 2);
        assert_eq!(r.push(&data[7..], |p| seen.push(p.to_vec())), 1);

        assert_eq!(seen, vec![vec![0; 5], vec![1; 5]]);
        assert!(!r.has_partial());
    }

    #[test]
    fn test_byte_at_a_time() {
        let data = frames(3, 13);
        let mut r = StreamReassembler::new(13);
        let mut count = 0;
        for b in &data {
            count += r.push(std::slice::from_ref(b), |_| {});
        }
        assert_eq!(count, 3);
    }

    #[test]
    fn test_reset_discards_fragment() {
        let mut r = StreamReassembler::new(8);
        r.push(&[1, 2, 3], |_| {});
        assert!(r.has_partial());
        r.reset();
        assert!(!r.has_partial());
    }
}
