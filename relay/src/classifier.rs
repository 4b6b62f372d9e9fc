//! # Byte-Stream Classifier
//!
//! Consumes the tapped serial stream one byte at a time and sorts it into
//! complete, checksum-valid frames and unclassifiable bytes. The classifier
//! never delays the relay path: it only observes bytes the engine has
//! already forwarded, and a call with no data is simply never made, so
//! partial-frame state persists across polls without wedging.
//!
//! Resynchronization follows the usual incremental-framer approach: while
//! the buffered bytes stop being a viable prefix of any frame the grammar
//! knows, leading bytes are shed one at a time and reported as unknown, and
//! scanning continues from the next byte.

use heapless::Vec;

use crate::protocol::{BmsGrammar, FrameGrammar, Packet};
use crate::MAX_FRAME_LEN;

/// Bytes rejected by the classifier in arrival order.
///
/// Bounded by the longest frame the grammar defines; a single feed can
/// reject at most one full frame's worth of bytes.
pub type RejectedBytes = Vec<u8, MAX_FRAME_LEN>;

/// Outcome of feeding one byte to the classifier
#[derive(Debug)]
pub enum Classified<'a> {
    /// Byte extended a plausible partial frame
    Pending,
    /// Bytes that cannot belong to any frame, in arrival order
    Unknown(RejectedBytes),
    /// A complete checksum-valid frame; the span is valid until the next feed
    Frame(Packet<'a>),
    /// A well-framed sequence whose checksum failed; surfaced as unknown data
    ChecksumMismatch(RejectedBytes),
}

/// Incremental frame recognizer over a pluggable grammar
pub struct Classifier<G: FrameGrammar = BmsGrammar> {
    grammar: G,
    buf: Vec<u8, MAX_FRAME_LEN>,
    // Invariant between feeds: unless frame_ready, buf is a strict viable
    // prefix of some frame, so the next push cannot overflow.
    frame_ready: bool,
}

impl Classifier<BmsGrammar> {
    pub fn new() -> Self {
        Self::with_grammar(BmsGrammar)
    }
}

impl Default for Classifier<BmsGrammar> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: FrameGrammar> Classifier<G> {
    pub fn with_grammar(grammar: G) -> Self {
        Self {
            grammar,
            buf: Vec::new(),
            frame_ready: false,
        }
    }

    /// Feed one byte from the line.
    ///
    /// Emits every rejected byte exactly once, in arrival order, and every
    /// complete valid frame exactly once.
    pub fn feed(&mut self, byte: u8) -> Classified<'_> {
        if self.frame_ready {
            self.buf.clear();
            self.frame_ready = false;
        }

        let mut rejected = RejectedBytes::new();

        if self.buf.push(byte).is_err() {
            // Unreachable while the prefix invariant holds; shed everything
            // and restart scanning at this byte.
            for b in &self.buf {
                let _ = rejected.push(*b);
            }
            self.buf.clear();
            let _ = self.buf.push(byte);
        }

        while !self.is_viable_prefix() {
            let shed = self.buf.remove(0);
            let _ = rejected.push(shed);
        }

        if let Some(expected) = self.expected_len() {
            if self.buf.len() == expected {
                if self.grammar.checksum_ok(&self.buf) {
                    self.frame_ready = true;
                    return Classified::Frame(Packet::new(&self.buf, true));
                }
                for b in &self.buf {
                    let _ = rejected.push(*b);
                }
                self.buf.clear();
                return Classified::ChecksumMismatch(rejected);
            }
        }

        if rejected.is_empty() {
            Classified::Pending
        } else {
            Classified::Unknown(rejected)
        }
    }

    /// Bytes currently held as a partial frame
    pub fn pending_len(&self) -> usize {
        if self.frame_ready {
            0
        } else {
            self.buf.len()
        }
    }

    fn is_viable_prefix(&self) -> bool {
        let preamble = self.grammar.preamble();
        let n = self.buf.len().min(preamble.len());
        if self.buf[..n] != preamble[..n] {
            return false;
        }
        if self.buf.len() <= preamble.len() {
            return true;
        }
        match self.grammar.frame_len(self.buf[preamble.len()]) {
            Some(expected) => self.buf.len() <= expected,
            None => false,
        }
    }

    fn expected_len(&self) -> Option<usize> {
        let preamble_len = self.grammar.preamble().len();
        if self.buf.len() > preamble_len {
            self.grammar.frame_len(self.buf[preamble_len])
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_frame, FrameType};

    fn soc_frame() -> std::vec::Vec<u8> {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let len = build_frame(FrameType::StateOfCharge, &[80], &mut buf).unwrap();
        buf[..len].to_vec()
    }

    #[test]
    fn test_garbage_reported_once_in_order() {
        let mut classifier = Classifier::new();
        let garbage = [0x01u8, 0x02, 0x7F, 0x00];
        let mut reported = std::vec::Vec::new();
        for b in garbage {
            match classifier.feed(b) {
                Classified::Unknown(run) => reported.extend_from_slice(&run),
                other => panic!("expected unknown, got {other:?}"),
            }
        }
        assert_eq!(reported, garbage);
    }

    #[test]
    fn test_valid_frame_emitted_once() {
        let mut classifier = Classifier::new();
        let frame = soc_frame();
        for &b in &frame[..frame.len() - 1] {
            assert!(matches!(classifier.feed(b), Classified::Pending));
        }
        match classifier.feed(*frame.last().unwrap()) {
            Classified::Frame(packet) => {
                assert_eq!(packet.frame_type(), Some(FrameType::StateOfCharge));
                assert_eq!(packet.payload(), &[80]);
                assert_eq!(packet.bytes(), &frame[..]);
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_checksum_mismatch_surfaces_whole_frame() {
        let mut classifier = Classifier::new();
        let mut frame = soc_frame();
        *frame.last_mut().unwrap() ^= 0x01;

        let mut surfaced = std::vec::Vec::new();
        let mut mismatches = 0;
        for &b in &frame {
            match classifier.feed(b) {
                Classified::Pending => {}
                Classified::ChecksumMismatch(run) => {
                    mismatches += 1;
                    surfaced.extend_from_slice(&run);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(mismatches, 1);
        assert_eq!(surfaced, frame);
    }

    #[test]
    fn test_resync_after_duplicated_preamble_byte() {
        let mut classifier = Classifier::new();
        let frame = soc_frame();

        // A stray 0xFF in front of a real frame: the stray is shed once the
        // second 0xFF proves it cannot open a frame.
        let mut unknown = std::vec::Vec::new();
        let mut frames = 0;
        for &b in core::iter::once(&0xFFu8).chain(frame.iter()) {
            match classifier.feed(b) {
                Classified::Pending => {}
                Classified::Unknown(run) => unknown.extend_from_slice(&run),
                Classified::Frame(_) => frames += 1,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(unknown, [0xFF]);
        assert_eq!(frames, 1);
    }

    #[test]
    fn test_unknown_type_flushes_header() {
        let mut classifier = Classifier::new();
        let stream = [0xFFu8, 0x55, 0xAA, 0x99];
        let mut unknown = std::vec::Vec::new();
        for &b in &stream {
            if let Classified::Unknown(run) = classifier.feed(b) {
                unknown.extend_from_slice(&run);
            }
        }
        assert_eq!(unknown, stream);
        assert_eq!(classifier.pending_len(), 0);
    }

    #[test]
    fn test_partial_frame_survives_idle_gaps() {
        let mut classifier = Classifier::new();
        let frame = soc_frame();
        let (head, tail) = frame.split_at(3);

        for &b in head {
            assert!(matches!(classifier.feed(b), Classified::Pending));
        }
        assert_eq!(classifier.pending_len(), 3);

        // No bytes for a while: no feed calls happen, state is untouched.
        let mut frames = 0;
        for &b in tail {
            if let Classified::Frame(_) = classifier.feed(b) {
                frames += 1;
            }
        }
        assert_eq!(frames, 1);
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut classifier = Classifier::new();
        let frame = soc_frame();
        let mut frames = 0;
        for _ in 0..3 {
            for &b in &frame {
                match classifier.feed(b) {
                    Classified::Frame(_) => frames += 1,
                    Classified::Pending => {}
                    other => panic!("unexpected {other:?}"),
                }
            }
        }
        assert_eq!(frames, 3);
    }
}
