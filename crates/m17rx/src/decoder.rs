//! Frame decoding
//!
//! Takes the 368 soft bits of an assembled frame and produces typed
//! output frames. Every frame passes through the same front half,
//! derandomize then deinterleave, and a per-type back half that
//! depunctures and Viterbi-decodes the coded payload:
//!
//! ```txt
//! kind      depuncture      decoded        output
//! LSF       P1, 368 → 488   244 bits       30-byte LSF, CRC checked
//! STREAM    P2, 272 → 296   148 bits       18-byte stream payload
//! PACKET    P3, 368 → 420   210 bits       26-byte packet segment
//! BERT      P2, 368 → 402   201 bits       25-byte PRBS window
//! ```
//!
//! Stream frames begin with 96 LICH bits (four Golay codewords)
//! ahead of the coded payload. Until a valid LSF has been decoded,
//! the LICH data bits are harvested uncorrected and emitted as
//! their own frame; Golay decoding is reserved for future work.
//!
//! The decoder holds a little cross-frame state: whether a valid
//! LSF has been seen, and whether that LSF declared encapsulated
//! packet mode, which decides how packet frames are tagged.

mod convolution;
mod crc;
mod interleave;
mod randomize;
mod viterbi;

#[cfg(not(test))]
use log::debug;

#[cfg(test)]
use std::println as debug;

use arrayvec::ArrayVec;

pub use crc::{Crc16, LSF_CRC, PACKET_CRC, PACKET_CRC_RESIDUE};

pub(crate) use convolution::{puncture, ConvEncoder, PUNCTURE_LSF, PUNCTURE_PACKET, PUNCTURE_STREAM};
pub(crate) use interleave::Interleaver;
pub(crate) use randomize::Randomizer;

use crate::receiver::{FrameBits, FrameKind, FRAME_BITS};
use convolution::depuncture;
use viterbi::Viterbi;

// LICH bits at the head of every stream frame
const LICH_BITS: usize = 96;

/// One decoded M17 frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputFrame {
    /// Link setup frame, CRC verified
    Lsf([u8; 30]),

    /// Harvested link information channel chunk: five sub-LSF
    /// bytes and the segment counter byte
    Lich([u8; 6]),

    /// Stream payload: frame number and two Codec2 frames
    Stream([u8; 18]),

    /// Packet segment for AX.25 display
    BasicPacket([u8; 26]),

    /// Packet segment for raw payload output
    FullPacket([u8; 26]),

    /// BERT payload: 197 PRBS bits, MSB-aligned
    Bert([u8; 25]),
}

impl OutputFrame {
    /// Short tag for logging
    pub fn tag(&self) -> &'static str {
        match self {
            OutputFrame::Lsf(_) => "LSF",
            OutputFrame::Lich(_) => "LICH",
            OutputFrame::Stream(_) => "STREAM",
            OutputFrame::BasicPacket(_) => "BASIC_PACKET",
            OutputFrame::FullPacket(_) => "FULL_PACKET",
            OutputFrame::Bert(_) => "BERT",
        }
    }
}

/// Frames produced from one input frame
pub type DecodedFrames = ArrayVec<(OutputFrame, u32), 2>;

/// Decodes assembled frames into [`OutputFrame`]s
#[derive(Clone, Debug)]
pub struct FrameDecoder {
    randomizer: Randomizer,
    interleaver: Interleaver,
    viterbi: Viterbi,
    have_lsf: bool,
    encapsulated: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            randomizer: Randomizer::new(),
            interleaver: Interleaver::new(),
            viterbi: Viterbi::new(),
            have_lsf: false,
            encapsulated: false,
        }
    }

    /// Forget the link state
    ///
    /// Called when the carrier is lost. The FEC tables carry no
    /// history; only the LSF knowledge is cleared.
    pub fn reset(&mut self) {
        self.have_lsf = false;
        self.encapsulated = false;
    }

    /// Decode one frame
    pub fn decode(&mut self, kind: FrameKind, soft: &FrameBits) -> DecodedFrames {
        let mut work = *soft;
        self.randomizer.derandomize(&mut work);

        let mut frame = [0.0f32; FRAME_BITS];
        self.interleaver.deinterleave(&work, &mut frame);

        match kind {
            FrameKind::Lsf => self.decode_lsf(&frame),
            FrameKind::Stream => self.decode_stream(&frame),
            FrameKind::Packet => self.decode_packet(&frame),
            FrameKind::Bert => self.decode_bert(&frame),
        }
    }

    fn decode_lsf(&mut self, frame: &[f32; FRAME_BITS]) -> DecodedFrames {
        let (expanded, neutral) = depuncture::<488>(frame, &PUNCTURE_LSF);
        let mut bits = [0u8; 244];
        let cost = self.viterbi.decode(&expanded, &mut bits, neutral).round() as u32;

        let mut bytes = [0u8; 30];
        pack_bits(&bits[..240], &mut bytes);

        let computed = LSF_CRC.checksum(&bytes[..28]);
        let received = u16::from_be_bytes([bytes[28], bytes[29]]);

        let mut out = DecodedFrames::new();
        if computed != received {
            debug!(
                "LSF rejected: crc {:04x} != {:04x}, cost {}",
                computed, received, cost
            );
            return out;
        }

        self.have_lsf = true;
        let type_word = u16::from_be_bytes([bytes[12], bytes[13]]);
        self.encapsulated = type_word & 1 == 0 && (type_word >> 1) & 0x3 == 2;

        out.push((OutputFrame::Lsf(bytes), cost));
        out
    }

    fn decode_stream(&mut self, frame: &[f32; FRAME_BITS]) -> DecodedFrames {
        let payload: &[f32] = &frame[LICH_BITS..];
        let (expanded, neutral) = depuncture::<296>(payload, &PUNCTURE_STREAM);
        let mut bits = [0u8; 148];
        let cost = self.viterbi.decode(&expanded, &mut bits, neutral).round() as u32;

        let mut bytes = [0u8; 18];
        pack_bits(&bits[..144], &mut bytes);

        let mut out = DecodedFrames::new();
        if !self.have_lsf {
            out.push((OutputFrame::Lich(harvest_lich(&frame[..LICH_BITS])), cost));
        }
        out.push((OutputFrame::Stream(bytes), cost));
        out
    }

    fn decode_packet(&mut self, frame: &[f32; FRAME_BITS]) -> DecodedFrames {
        let (expanded, neutral) = depuncture::<420>(frame, &PUNCTURE_PACKET);
        let mut bits = [0u8; 210];
        let cost = self.viterbi.decode(&expanded, &mut bits, neutral).round() as u32;

        let mut bytes = [0u8; 26];
        pack_bits(&bits[..206], &mut bytes);

        let mut out = DecodedFrames::new();
        let frame = if self.encapsulated {
            OutputFrame::FullPacket(bytes)
        } else {
            OutputFrame::BasicPacket(bytes)
        };
        out.push((frame, cost));
        out
    }

    fn decode_bert(&mut self, frame: &[f32; FRAME_BITS]) -> DecodedFrames {
        let (expanded, neutral) = depuncture::<402>(frame, &PUNCTURE_STREAM);
        let mut bits = [0u8; 201];
        let cost = self.viterbi.decode(&expanded, &mut bits, neutral).round() as u32;

        let mut bytes = [0u8; 25];
        pack_bits(&bits[..197], &mut bytes);

        let mut out = DecodedFrames::new();
        out.push((OutputFrame::Bert(bytes), cost));
        out
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

// Pack bits into bytes, earliest bit in the most significant
// position. A partial final byte is left-aligned.
fn pack_bits(bits: &[u8], out: &mut [u8]) {
    for byte in out.iter_mut() {
        *byte = 0;
    }
    for (i, &b) in bits.iter().enumerate() {
        out[i / 8] |= (b & 1) << (7 - i % 8);
    }
}

// Harvest the LICH data bits without Golay correction
//
// Each of the four 24-bit codewords carries its 12 data bits first.
fn harvest_lich(soft: &[f32]) -> [u8; 6] {
    let mut data = [0u8; 48];
    for word in 0..4 {
        for bit in 0..12 {
            data[word * 12 + bit] = (soft[word * 24 + bit] >= 0.5) as u8;
        }
    }
    let mut out = [0u8; 6];
    pack_bits(&data, &mut out);
    out
}


#[cfg(test)]
mod tests {
    use super::testgen::*;
    use super::*;

    #[test]
    fn test_pack_bits() {
        let mut out = [0u8; 2];
        pack_bits(&[1, 0, 1, 0, 1, 0, 1, 0, 1, 1], &mut out);
        assert_eq!(out, [0xAA, 0xC0]);
    }

    #[test]
    fn test_decodes_clean_lsf() {
        let lsf = test_lsf_bytes(0x0005);
        let soft = encode_frame(FrameKind::Lsf, &bytes_to_bits(&lsf, 240), &[]);

        let mut dec = FrameDecoder::new();
        assert!(!dec.have_lsf);
        let frames = dec.decode(FrameKind::Lsf, &soft);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], (OutputFrame::Lsf(lsf), 0));
        assert!(dec.have_lsf);
        assert!(!dec.encapsulated);
    }

    #[test]
    fn test_rejects_corrupt_lsf() {
        let mut lsf = test_lsf_bytes(0x0005);
        lsf[5] ^= 0x01; // break the CRC
        let soft = encode_frame(FrameKind::Lsf, &bytes_to_bits(&lsf, 240), &[]);

        let mut dec = FrameDecoder::new();
        let frames = dec.decode(FrameKind::Lsf, &soft);
        assert!(frames.is_empty());
        assert!(!dec.have_lsf);
    }

    #[test]
    fn test_stream_emits_lich_until_lsf() {
        let payload = [0x40u8; 18];
        let payload_bits = bytes_to_bits(&payload, 144);

        // lich chunk: five bytes and a counter, golay data bits only
        let chunk = [0x11u8, 0x22, 0x33, 0x44, 0x55, 0x60];
        let chunk_bits = bytes_to_bits(&chunk, 48);
        let mut lich = [0u8; LICH_BITS];
        for word in 0..4 {
            for bit in 0..12 {
                lich[word * 24 + bit] = chunk_bits[word * 12 + bit];
            }
        }

        let soft = encode_frame(FrameKind::Stream, &payload_bits, &lich);

        let mut dec = FrameDecoder::new();
        let frames = dec.decode(FrameKind::Stream, &soft);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], (OutputFrame::Lich(chunk), 0));
        assert_eq!(frames[1], (OutputFrame::Stream(payload), 0));

        // after a valid LSF, no more lich frames
        let lsf = test_lsf_bytes(0x0005);
        let lsf_soft = encode_frame(FrameKind::Lsf, &bytes_to_bits(&lsf, 240), &[]);
        dec.decode(FrameKind::Lsf, &lsf_soft);

        let frames = dec.decode(FrameKind::Stream, &soft);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], (OutputFrame::Stream(payload), 0));
    }

    #[test]
    fn test_packet_kind_follows_lsf_type() {
        let mut segment = [0u8; 26];
        for (i, b) in segment.iter_mut().enumerate() {
            *b = i as u8;
        }
        segment[25] = 0x80 | (10 << 2);
        let bits = bytes_to_bits(&segment, 206);
        let soft = encode_frame(FrameKind::Packet, &bits, &[]);

        // no LSF: basic packet
        let mut dec = FrameDecoder::new();
        let frames = dec.decode(FrameKind::Packet, &soft);
        assert_eq!(frames[0], (OutputFrame::BasicPacket(segment), 0));

        // encapsulated LSF type: packet, subtype 2
        let lsf = test_lsf_bytes(0x0004);
        let lsf_soft = encode_frame(FrameKind::Lsf, &bytes_to_bits(&lsf, 240), &[]);
        dec.decode(FrameKind::Lsf, &lsf_soft);
        assert!(dec.encapsulated);

        let frames = dec.decode(FrameKind::Packet, &soft);
        assert_eq!(frames[0], (OutputFrame::FullPacket(segment), 0));

        // reset drops the link state
        dec.reset();
        let frames = dec.decode(FrameKind::Packet, &soft);
        assert_eq!(frames[0], (OutputFrame::BasicPacket(segment), 0));
    }

    #[test]
    fn test_bert_roundtrip() {
        let mut payload = [0u8; 25];
        for (i, b) in payload.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(37);
        }
        payload[24] &= 0xF8; // only five bits of the last byte travel

        let bits = bytes_to_bits(&payload, 197);
        let soft = encode_frame(FrameKind::Bert, &bits, &[]);

        let mut dec = FrameDecoder::new();
        let frames = dec.decode(FrameKind::Bert, &soft);
        assert_eq!(frames.len(), 1);

        // the truncated survivor may cost at most one point
        let (frame, cost) = &frames[0];
        assert_eq!(*frame, OutputFrame::Bert(payload));
        assert!(*cost <= 1, "cost {}", cost);
    }
}
