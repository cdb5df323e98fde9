//! Demodulator session
//!
//! [`DemodSession`] owns the whole receive side for the life of one
//! input stream: the DSP chain, the frame decoder, and the
//! dispatcher state that lives *across* frames (the packet
//! accumulator, the PRBS-9 validator, knowledge of the last link
//! setup frame). The caller supplies two capabilities at
//! construction and they are never swapped:
//!
//! * a [`SpeechDecoder`], the Codec2 contract: 8 payload bytes in,
//!   160 PCM samples out;
//! * a [`FrameSink`], which receives decoded audio, packet payloads
//!   and telemetry.
//!
//! Both are plain generics, so frame dispatch involves no dynamic
//! calls. All signal-level trouble is absorbed here or below;
//! the only errors that escape [`DemodSession::process`] are sink
//! I/O failures.

use std::io;

#[cfg(not(test))]
use log::{info, warn};

#[cfg(test)]
use std::{println as info, println as warn};

use crate::builder::DemodConfig;
use crate::decoder::{OutputFrame, PACKET_CRC, PACKET_CRC_RESIDUE};
use crate::lsf::{LinkSetupFrame, Mode, PacketType};
use crate::prbs::PrbsValidator;
use crate::receiver::{BerReport, Diagnostics, M17Receiver, ReceiverEvent, SAMPLE_SCALE};

// multi-segment packets may not exceed 32 full segments plus the
// encapsulated LSF seed
const MAX_PACKET_BYTES: usize = 32 * 25 + 30;

/// Speech decoder contract
///
/// Implementations wrap a Codec2 handle in 3200 bit/s mode. The
/// handle is created before the session and released by drop when
/// the session ends, on every exit path.
pub trait SpeechDecoder {
    /// Decode one 8-byte Codec2 frame into 160 PCM samples
    fn decode(&mut self, frame: &[u8]) -> [i16; 160];
}

/// Receives everything the session produces
pub trait FrameSink {
    /// One block of decoded or blanked stream audio
    fn audio(&mut self, pcm: &[i16; 160]) -> io::Result<()>;

    /// Raw payload of a completed full packet
    fn packet(&mut self, payload: &[u8]) -> io::Result<()>;

    /// CRC-verified payload of a completed basic packet, for AX.25
    /// display
    fn basic_packet(&mut self, payload: &[u8]);

    /// Modem telemetry
    fn diagnostics(&mut self, diag: &Diagnostics);
}

/// A complete M17 demodulator session
#[derive(Debug)]
pub struct DemodSession<C, S>
where
    C: SpeechDecoder,
    S: FrameSink,
{
    receiver: M17Receiver,
    speech: C,
    sink: S,

    current_packet: Vec<u8>,
    packet_frame_counter: usize,
    prbs: PrbsValidator,

    display_lsf: bool,
    noise_blanker: bool,
    good_cost: u32,
    blank_cost: u32,
}

impl<C, S> DemodSession<C, S>
where
    C: SpeechDecoder,
    S: FrameSink,
{
    /// Create a session from its configuration and capabilities
    pub fn new(config: &DemodConfig, speech: C, sink: S) -> Self {
        Self {
            receiver: M17Receiver::new(config),
            speech,
            sink,
            current_packet: Vec::with_capacity(MAX_PACKET_BYTES),
            packet_frame_counter: 0,
            prbs: PrbsValidator::new(),
            display_lsf: config.display_lsf(),
            noise_blanker: config.noise_blanker(),
            good_cost: config.good_cost(),
            blank_cost: config.blank_cost(),
        }
    }

    /// Process one input sample
    ///
    /// Drives the pipeline to quiescence: any frames completed by
    /// this sample are dispatched before the call returns.
    pub fn process(&mut self, sample: i16) -> io::Result<()> {
        self.process_normalized(sample as f32 / SAMPLE_SCALE)
    }

    /// Process one pre-normalized sample
    pub fn process_normalized(&mut self, sample: f32) -> io::Result<()> {
        self.receiver.process_sample(sample);
        while let Some(event) = self.receiver.next_event() {
            self.handle_event(event)?;
        }
        Ok(())
    }

    /// Drain the DSP delay lines at end of input
    ///
    /// Pushes two frame times of silence so that samples still
    /// inside the matched filter can finish their trip through the
    /// chain. A frame left incomplete is discarded without error.
    pub fn flush(&mut self) -> io::Result<()> {
        for _i in 0..2 * crate::receiver::FRAME_SAMPLES {
            self.process_normalized(0.0)?;
        }
        Ok(())
    }

    /// The receiver, for inspection
    pub fn receiver(&self) -> &M17Receiver {
        &self.receiver
    }

    fn handle_event(&mut self, event: ReceiverEvent) -> io::Result<()> {
        match event {
            ReceiverEvent::Frame { frame, cost } => self.handle_frame(frame, cost),
            ReceiverEvent::Carrier(_dcd) => Ok(()),
            ReceiverEvent::Diagnostics(diag) => {
                self.handle_diagnostics(diag);
                Ok(())
            }
        }
    }

    // dcd loss resets an in-sync PRBS so a later BERT run starts
    // its statistics fresh
    fn handle_diagnostics(&mut self, mut diag: Diagnostics) {
        if !diag.dcd && self.prbs.synced() {
            self.prbs.reset();
        }
        if self.prbs.synced() {
            diag.ber = Some(BerReport {
                errors: self.prbs.errors(),
                bits: self.prbs.bits(),
            });
        }
        self.sink.diagnostics(&diag);
    }

    fn handle_frame(&mut self, frame: OutputFrame, cost: u32) -> io::Result<()> {
        match frame {
            OutputFrame::Lsf(bytes) => {
                self.handle_lsf(&bytes);
                Ok(())
            }
            OutputFrame::Lich(_chunk) => {
                info!("LICH");
                Ok(())
            }
            OutputFrame::Stream(payload) => self.handle_stream(&payload, cost),
            OutputFrame::BasicPacket(segment) => self.handle_packet(&segment, false),
            OutputFrame::FullPacket(segment) => self.handle_packet(&segment, true),
            OutputFrame::Bert(payload) => {
                self.handle_bert(&payload);
                Ok(())
            }
        }
    }

    fn handle_lsf(&mut self, bytes: &[u8; 30]) {
        let lsf = match LinkSetupFrame::new(*bytes) {
            Ok(lsf) => lsf,
            Err(e) => {
                // the decoder already CRC-checked this frame
                warn!("{}", e);
                return;
            }
        };

        if self.display_lsf {
            info!("{}", lsf);
        }

        // every LSF starts a fresh packet burst
        self.current_packet.clear();
        self.packet_frame_counter = 0;

        if let Mode::Packet(subtype) = lsf.mode() {
            match subtype {
                PacketType::Raw => {}
                PacketType::Encapsulated => {
                    self.current_packet.extend_from_slice(lsf.as_bytes());
                }
                _ => {
                    warn!("LSF for reserved packet type");
                    self.current_packet.extend_from_slice(lsf.as_bytes());
                }
            }
        }
    }

    fn handle_stream(&mut self, payload: &[u8; 18], cost: u32) -> io::Result<()> {
        // bytes 0..2 are the frame counter; the top bit flags the
        // end of the stream
        if cost < self.good_cost && payload[0] & 0x80 != 0 {
            if self.display_lsf {
                info!("EOS");
            }
        }

        if self.noise_blanker && cost > self.blank_cost {
            let silence = [0i16; 160];
            self.sink.audio(&silence)?;
            self.sink.audio(&silence)?;
        } else {
            let first = self.speech.decode(&payload[2..10]);
            self.sink.audio(&first)?;
            let second = self.speech.decode(&payload[10..18]);
            self.sink.audio(&second)?;
        }
        Ok(())
    }

    fn handle_packet(&mut self, segment: &[u8; 26], full: bool) -> io::Result<()> {
        let control = segment[25];

        if control & 0x80 != 0 {
            // last segment: the counter field is the byte count
            let count = usize::min(((control & 0x7F) >> 2) as usize, 25);
            self.take_segment(&segment[..count]);

            if full {
                self.sink.packet(&self.current_packet)?;
            } else {
                let residue = PACKET_CRC.checksum(&self.current_packet);
                if residue == PACKET_CRC_RESIDUE {
                    self.sink.basic_packet(&self.current_packet);
                } else {
                    warn!("Packet checksum error: {:04x}", residue);
                }
            }
            return Ok(());
        }

        let sequence = ((control & 0x7F) >> 2) as usize;
        if sequence != self.packet_frame_counter {
            warn!(
                "Packet frame sequence error. Got {}, expected {}",
                sequence, self.packet_frame_counter
            );
            return Ok(());
        }
        self.packet_frame_counter += 1;
        self.take_segment(&segment[..25]);
        Ok(())
    }

    // bounded append; overlong bursts drop their tail rather than
    // growing without limit
    fn take_segment(&mut self, bytes: &[u8]) {
        let room = MAX_PACKET_BYTES.saturating_sub(self.current_packet.len());
        if room < bytes.len() {
            warn!("packet accumulator full; dropping {} bytes", bytes.len() - room);
        }
        self.current_packet
            .extend_from_slice(&bytes[..usize::min(room, bytes.len())]);
    }

    fn handle_bert(&mut self, payload: &[u8; 25]) {
        // 24 whole bytes and the top five bits of the last
        for &byte in &payload[..24] {
            for bit in 0..8 {
                self.prbs.validate((byte >> (7 - bit)) & 1);
            }
        }
        for bit in 0..5 {
            self.prbs.validate((payload[24] >> (7 - bit)) & 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::decoder::LSF_CRC;
    use crate::lsf::encode_callsign;
    use crate::prbs::Prbs9;

    // speech decoder which spreads each input byte across its
    // output samples, so tests can recognize which frame was
    // decoded
    struct EchoSpeech;

    impl SpeechDecoder for EchoSpeech {
        fn decode(&mut self, frame: &[u8]) -> [i16; 160] {
            let mut out = [0i16; 160];
            for (i, o) in out.iter_mut().enumerate() {
                *o = frame[i % 8] as i16;
            }
            out
        }
    }

    #[derive(Default)]
    struct VecSink {
        audio: Vec<[i16; 160]>,
        packets: Vec<Vec<u8>>,
        basic_packets: Vec<Vec<u8>>,
        diags: Vec<Diagnostics>,
    }

    impl FrameSink for &mut VecSink {
        fn audio(&mut self, pcm: &[i16; 160]) -> io::Result<()> {
            self.audio.push(*pcm);
            Ok(())
        }

        fn packet(&mut self, payload: &[u8]) -> io::Result<()> {
            self.packets.push(payload.to_vec());
            Ok(())
        }

        fn basic_packet(&mut self, payload: &[u8]) {
            self.basic_packets.push(payload.to_vec());
        }

        fn diagnostics(&mut self, diag: &Diagnostics) {
            self.diags.push(diag.clone());
        }
    }

    fn make_session(sink: &mut VecSink) -> DemodSession<EchoSpeech, &mut VecSink> {
        let config = DemodConfig::default();
        DemodSession::new(&config, EchoSpeech, sink)
    }

    fn make_lsf(type_word: u16) -> [u8; 30] {
        let mut bytes = [0u8; 30];
        bytes[0..6].copy_from_slice(&encode_callsign("N0CALL"));
        bytes[6..12].copy_from_slice(&encode_callsign("AB1CDE"));
        bytes[12..14].copy_from_slice(&type_word.to_be_bytes());
        let crc = LSF_CRC.checksum(&bytes[..28]);
        bytes[28..30].copy_from_slice(&crc.to_be_bytes());
        bytes
    }

    // build a three-segment basic packet burst carrying `payload`
    // with its trailing CRC
    fn packet_segments(payload: &[u8]) -> Vec<[u8; 26]> {
        let mut message = payload.to_vec();
        let crc = PACKET_CRC.checksum(payload);
        message.extend_from_slice(&crc.to_le_bytes());

        let mut segments = Vec::new();
        let mut chunks = message.chunks(25).peekable();
        let mut index = 0u8;
        while let Some(chunk) = chunks.next() {
            let mut seg = [0u8; 26];
            seg[..chunk.len()].copy_from_slice(chunk);
            if chunks.peek().is_none() {
                seg[25] = 0x80 | ((chunk.len() as u8) << 2);
            } else {
                seg[25] = index << 2;
                index += 1;
            }
            segments.push(seg);
        }
        segments
    }

    #[test]
    fn test_stream_audio_decodes() {
        let mut sink = VecSink::default();
        let mut session = make_session(&mut sink);

        let mut payload = [0u8; 18];
        payload[2..10].copy_from_slice(&[1, 1, 1, 1, 1, 1, 1, 1]);
        payload[10..18].copy_from_slice(&[2, 2, 2, 2, 2, 2, 2, 2]);
        session
            .handle_frame(OutputFrame::Stream(payload), 0)
            .unwrap();

        drop(session);
        assert_eq!(sink.audio.len(), 2);
        assert!(sink.audio[0].iter().all(|&s| s == 1));
        assert!(sink.audio[1].iter().all(|&s| s == 2));
    }

    #[test]
    fn test_noise_blanker_silences_costly_frames() {
        let mut sink = VecSink::default();
        let config = *DemodConfig::default().with_noise_blanker(true);
        let mut session = DemodSession::new(&config, EchoSpeech, &mut sink);

        let mut payload = [0u8; 18];
        payload[2..10].copy_from_slice(&[7u8; 8]);
        session
            .handle_frame(OutputFrame::Stream(payload), 90)
            .unwrap();

        drop(session);
        assert_eq!(sink.audio.len(), 2);
        assert!(sink.audio[0].iter().all(|&s| s == 0));
        assert!(sink.audio[1].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_basic_packet_burst_with_good_crc() {
        let mut sink = VecSink::default();
        let mut session = make_session(&mut sink);

        let payload: Vec<u8> = (0u8..60).collect();
        for seg in packet_segments(&payload) {
            session
                .handle_frame(OutputFrame::BasicPacket(seg), 0)
                .unwrap();
        }

        drop(session);
        assert_eq!(sink.basic_packets.len(), 1);
        // the delivered payload includes the trailing CRC
        assert_eq!(&sink.basic_packets[0][..60], payload.as_slice());
        assert_eq!(sink.basic_packets[0].len(), 62);
    }

    #[test]
    fn test_basic_packet_bad_crc_dropped() {
        let mut sink = VecSink::default();
        let mut session = make_session(&mut sink);

        let payload: Vec<u8> = (0u8..60).collect();
        let mut segments = packet_segments(&payload);
        segments[1][3] ^= 0xFF;
        for seg in segments {
            session
                .handle_frame(OutputFrame::BasicPacket(seg), 0)
                .unwrap();
        }

        drop(session);
        assert!(sink.basic_packets.is_empty());
    }

    #[test]
    fn test_sequence_error_drops_segment() {
        let mut sink = VecSink::default();
        let mut session = make_session(&mut sink);

        let payload: Vec<u8> = (0u8..80).collect();
        let mut segments = packet_segments(&payload);
        assert!(segments.len() >= 3);

        // skip the second segment entirely
        segments.remove(1);
        for seg in segments {
            session
                .handle_frame(OutputFrame::BasicPacket(seg), 0)
                .unwrap();
        }

        drop(session);
        // CRC cannot survive a missing segment
        assert!(sink.basic_packets.is_empty());
    }

    #[test]
    fn test_full_packet_writes_raw_payload() {
        let mut sink = VecSink::default();
        let mut session = make_session(&mut sink);

        let payload: Vec<u8> = (0u8..30).collect();
        let mut seg = [0u8; 26];
        seg[..25].copy_from_slice(&payload[..25]);
        seg[25] = 0;
        session
            .handle_frame(OutputFrame::FullPacket(seg), 0)
            .unwrap();

        let mut last = [0u8; 26];
        last[..5].copy_from_slice(&payload[25..]);
        last[25] = 0x80 | (5 << 2);
        session
            .handle_frame(OutputFrame::FullPacket(last), 0)
            .unwrap();

        drop(session);
        assert_eq!(sink.packets.len(), 1);
        assert_eq!(sink.packets[0], payload);
    }

    #[test]
    fn test_lsf_clears_accumulator_and_seeds_encapsulated() {
        let mut sink = VecSink::default();
        let mut session = make_session(&mut sink);

        // leave stale bytes behind
        session.current_packet.extend_from_slice(&[1, 2, 3]);
        session.packet_frame_counter = 2;

        // raw packet mode: cleared, not seeded
        session
            .handle_frame(OutputFrame::Lsf(make_lsf(0x0002)), 0)
            .unwrap();
        assert!(session.current_packet.is_empty());
        assert_eq!(session.packet_frame_counter, 0);

        // encapsulated: seeded with the whole LSF
        let lsf = make_lsf(0x0004);
        session.handle_frame(OutputFrame::Lsf(lsf), 0).unwrap();
        assert_eq!(session.current_packet.as_slice(), &lsf[..]);
    }

    #[test]
    fn test_bert_feeds_prbs() {
        let mut sink = VecSink::default();
        let mut session = make_session(&mut sink);

        // three BERT frames of contiguous sequence bits
        let mut gen = Prbs9::new();
        for _frame in 0..3 {
            let mut payload = [0u8; 25];
            for i in 0..197 {
                payload[i / 8] |= gen.generate() << (7 - i % 8);
            }
            session.handle_frame(OutputFrame::Bert(payload), 0).unwrap();
        }

        assert!(session.prbs.synced());
        assert_eq!(session.prbs.errors(), 0);
        assert!(session.prbs.bits() > 300);
    }

    #[test]
    fn test_dcd_drop_resets_synced_prbs() {
        let mut sink = VecSink::default();
        let mut session = make_session(&mut sink);

        let mut gen = Prbs9::new();
        let mut payload = [0u8; 25];
        for i in 0..197 {
            payload[i / 8] |= gen.generate() << (7 - i % 8);
        }
        session.handle_frame(OutputFrame::Bert(payload), 0).unwrap();
        assert!(session.prbs.synced());

        let diag = Diagnostics {
            dcd: false,
            ..Diagnostics::default()
        };
        session.handle_event(ReceiverEvent::Diagnostics(diag)).unwrap();
        assert!(!session.prbs.synced());

        drop(session);
        assert_eq!(sink.diags.len(), 1);
        assert_eq!(sink.diags[0].ber, None);
    }
}
