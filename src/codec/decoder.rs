//! Opus decoder wrapper
//!
//! Decodes one mono frame per packet and runs libopus packet-loss
//! concealment when a packet is missing.

use audiopus::coder::Decoder;
use audiopus::packet::Packet;
use audiopus::{Channels, MutSignals, SampleRate};

use super::{i16_to_f32, FrameDecoder};
use crate::constants::FRAME_SIZE;
use crate::error::CodecError;

/// Opus decoder for 48 kHz mono voice
pub struct OpusDecoder {
    decoder: Decoder,
    /// Decoding buffer (reused to avoid allocations)
    pcm: Vec<i16>,
    frames_decoded: u64,
    /// Frames synthesized by PLC
    frames_lost: u64,
    samples_produced: u64,
}

impl OpusDecoder {
    pub fn new() -> Result<Self, CodecError> {
        let decoder = Decoder::new(SampleRate::Hz48000, Channels::Mono)
            .map_err(|e| CodecError::DecoderInit(format!("{:?}", e)))?;

        Ok(Self {
            decoder,
            pcm: vec![0; FRAME_SIZE],
            frames_decoded: 0,
            frames_lost: 0,
            samples_produced: 0,
        })
    }

    /// Decode an Opus packet into `out`, returning samples written
    pub fn decode(&mut self, data: &[u8], out: &mut [f32]) -> Result<usize, CodecError> {
        let packet = Packet::try_from(data)
            .map_err(|e| CodecError::DecodingFailed(format!("Invalid packet: {:?}", e)))?;
        let signals = MutSignals::try_from(&mut self.pcm[..])
            .map_err(|e| CodecError::DecodingFailed(format!("{:?}", e)))?;

        let samples = self
            .decoder
            .decode(Some(packet), signals, false)
            .map_err(|e| CodecError::DecodingFailed(format!("{:?}", e)))?;

        self.frames_decoded += 1;
        Ok(self.copy_out(samples, out))
    }

    /// Generate packet loss concealment samples
    pub fn decode_plc(&mut self, out: &mut [f32]) -> Result<usize, CodecError> {
        let signals = MutSignals::try_from(&mut self.pcm[..])
            .map_err(|e| CodecError::DecodingFailed(format!("{:?}", e)))?;

        let samples = self
            .decoder
            .decode(None::<Packet<'_>>, signals, false)
            .map_err(|e| CodecError::DecodingFailed(format!("PLC failed: {:?}", e)))?;

        self.frames_lost += 1;
        Ok(self.copy_out(samples, out))
    }

    fn copy_out(&mut self, samples: usize, out: &mut [f32]) -> usize {
        let n = samples.min(out.len()).min(self.pcm.len());
        for (dst, &src) in out[..n].iter_mut().zip(&self.pcm[..n]) {
            *dst = i16_to_f32(src);
        }
        self.samples_produced += n as u64;
        n
    }

    pub fn stats(&self) -> DecoderStats {
        DecoderStats {
            frames_decoded: self.frames_decoded,
            frames_lost: self.frames_lost,
            samples_produced: self.samples_produced,
            loss_rate: if self.frames_decoded + self.frames_lost > 0 {
                self.frames_lost as f32 / (self.frames_decoded + self.frames_lost) as f32
            } else {
                0.0
            },
        }
    }
}

impl FrameDecoder for OpusDecoder {
    fn decode_frame(&mut self, payload: &[u8], out: &mut [f32]) -> Result<usize, CodecError> {
        self.decode(payload, out)
    }

    fn conceal_frame(&mut self, out: &mut [f32]) -> Result<usize, CodecError> {
        self.decode_plc(out)
    }
}

/// Decoder statistics
#[derive(Debug, Clone)]
pub struct DecoderStats {
    pub frames_decoded: u64,
    pub frames_lost: u64,
    pub samples_produced: u64,
    pub loss_rate: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::OpusEncoder;
    use crate::config::OpusConfig;

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut encoder = OpusEncoder::new(OpusConfig::default()).unwrap();
        let mut decoder = OpusDecoder::new().unwrap();

        let samples: Vec<f32> = (0..FRAME_SIZE)
            .map(|i| {
                let t = i as f32 / 48000.0;
                (t * 300.0 * 2.0 * std::f32::consts::PI).sin() * 0.5
            })
            .collect();

        let encoded = encoder.encode(&samples).unwrap();
        let mut decoded = vec![0.0f32; FRAME_SIZE];
        let n = decoder.decode(&encoded, &mut decoded).unwrap();

        assert_eq!(n, FRAME_SIZE);
        assert!(decoded.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_decoder_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<OpusDecoder>();
    }

    #[test]
    fn test_plc() {
        let mut decoder = OpusDecoder::new().unwrap();
        let mut out = vec![0.0f32; FRAME_SIZE];

        assert!(decoder.decode_plc(&mut out).is_ok());
        assert_eq!(decoder.stats().frames_lost, 1);
    }

    #[test]
    fn test_garbage_is_an_error() {
        let mut decoder = OpusDecoder::new().unwrap();
        let mut out = vec![0.0f32; FRAME_SIZE];

        assert!(decoder.decode(&[], &mut out).is_err());
        assert_eq!(decoder.stats().frames_decoded, 0);
    }
}
