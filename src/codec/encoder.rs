//! Opus encoder wrapper
//!
//! Voice-tuned libopus encoder: VoIP application, voice signal hint,
//! inband FEC and DTX.

use audiopus::coder::Encoder;
use audiopus::{Application, Bitrate, Channels, SampleRate, Signal};
use bytes::Bytes;

use super::{f32_to_i16, FrameEncoder, MAX_PACKET_SIZE};
use crate::config::OpusConfig;
use crate::constants::FRAME_SIZE;
use crate::error::CodecError;

fn setting_failed(setting: &'static str) -> impl Fn(audiopus::Error) -> CodecError {
    move |e| CodecError::EncoderInit(format!("Failed to set {}: {:?}", setting, e))
}

/// Opus encoder for 20 ms mono voice frames
pub struct OpusEncoder {
    encoder: Encoder,
    config: OpusConfig,
    /// Encoding buffers (reused to avoid allocations)
    pcm: Vec<i16>,
    encode_buffer: Vec<u8>,
    frames_encoded: u64,
    bytes_produced: u64,
    dtx_frames: u64,
}

impl OpusEncoder {
    pub fn new(config: OpusConfig) -> Result<Self, CodecError> {
        let mut encoder = Encoder::new(SampleRate::Hz48000, Channels::Mono, Application::Voip)
            .map_err(|e| CodecError::EncoderInit(format!("{:?}", e)))?;

        Self::configure_encoder(&mut encoder, &config)?;

        Ok(Self {
            encoder,
            config,
            pcm: vec![0; FRAME_SIZE],
            encode_buffer: vec![0u8; MAX_PACKET_SIZE],
            frames_encoded: 0,
            bytes_produced: 0,
            dtx_frames: 0,
        })
    }

    fn configure_encoder(encoder: &mut Encoder, config: &OpusConfig) -> Result<(), CodecError> {
        encoder
            .set_bitrate(Bitrate::BitsPerSecond(config.bitrate as i32))
            .map_err(setting_failed("bitrate"))?;
        encoder
            .set_complexity(config.complexity)
            .map_err(setting_failed("complexity"))?;
        encoder.set_signal(Signal::Voice).map_err(setting_failed("signal"))?;
        encoder.set_inband_fec(config.fec).map_err(setting_failed("FEC"))?;
        encoder
            .set_packet_loss_perc(config.packet_loss_perc)
            .map_err(setting_failed("packet loss"))?;
        encoder.set_dtx(config.dtx).map_err(setting_failed("DTX"))?;

        Ok(())
    }

    /// Encode one frame of f32 samples in [-1, 1]
    ///
    /// A payload of two bytes or less means the encoder chose DTX for this frame.
    pub fn encode(&mut self, samples: &[f32]) -> Result<Bytes, CodecError> {
        if samples.len() != FRAME_SIZE {
            return Err(CodecError::InvalidFrameSize(samples.len()));
        }

        for (dst, &src) in self.pcm.iter_mut().zip(samples) {
            *dst = f32_to_i16(src);
        }

        let size = self
            .encoder
            .encode(&self.pcm, &mut self.encode_buffer)
            .map_err(|e| CodecError::EncodingFailed(format!("{:?}", e)))?;

        self.frames_encoded += 1;
        self.bytes_produced += size as u64;
        if size <= super::DTX_PAYLOAD_MAX {
            self.dtx_frames += 1;
        }

        Ok(Bytes::copy_from_slice(&self.encode_buffer[..size]))
    }

    /// Update bitrate dynamically
    pub fn set_bitrate(&mut self, bitrate: u32) -> Result<(), CodecError> {
        self.encoder
            .set_bitrate(Bitrate::BitsPerSecond(bitrate as i32))
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set bitrate: {:?}", e)))?;
        self.config.bitrate = bitrate;
        Ok(())
    }

    pub fn config(&self) -> &OpusConfig {
        &self.config
    }

    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            bytes_produced: self.bytes_produced,
            dtx_frames: self.dtx_frames,
            average_frame_size: if self.frames_encoded > 0 {
                self.bytes_produced as f32 / self.frames_encoded as f32
            } else {
                0.0
            },
        }
    }
}

impl FrameEncoder for OpusEncoder {
    fn encode_frame(&mut self, frame: &[f32]) -> Result<Bytes, CodecError> {
        self.encode(frame)
    }
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
    /// Frames the encoder reduced to a DTX marker
    pub dtx_frames: u64,
    pub average_frame_size: f32,
}
