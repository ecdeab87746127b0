//! Opus voice codec
//!
//! The capture pipeline and the peer table talk to the codec through
//! [`FrameEncoder`] and [`FrameDecoder`], so tests can substitute a
//! deterministic implementation for libopus.

pub mod decoder;
pub mod encoder;

pub use decoder::{DecoderStats, OpusDecoder};
pub use encoder::{EncoderStats, OpusEncoder};

use bytes::Bytes;

use crate::error::CodecError;

/// Payloads at or below this size are DTX/silence markers and are never sent
pub const DTX_PAYLOAD_MAX: usize = 2;

/// Largest packet the encoder is allowed to produce
pub const MAX_PACKET_SIZE: usize = 4000;

/// Encodes one fixed-size mono frame at a time
pub trait FrameEncoder: Send {
    fn encode_frame(&mut self, frame: &[f32]) -> Result<Bytes, CodecError>;
}

/// Decodes one mono frame per packet and synthesizes frames for lost packets
pub trait FrameDecoder: Send {
    /// Decode `payload` into `out`, returning the number of samples written
    fn decode_frame(&mut self, payload: &[u8], out: &mut [f32]) -> Result<usize, CodecError>;

    /// Packet-loss concealment: extrapolate one frame from decoder history
    fn conceal_frame(&mut self, out: &mut [f32]) -> Result<usize, CodecError>;
}

/// Builds a fresh decoder for each newly seen peer
pub type DecoderFactory =
    Box<dyn Fn() -> Result<Box<dyn FrameDecoder>, CodecError> + Send + Sync>;

/// Factory producing real Opus decoders
pub fn opus_decoder_factory() -> DecoderFactory {
    Box::new(|| Ok(Box::new(OpusDecoder::new()?) as Box<dyn FrameDecoder>))
}

/// True when an encoded payload carries no audio worth sending
#[inline]
pub fn is_dtx_payload(payload: &[u8]) -> bool {
    payload.len() <= DTX_PAYLOAD_MAX
}

#[inline]
fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

#[inline]
fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}
