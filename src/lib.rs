//! # Proximity Voice
//!
//! Real-time core of a positional voice chat: VAD-gated Opus capture on
//! the way out, per-peer decode and binaural rendering on the way in.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────── CAPTURE THREAD ─────────────────────────────┐
//! │  mic samples ─▶ gain ─▶ 960-sample frame ─▶ VAD / PTT ─▶ Opus encoder   │
//! │                                                              │          │
//! │                          [0x03|x|y|z|opus] ◀── local position┘          │
//! └──────────────────────────────────────┬──────────────────────────────────┘
//!                                        ▼ packet sink (transport)
//!
//!                           transport ─▶ feed_bytes / feed_packet
//!                                        │
//!                                        ▼ drop-oldest queue (128)
//! ┌──────────────────────────── PLAYBACK THREAD ────────────────────────────┐
//! │  PeerTable                                                              │
//! │  ┌───────────────────────────────────────────────────────────────────┐  │
//! │  │ Peer A: decoder ─▶ spatializer ─▶ jitter ring ─┐                  │  │
//! │  │ Peer B: decoder ─▶ spatializer ─▶ jitter ring ─┤  short read?     │  │
//! │  │ Peer C: decoder ─▶ spatializer ─▶ jitter ring ─┤  ─▶ PLC conceal  │  │
//! │  └────────────────────────────────────────────────┼──────────────────┘  │
//! │                                                   ▼                     │
//! │                               mixer (sum + tanh) ─▶ stereo output       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`engine::VoiceEngine`] owns everything above. With the `stream-host`
//! feature, [`audio::StreamHost`] drives it from cpal device callbacks.

pub mod audio;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod mixer;
pub mod peer;
pub mod protocol;
pub mod spatial;

pub use config::EngineConfig;
pub use engine::{EngineStats, VoiceEngine};
pub use error::{Error, Result};
pub use peer::PeerStatus;
pub use protocol::{ControlMessage, InboundPacket, OutgoingPacket, PeerId, Pose, Vec3};

/// Application-wide constants
pub mod constants {
    /// Sample rate of every stream and codec
    pub const SAMPLE_RATE: u32 = 48_000;

    /// Frame duration in milliseconds
    pub const FRAME_DURATION_MS: u32 = 20;

    /// Mono samples per codec frame
    pub const FRAME_SIZE: usize = (SAMPLE_RATE * FRAME_DURATION_MS / 1000) as usize;

    /// Interleaved output channels
    pub const OUTPUT_CHANNELS: usize = 2;

    /// Default Opus bitrate in bits per second
    pub const DEFAULT_BITRATE: u32 = 32_000;

    /// Default Opus complexity (0-10)
    pub const DEFAULT_COMPLEXITY: u8 = 5;

    /// Expected packet loss hint for inband FEC
    pub const DEFAULT_PACKET_LOSS_PERC: u8 = 5;

    pub const DEFAULT_MIC_GAIN: f32 = 1.2;
    pub const MAX_MIC_GAIN: f32 = 3.0;

    /// RMS level a frame must exceed to count as voice
    pub const DEFAULT_VAD_THRESHOLD: f32 = 0.01;

    /// VAD hold after the last voiced frame
    pub const DEFAULT_HOLD_TIME_MS: f32 = 500.0;

    pub const MAX_MASTER_VOLUME: f32 = 2.0;

    /// Full volume inside this distance (world units)
    pub const DEFAULT_INNER_RADIUS: f32 = 2500.0;

    /// Silent beyond this distance (world units)
    pub const DEFAULT_OUTER_RADIUS: f32 = 15_000.0;

    pub const DEFAULT_ROLLOFF: f32 = 1.0;

    /// Unreal units are centimeters
    pub const DEFAULT_UNITS_PER_METER: f32 = 100.0;

    pub const DEFAULT_REVERB_MIX: f32 = 0.3;
    pub const DEFAULT_DOPPLER_EXAGGERATION: f32 = 3.0;
    pub const DEFAULT_GAIN_SMOOTHING_MS: f32 = 50.0;
    pub const DEFAULT_PITCH_SMOOTHING_MS: f32 = 400.0;

    /// Per-peer jitter ring length
    pub const DEFAULT_JITTER_BUFFER_MS: u32 = 500;

    /// Concealment stops once the last packet is this old
    pub const CONCEAL_WINDOW_MS: u64 = 500;

    /// Concealment attempts between two real packets
    pub const MAX_CONCEAL_FRAMES: u32 = 10;

    /// A peer silent this long is marked inactive
    pub const INACTIVE_AFTER_MS: u64 = 2000;

    /// Inbound packets held between transport and playback thread
    pub const INBOUND_QUEUE_CAPACITY: usize = 128;
}
