//! Engine configuration
//!
//! Every section deserializes with defaults, so a partial TOML document
//! only overrides what it names.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub capture: CaptureConfig,
    pub codec: OpusConfig,
    pub spatial: SpatialConfig,
    pub playback: PlaybackConfig,
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.capture.validate()?;
        self.codec.validate()?;
        self.spatial.validate()?;
        self.playback.validate()
    }
}

/// Microphone gain and voice-activity gating
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Linear gain applied before accumulation (0.0 - 3.0)
    pub mic_gain: f32,
    /// RMS threshold for voice activity (0.0 - 1.0)
    pub vad_threshold: f32,
    /// How long transmission continues after energy drops below threshold
    pub hold_time_ms: f32,
    /// Transmit only while the push-to-talk key is held
    pub push_to_talk: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mic_gain: DEFAULT_MIC_GAIN,
            vad_threshold: DEFAULT_VAD_THRESHOLD,
            hold_time_ms: DEFAULT_HOLD_TIME_MS,
            push_to_talk: false,
        }
    }
}

impl CaptureConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=MAX_MIC_GAIN).contains(&self.mic_gain) {
            return Err(Error::Config(format!("mic_gain out of range: {}", self.mic_gain)));
        }
        if !(0.0..=1.0).contains(&self.vad_threshold) {
            return Err(Error::Config(format!(
                "vad_threshold out of range: {}",
                self.vad_threshold
            )));
        }
        if self.hold_time_ms < 0.0 {
            return Err(Error::Config(format!(
                "hold_time_ms must not be negative: {}",
                self.hold_time_ms
            )));
        }
        Ok(())
    }
}

/// Opus encoder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpusConfig {
    /// Target bitrate in bits per second
    pub bitrate: u32,
    /// Encoder complexity (0-10)
    pub complexity: u8,
    /// Inband forward error correction
    pub fec: bool,
    /// Expected packet loss hint for FEC (0-100)
    pub packet_loss_perc: u8,
    /// Discontinuous transmission during silence
    pub dtx: bool,
}

impl Default for OpusConfig {
    fn default() -> Self {
        Self {
            bitrate: DEFAULT_BITRATE,
            complexity: DEFAULT_COMPLEXITY,
            fec: true,
            packet_loss_perc: DEFAULT_PACKET_LOSS_PERC,
            dtx: true,
        }
    }
}

impl OpusConfig {
    fn validate(&self) -> Result<()> {
        if !(6_000..=510_000).contains(&self.bitrate) {
            return Err(Error::Config(format!("bitrate out of range: {}", self.bitrate)));
        }
        if self.complexity > 10 {
            return Err(Error::Config(format!(
                "complexity out of range: {}",
                self.complexity
            )));
        }
        if self.packet_loss_perc > 100 {
            return Err(Error::Config(format!(
                "packet_loss_perc out of range: {}",
                self.packet_loss_perc
            )));
        }
        Ok(())
    }
}

/// Binaural renderer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Render binaurally; when false every peer is center-panned
    pub enabled: bool,
    /// Full volume at or inside this distance (world units)
    pub inner_radius: f32,
    /// Silent at or beyond this distance (world units)
    pub outer_radius: f32,
    /// Exponent shaping the falloff between the radii
    pub rolloff: f32,
    /// World units per meter, for air absorption and Doppler
    pub units_per_meter: f32,
    /// Master output volume (0.0 - 2.0)
    pub master_volume: f32,
    pub reverb_enabled: bool,
    /// Scales the distance-driven reverb send (0.0 - 1.0)
    pub reverb_mix: f32,
    pub doppler_enabled: bool,
    /// Multiplier on radial velocity before the Doppler formula
    pub doppler_exaggeration: f32,
    /// Time constant for gain, delay and reverb-send smoothing
    pub gain_smoothing_ms: f32,
    /// Time constant for Doppler pitch smoothing
    pub pitch_smoothing_ms: f32,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            inner_radius: DEFAULT_INNER_RADIUS,
            outer_radius: DEFAULT_OUTER_RADIUS,
            rolloff: DEFAULT_ROLLOFF,
            units_per_meter: DEFAULT_UNITS_PER_METER,
            master_volume: 1.0,
            reverb_enabled: true,
            reverb_mix: DEFAULT_REVERB_MIX,
            doppler_enabled: true,
            doppler_exaggeration: DEFAULT_DOPPLER_EXAGGERATION,
            gain_smoothing_ms: DEFAULT_GAIN_SMOOTHING_MS,
            pitch_smoothing_ms: DEFAULT_PITCH_SMOOTHING_MS,
        }
    }
}

impl SpatialConfig {
    fn validate(&self) -> Result<()> {
        if self.inner_radius < 0.0 || self.outer_radius <= self.inner_radius {
            return Err(Error::Config(format!(
                "invalid radii: inner {} outer {}",
                self.inner_radius, self.outer_radius
            )));
        }
        if self.units_per_meter <= 0.0 {
            return Err(Error::Config(format!(
                "units_per_meter must be positive: {}",
                self.units_per_meter
            )));
        }
        if !(0.0..=MAX_MASTER_VOLUME).contains(&self.master_volume) {
            return Err(Error::Config(format!(
                "master_volume out of range: {}",
                self.master_volume
            )));
        }
        if !(0.0..=1.0).contains(&self.reverb_mix) {
            return Err(Error::Config(format!(
                "reverb_mix out of range: {}",
                self.reverb_mix
            )));
        }
        if self.gain_smoothing_ms <= 0.0 || self.pitch_smoothing_ms <= 0.0 {
            return Err(Error::Config("smoothing time constants must be positive".into()));
        }
        Ok(())
    }
}

/// Jitter buffer, concealment and inbound queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Capacity of each peer's stereo ring, in milliseconds of audio
    pub jitter_buffer_ms: u32,
    /// Concealment is attempted only while the last packet is younger than this
    pub conceal_window_ms: u64,
    /// Concealment attempts allowed between two real packets
    pub max_conceal_frames: u32,
    /// A peer silent for longer than this is marked inactive
    pub inactive_after_ms: u64,
    /// Inbound packets buffered between transport and playback thread
    pub inbound_queue_capacity: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            jitter_buffer_ms: DEFAULT_JITTER_BUFFER_MS,
            conceal_window_ms: CONCEAL_WINDOW_MS,
            max_conceal_frames: MAX_CONCEAL_FRAMES,
            inactive_after_ms: INACTIVE_AFTER_MS,
            inbound_queue_capacity: INBOUND_QUEUE_CAPACITY,
        }
    }
}

impl PlaybackConfig {
    fn validate(&self) -> Result<()> {
        if self.jitter_buffer_ms < FRAME_DURATION_MS {
            return Err(Error::Config(format!(
                "jitter_buffer_ms must hold at least one frame: {}",
                self.jitter_buffer_ms
            )));
        }
        if self.inbound_queue_capacity == 0 {
            return Err(Error::Config("inbound_queue_capacity must be positive".into()));
        }
        Ok(())
    }

    /// Ring capacity in interleaved stereo samples
    pub fn jitter_buffer_samples(&self) -> usize {
        (SAMPLE_RATE as usize * self.jitter_buffer_ms as usize / 1000) * OUTPUT_CHANNELS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.playback.jitter_buffer_samples(), 48_000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [capture]
            push_to_talk = true

            [spatial]
            outer_radius = 12000.0
            reverb_enabled = false
            "#,
        )
        .unwrap();

        assert!(config.capture.push_to_talk);
        assert_eq!(config.capture.mic_gain, DEFAULT_MIC_GAIN);
        assert_eq!(config.spatial.outer_radius, 12000.0);
        assert!(!config.spatial.reverb_enabled);
        assert_eq!(config.codec, OpusConfig::default());
    }

    #[test]
    fn test_rejects_inverted_radii() {
        let err = EngineConfig::from_toml_str(
            r#"
            [spatial]
            inner_radius = 500.0
            outer_radius = 100.0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = EngineConfig::default();
        config.codec.bitrate = 24_000;
        config.spatial.rolloff = 2.0;

        let text = config.to_toml_string().unwrap();
        let parsed = EngineConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
