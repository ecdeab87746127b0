//! Capture/encode pipeline
//!
//! Accumulates microphone samples into 20 ms frames, gates them with
//! voice activity detection or push-to-talk, encodes voiced frames and
//! hands position-tagged packets to the caller's sink.

use bytes::Bytes;

use crate::audio::vad::{rms_level, VoiceActivityDetector};
use crate::codec::{is_dtx_payload, FrameEncoder};
use crate::constants::{FRAME_SIZE, MAX_MIC_GAIN};
use crate::protocol::{OutgoingPacket, Vec3};

/// Per-call capture controls, read from the engine's settings
#[derive(Debug, Clone, Copy)]
pub struct CaptureControls {
    pub mic_gain: f32,
    pub muted: bool,
    pub push_to_talk: bool,
    /// Whether the push-to-talk key is currently held
    pub ptt_active: bool,
    pub vad_threshold: f32,
    pub hold_time_ms: f32,
}

impl Default for CaptureControls {
    fn default() -> Self {
        Self {
            mic_gain: crate::constants::DEFAULT_MIC_GAIN,
            muted: false,
            push_to_talk: false,
            ptt_active: false,
            vad_threshold: crate::constants::DEFAULT_VAD_THRESHOLD,
            hold_time_ms: crate::constants::DEFAULT_HOLD_TIME_MS,
        }
    }
}

/// Capture statistics
#[derive(Debug, Clone, Default)]
pub struct CaptureStats {
    /// Complete frames assembled from input
    pub frames_captured: u64,
    /// Frames handed to the encoder
    pub frames_encoded: u64,
    pub packets_emitted: u64,
    /// Encoded frames dropped because the payload was a DTX marker
    pub dtx_suppressed: u64,
    pub encode_errors: u64,
}

/// Frame accumulator, voice gate and encoder
pub struct CapturePipeline {
    encoder: Box<dyn FrameEncoder>,
    vad: VoiceActivityDetector,
    frame: Vec<f32>,
    fill: usize,
    input_level: f32,
    speaking: bool,
    stats: CaptureStats,
}

impl CapturePipeline {
    pub fn new(encoder: Box<dyn FrameEncoder>, vad: VoiceActivityDetector) -> Self {
        Self {
            encoder,
            vad,
            frame: vec![0.0; FRAME_SIZE],
            fill: 0,
            input_level: 0.0,
            speaking: false,
            stats: CaptureStats::default(),
        }
    }

    /// Consume a block of mono samples of any length
    ///
    /// Each serialized packet is passed to `sink`. Returns the number of
    /// packets emitted during this call.
    pub fn process(
        &mut self,
        samples: &[f32],
        controls: &CaptureControls,
        position: Vec3,
        sink: &mut dyn FnMut(Bytes),
    ) -> usize {
        if controls.muted {
            self.reset();
            return 0;
        }

        self.vad.set_threshold(controls.vad_threshold);
        self.vad.set_hold_time_ms(controls.hold_time_ms);
        let gain = controls.mic_gain.clamp(0.0, MAX_MIC_GAIN);

        let mut emitted = 0;
        for &sample in samples {
            self.frame[self.fill] = sample * gain;
            self.fill += 1;

            if self.fill == FRAME_SIZE {
                self.fill = 0;
                if self.finish_frame(controls, position, sink) {
                    emitted += 1;
                }
            }
        }
        emitted
    }

    fn finish_frame(
        &mut self,
        controls: &CaptureControls,
        position: Vec3,
        sink: &mut dyn FnMut(Bytes),
    ) -> bool {
        self.stats.frames_captured += 1;

        let energy = rms_level(&self.frame);
        self.input_level = energy;

        let transmit = if controls.push_to_talk {
            controls.ptt_active
        } else {
            self.vad.process(energy)
        };
        self.speaking = transmit;
        if !transmit {
            return false;
        }

        self.stats.frames_encoded += 1;
        let payload = match self.encoder.encode_frame(&self.frame) {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.encode_errors += 1;
                tracing::debug!("Skipping frame, encode failed: {}", e);
                return false;
            }
        };

        if is_dtx_payload(&payload) {
            self.stats.dtx_suppressed += 1;
            return false;
        }

        sink(OutgoingPacket { position, payload }.encode());
        self.stats.packets_emitted += 1;
        true
    }

    /// Drop any partial frame and voice-activity state
    pub fn reset(&mut self) {
        self.fill = 0;
        self.vad.reset();
        self.speaking = false;
        self.input_level = 0.0;
    }

    /// RMS of the most recent complete frame
    pub fn input_level(&self) -> f32 {
        self.input_level
    }

    /// Whether the most recent complete frame was transmitted
    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Samples waiting for the current frame to complete
    pub fn pending_samples(&self) -> usize {
        self.fill
    }

    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }
}
