//! Binaural spatializer
//!
//! Renders one peer's mono voice frame to stereo from the listener's point
//! of view. Per sample the signal runs through:
//!
//! ```text
//! mono ─▶ air absorption ─▶ Doppler line ─┬─▶ ITD delay L ─▶ head shadow L ─▶ × gain L ─┐
//!                  │                      └─▶ ITD delay R ─▶ head shadow R ─▶ × gain R ─┤
//!                  └─▶ × distance ─▶ reverb ─▶ × send ─────────────────────────────────▶ + ─▶ stereo
//! ```
//!
//! Every spatializer owns its filter, delay-line and smoothing state, so
//! each peer needs its own instance.

pub mod binaural;
pub mod delay;
pub mod filters;
pub mod geometry;
pub mod reverb;

pub use binaural::{binaural_cues, BinauralCues};
pub use delay::{doppler_pitch_ratio, DopplerLine, FractionalDelay};
pub use filters::{HeadShadowFilter, OnePoleLowPass, Smoothed};
pub use geometry::{distance_attenuation, relative_position, RelativePosition};
pub use reverb::Reverb;

use std::f32::consts::FRAC_1_SQRT_2;

use crate::config::SpatialConfig;
use crate::constants::{FRAME_DURATION_MS, SAMPLE_RATE};
use crate::protocol::{Pose, Vec3};

const SHADOW_WET: f32 = 0.95;
const MIN_REVERB_SEND: f32 = 0.001;

/// Rendering parameters, sampled from the engine settings once per block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialParams {
    pub enabled: bool,
    pub inner_radius: f32,
    pub outer_radius: f32,
    pub rolloff: f32,
    pub units_per_meter: f32,
    pub master_volume: f32,
    pub reverb_enabled: bool,
    pub reverb_mix: f32,
    pub doppler_enabled: bool,
    pub doppler_exaggeration: f32,
    pub gain_smoothing_ms: f32,
    pub pitch_smoothing_ms: f32,
}

impl From<&SpatialConfig> for SpatialParams {
    fn from(config: &SpatialConfig) -> Self {
        Self {
            enabled: config.enabled,
            inner_radius: config.inner_radius,
            outer_radius: config.outer_radius,
            rolloff: config.rolloff.max(geometry::MIN_ROLLOFF),
            units_per_meter: config.units_per_meter,
            master_volume: config.master_volume,
            reverb_enabled: config.reverb_enabled,
            reverb_mix: config.reverb_mix,
            doppler_enabled: config.doppler_enabled,
            doppler_exaggeration: config.doppler_exaggeration,
            gain_smoothing_ms: config.gain_smoothing_ms,
            pitch_smoothing_ms: config.pitch_smoothing_ms,
        }
    }
}

impl Default for SpatialParams {
    fn default() -> Self {
        Self::from(&SpatialConfig::default())
    }
}

/// Per-peer binaural renderer
pub struct Spatializer {
    sample_rate: f32,
    air: OnePoleLowPass,
    doppler: DopplerLine,
    itd_l: FractionalDelay,
    itd_r: FractionalDelay,
    shadow_l: HeadShadowFilter,
    shadow_r: HeadShadowFilter,
    reverb: Reverb,
    gain_l: Smoothed,
    gain_r: Smoothed,
    delay_l: Smoothed,
    delay_r: Smoothed,
    send: Smoothed,
    pitch: Smoothed,
    prev_distance: Option<f32>,
    first_frame: bool,
}

impl Default for Spatializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Spatializer {
    pub fn new() -> Self {
        let sample_rate = SAMPLE_RATE as f32;
        Self {
            sample_rate,
            air: OnePoleLowPass::new(),
            doppler: DopplerLine::new(),
            itd_l: FractionalDelay::new(),
            itd_r: FractionalDelay::new(),
            shadow_l: HeadShadowFilter::new(),
            shadow_r: HeadShadowFilter::new(),
            reverb: Reverb::new(sample_rate),
            gain_l: Smoothed::new(0.0),
            gain_r: Smoothed::new(0.0),
            delay_l: Smoothed::new(0.0),
            delay_r: Smoothed::new(0.0),
            send: Smoothed::new(0.0),
            pitch: Smoothed::new(1.0),
            prev_distance: None,
            first_frame: true,
        }
    }

    /// Render `mono` into interleaved `stereo` and return the distance
    /// volume applied, in [0, 1]
    ///
    /// `stereo` must hold two samples per input sample; any excess input
    /// is ignored.
    pub fn process(
        &mut self,
        mono: &[f32],
        listener: &Pose,
        source: Vec3,
        params: &SpatialParams,
        stereo: &mut [f32],
    ) -> f32 {
        let n = mono.len().min(stereo.len() / 2);
        let (mono, stereo) = (&mono[..n], &mut stereo[..n * 2]);

        if !params.enabled {
            let gain = FRAC_1_SQRT_2 * params.master_volume;
            for (frame, &sample) in stereo.chunks_exact_mut(2).zip(mono) {
                frame[0] = sample * gain;
                frame[1] = sample * gain;
            }
            return 1.0;
        }

        let rel = relative_position(listener, source);
        if !rel.distance.is_finite() || !rel.azimuth.is_finite() || !listener.yaw.is_finite() {
            stereo.fill(0.0);
            return 0.0;
        }

        let volume = distance_attenuation(
            rel.distance,
            params.inner_radius,
            params.outer_radius,
            params.rolloff,
        );

        if !(volume > 0.0) {
            self.prev_distance = Some(rel.distance);
            if !self.first_frame {
                self.silence();
            }
            stereo.fill(0.0);
            return 0.0;
        }

        self.update_targets(&rel, volume, params);

        let gain_coeff = Smoothed::coefficient(params.gain_smoothing_ms, self.sample_rate);
        let pitch_coeff = Smoothed::coefficient(params.pitch_smoothing_ms, self.sample_rate);
        let air_alpha = geometry::air_absorption_alpha(rel.distance / params.units_per_meter);

        for (frame, &sample) in stereo.chunks_exact_mut(2).zip(mono) {
            let gain_l = self.gain_l.step(gain_coeff);
            let gain_r = self.gain_r.step(gain_coeff);
            let delay_l = self.delay_l.step(gain_coeff);
            let delay_r = self.delay_r.step(gain_coeff);
            let send = self.send.step(gain_coeff);
            let pitch = self.pitch.step(pitch_coeff);

            let absorbed = self.air.process(sample, air_alpha);
            let shifted = self.doppler.process(absorbed, pitch);

            self.itd_l.write(shifted);
            self.itd_r.write(shifted);
            let left = self.itd_l.read(delay_l);
            let right = self.itd_r.read(delay_r);

            let left = left * (1.0 - SHADOW_WET) + self.shadow_l.process(left) * SHADOW_WET;
            let right = right * (1.0 - SHADOW_WET) + self.shadow_r.process(right) * SHADOW_WET;

            let (wet_l, wet_r) = if params.reverb_enabled && send > MIN_REVERB_SEND {
                let (l, r) = self.reverb.process(absorbed * volume);
                (l * send, r * send)
            } else {
                (0.0, 0.0)
            };

            frame[0] = left * gain_l + wet_l;
            frame[1] = right * gain_r + wet_r;
        }

        volume
    }

    fn update_targets(&mut self, rel: &RelativePosition, volume: f32, params: &SpatialParams) {
        let cues = binaural_cues(rel.azimuth, self.sample_rate);
        let level = volume * params.master_volume;

        self.shadow_l
            .set_cutoff(binaural::head_shadow_cutoff(cues.shadow_l), self.sample_rate);
        self.shadow_r
            .set_cutoff(binaural::head_shadow_cutoff(cues.shadow_r), self.sample_rate);

        let send = if params.reverb_enabled {
            geometry::reverb_send(rel.distance, params.inner_radius, params.outer_radius)
                * params.reverb_mix
        } else {
            0.0
        };

        let pitch = match self.prev_distance {
            Some(prev) if params.doppler_enabled => doppler_pitch_ratio(
                prev,
                rel.distance,
                params.units_per_meter,
                FRAME_DURATION_MS as f32 / 1000.0,
                params.doppler_exaggeration,
            ),
            _ => 1.0,
        };
        self.prev_distance = Some(rel.distance);

        let snap = self.first_frame;
        let targets = [
            (&mut self.gain_l, cues.gain_l * level),
            (&mut self.gain_r, cues.gain_r * level),
            (&mut self.delay_l, cues.delay_l),
            (&mut self.delay_r, cues.delay_r),
            (&mut self.send, send),
            (&mut self.pitch, pitch),
        ];
        for (smoothed, target) in targets {
            if snap {
                smoothed.snap(target);
            } else {
                smoothed.set(target);
            }
        }
        self.first_frame = false;
    }

    /// Drop everything still in flight so re-entry starts from silence
    fn silence(&mut self) {
        self.air.reset();
        self.doppler.clear();
        self.itd_l.clear();
        self.itd_r.clear();
        self.shadow_l.reset();
        self.shadow_r.reset();
        self.reverb.clear();
        self.first_frame = true;
    }

    pub fn is_primed(&self) -> bool {
        !self.first_frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FRAME_SIZE;
    use std::f32::consts::PI;

    fn sine(freq: f32, amplitude: f32) -> Vec<f32> {
        (0..FRAME_SIZE)
            .map(|i| (2.0 * PI * freq * i as f32 / 48_000.0).sin() * amplitude)
            .collect()
    }

    fn energy(stereo: &[f32], channel: usize) -> f32 {
        stereo.chunks_exact(2).map(|f| f[channel] * f[channel]).sum()
    }

    fn dry_params() -> SpatialParams {
        SpatialParams {
            reverb_enabled: false,
            doppler_enabled: false,
            ..SpatialParams::default()
        }
    }

    #[test]
    fn test_bypass_center_pans() {
        let mut spatializer = Spatializer::new();
        let params = SpatialParams {
            enabled: false,
            master_volume: 1.5,
            ..SpatialParams::default()
        };
        let input = sine(440.0, 0.5);
        let mut out = vec![0.0; FRAME_SIZE * 2];

        let volume = spatializer.process(
            &input,
            &Pose::default(),
            Vec3::new(5000.0, 0.0, 0.0),
            &params,
            &mut out,
        );

        assert_eq!(volume, 1.0);
        for (frame, &x) in out.chunks_exact(2).zip(&input) {
            assert_eq!(frame[0], frame[1]);
            assert_eq!(frame[0], x * (FRAC_1_SQRT_2 * 1.5));
        }
    }

    #[test]
    fn test_front_source_is_balanced() {
        let mut spatializer = Spatializer::new();
        let input = sine(500.0, 0.5);
        let mut out = vec![0.0; FRAME_SIZE * 2];

        spatializer.process(
            &input,
            &Pose::default(),
            Vec3::new(300.0, 0.0, 0.0),
            &dry_params(),
            &mut out,
        );

        for frame in out.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_right_source_louder_on_right() {
        let mut spatializer = Spatializer::new();
        let input = sine(500.0, 0.5);
        let mut out = vec![0.0; FRAME_SIZE * 2];
        let listener = Pose::default();
        let right_of_listener = Vec3::new(0.0, -300.0, 0.0);

        for _ in 0..3 {
            spatializer.process(&input, &listener, right_of_listener, &dry_params(), &mut out);
        }

        assert!(energy(&out, 1) > energy(&out, 0) * 2.0);
    }

    #[test]
    fn test_beyond_outer_radius_is_silent() {
        let mut spatializer = Spatializer::new();
        let input = sine(500.0, 0.5);
        let mut out = vec![1.0; FRAME_SIZE * 2];
        let params = SpatialParams::default();

        let volume = spatializer.process(
            &input,
            &Pose::default(),
            Vec3::new(params.outer_radius + 1.0, 0.0, 0.0),
            &params,
            &mut out,
        );

        assert_eq!(volume, 0.0);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(!spatializer.is_primed());
        assert_eq!(spatializer.prev_distance, Some(params.outer_radius + 1.0));
    }

    #[test]
    fn test_reentry_does_not_replay_old_audio() {
        let mut spatializer = Spatializer::new();
        let params = SpatialParams::default();
        let listener = Pose::default();
        let near = Vec3::new(300.0, 0.0, 0.0);
        let mut out = vec![0.0; FRAME_SIZE * 2];

        spatializer.process(&sine(500.0, 0.8), &listener, near, &params, &mut out);
        spatializer.process(
            &sine(500.0, 0.8),
            &listener,
            Vec3::new(params.outer_radius * 2.0, 0.0, 0.0),
            &params,
            &mut out,
        );

        let silence = vec![0.0; FRAME_SIZE];
        let volume = spatializer.process(&silence, &listener, near, &params, &mut out);
        assert!(volume > 0.0);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_non_finite_source_is_silent_and_recovers() {
        let mut spatializer = Spatializer::new();
        let params = SpatialParams::default();
        let listener = Pose::default();
        let input = sine(500.0, 0.5);
        let mut out = vec![1.0; FRAME_SIZE * 2];

        for source in [
            Vec3::new(f32::NAN, 0.0, 0.0),
            Vec3::new(0.0, f32::INFINITY, 0.0),
        ] {
            assert_eq!(spatializer.process(&input, &listener, source, &params, &mut out), 0.0);
            assert!(out.iter().all(|&s| s == 0.0));
        }

        let volume = spatializer.process(&input, &listener, Vec3::new(300.0, 0.0, 0.0), &params, &mut out);
        assert_eq!(volume, 1.0);
        assert!(out.iter().all(|s| s.is_finite()));
        assert!(out.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_non_finite_listener_is_silent() {
        let mut spatializer = Spatializer::new();
        let params = SpatialParams::default();
        let input = sine(500.0, 0.5);
        let mut out = vec![1.0; FRAME_SIZE * 2];

        let bad_yaw = Pose::new(Vec3::ZERO, f32::NAN);
        assert_eq!(spatializer.process(&input, &bad_yaw, Vec3::new(300.0, 0.0, 0.0), &params, &mut out), 0.0);
        assert!(out.iter().all(|&s| s == 0.0));

        let bad_position = Pose::new(Vec3::new(f32::NEG_INFINITY, 0.0, 0.0), 0.0);
        assert_eq!(spatializer.process(&input, &bad_position, Vec3::new(300.0, 0.0, 0.0), &params, &mut out), 0.0);
        assert!(!spatializer.is_primed());
    }

    #[test]
    fn test_volume_drops_with_distance() {
        let params = SpatialParams::default();
        let input = sine(500.0, 0.5);
        let mut out = vec![0.0; FRAME_SIZE * 2];

        let near = Spatializer::new().process(
            &input,
            &Pose::default(),
            Vec3::new(100.0, 0.0, 0.0),
            &params,
            &mut out,
        );
        let far = Spatializer::new().process(
            &input,
            &Pose::default(),
            Vec3::new(6000.0, 0.0, 0.0),
            &params,
            &mut out,
        );

        assert_eq!(near, 1.0);
        assert!(far > 0.0 && far < near);
    }

    #[test]
    fn test_output_is_finite_while_moving() {
        let mut spatializer = Spatializer::new();
        let params = SpatialParams::default();
        let input = sine(300.0, 1.0);
        let mut out = vec![0.0; FRAME_SIZE * 2];

        for step in 0..50 {
            let angle = step as f32 * 0.3;
            let source = Vec3::new(angle.cos() * 2000.0, angle.sin() * 2000.0, 0.0);
            let listener = Pose::new(Vec3::ZERO, step as f32 * 0.05);
            spatializer.process(&input, &listener, source, &params, &mut out);
            assert!(out.iter().all(|s| s.is_finite() && s.abs() < 8.0));
        }
    }

    #[test]
    fn test_short_output_buffer() {
        let mut spatializer = Spatializer::new();
        let input = sine(500.0, 0.5);
        let mut out = vec![0.0; 100];
        spatializer.process(
            &input,
            &Pose::default(),
            Vec3::new(300.0, 0.0, 0.0),
            &dry_params(),
            &mut out,
        );
        assert!(spatializer.is_primed());
    }
}
