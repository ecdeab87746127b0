//! Interaural cues from source azimuth
//!
//! Positive azimuth puts the source on the right, which makes the left ear
//! the far ear: it gets the interaural delay, the level reduction and the
//! stronger head shadow.

use std::f32::consts::FRAC_PI_2;

/// Head radius used by the Woodworth model, in meters
pub const HEAD_RADIUS_M: f32 = 0.0875;
pub const SPEED_OF_SOUND: f32 = 343.0;
/// Upper bound on the interaural delay, in samples
pub const MAX_ITD_SAMPLES: f32 = 32.0;

const MAX_ILD: f32 = 0.6;
const MAX_REAR_ATTENUATION: f32 = 0.3;

/// Per-ear delay, gain and head-shadow amount for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinauralCues {
    /// Interaural delay per ear, in samples
    pub delay_l: f32,
    pub delay_r: f32,
    /// Level per ear before distance and master volume
    pub gain_l: f32,
    pub gain_r: f32,
    /// 0 when the source faces the ear, 1 when directly opposite
    pub shadow_l: f32,
    pub shadow_r: f32,
}

/// Woodworth interaural time difference, in seconds
///
/// Rear sources fold onto the front hemisphere: the lateral angle is
/// `asin(|sin az|)`.
pub fn woodworth_itd(azimuth: f32) -> f32 {
    let lateral = azimuth.sin().abs().min(1.0).asin();
    HEAD_RADIUS_M / SPEED_OF_SOUND * (lateral + lateral.sin())
}

pub fn binaural_cues(azimuth: f32, sample_rate: f32) -> BinauralCues {
    let sin_az = azimuth.sin();
    let itd = (woodworth_itd(azimuth) * sample_rate).min(MAX_ITD_SAMPLES);
    let far_gain = 1.0 - MAX_ILD * sin_az.abs();

    let abs_az = azimuth.abs();
    let rear = if abs_az > FRAC_PI_2 {
        1.0 - MAX_REAR_ATTENUATION * (abs_az - FRAC_PI_2) / FRAC_PI_2
    } else {
        1.0
    };

    let (delay_l, delay_r, gain_l, gain_r) = if azimuth > 0.0 {
        (itd, 0.0, far_gain, 1.0)
    } else if azimuth < 0.0 {
        (0.0, itd, 1.0, far_gain)
    } else {
        (0.0, 0.0, 1.0, 1.0)
    };

    // cos of the angle between the source direction and each ear's axis
    // is +sin(az) for the right ear and -sin(az) for the left
    BinauralCues {
        delay_l,
        delay_r,
        gain_l: gain_l * rear,
        gain_r: gain_r * rear,
        shadow_l: (1.0 + sin_az) * 0.5,
        shadow_r: (1.0 - sin_az) * 0.5,
    }
}

/// Head-shadow low-pass cutoff for a shadow amount in [0, 1]
#[inline]
pub fn head_shadow_cutoff(shadow: f32) -> f32 {
    16_000.0 - 14_000.0 * shadow.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const SR: f32 = 48_000.0;

    #[test]
    fn test_on_axis_is_symmetric() {
        let cues = binaural_cues(0.0, SR);
        assert_eq!(cues.delay_l, 0.0);
        assert_eq!(cues.delay_r, 0.0);
        assert_eq!(cues.gain_l, cues.gain_r);
        assert_eq!(cues.gain_l, 1.0);
        assert_eq!(cues.shadow_l, cues.shadow_r);
    }

    #[test]
    fn test_source_right_delays_left_ear() {
        let cues = binaural_cues(FRAC_PI_2, SR);
        assert_eq!(cues.delay_r, 0.0);
        assert!(cues.delay_l > 30.0 && cues.delay_l <= MAX_ITD_SAMPLES);
        assert!((cues.gain_l - 0.4).abs() < 1e-5);
        assert_eq!(cues.gain_r, 1.0);
        assert!((cues.shadow_l - 1.0).abs() < 1e-6);
        assert!(cues.shadow_r.abs() < 1e-6);
    }

    #[test]
    fn test_source_left_mirrors() {
        let right = binaural_cues(0.7, SR);
        let left = binaural_cues(-0.7, SR);
        assert!((right.delay_l - left.delay_r).abs() < 1e-5);
        assert!((right.gain_l - left.gain_r).abs() < 1e-6);
        assert!((right.shadow_l - left.shadow_r).abs() < 1e-6);
    }

    #[test]
    fn test_rear_folds_forward_and_attenuates() {
        let front = binaural_cues(PI / 4.0, SR);
        let back = binaural_cues(3.0 * PI / 4.0, SR);
        assert!((front.delay_l - back.delay_l).abs() < 1e-3);
        assert!((back.gain_r - 0.85).abs() < 1e-5);
        assert!(back.gain_r < front.gain_r);
    }

    #[test]
    fn test_itd_bounds() {
        for i in -100..=100 {
            let az = i as f32 / 100.0 * PI;
            let cues = binaural_cues(az, SR);
            assert!(cues.delay_l <= MAX_ITD_SAMPLES && cues.delay_r <= MAX_ITD_SAMPLES);
            assert!(cues.delay_l >= 0.0 && cues.delay_r >= 0.0);
        }
    }

    #[test]
    fn test_cutoff_range() {
        assert_eq!(head_shadow_cutoff(0.0), 16_000.0);
        assert_eq!(head_shadow_cutoff(1.0), 2_000.0);
    }
}
