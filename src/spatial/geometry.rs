//! Listener-relative geometry and distance laws

use crate::protocol::{Pose, Vec3};

/// Source position expressed in the listener's yaw-aligned frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativePosition {
    /// Straight-line distance in world units
    pub distance: f32,
    pub forward: f32,
    pub right: f32,
    /// Horizontal angle in (-PI, PI]; 0 is straight ahead, positive is right
    pub azimuth: f32,
}

/// Project `source` into the frame of `listener`
///
/// Yaw 0 faces +X and positive yaw turns toward +Y.
pub fn relative_position(listener: &Pose, source: Vec3) -> RelativePosition {
    let delta = source - listener.position;
    let (sin_yaw, cos_yaw) = listener.yaw.sin_cos();

    let forward = delta.x * cos_yaw + delta.y * sin_yaw;
    let right = delta.x * sin_yaw - delta.y * cos_yaw;
    let azimuth = if forward == 0.0 && right == 0.0 {
        0.0
    } else {
        right.atan2(forward)
    };

    RelativePosition {
        distance: delta.length(),
        forward,
        right,
        azimuth,
    }
}

/// Cubic Hermite step between two edges
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let span = edge1 - edge0;
    if span <= 0.0 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / span).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Distance gain: 1 inside `inner`, 0 at or beyond `outer`,
/// `(1 - smoothstep)^rolloff` in between
pub fn distance_attenuation(distance: f32, inner: f32, outer: f32, rolloff: f32) -> f32 {
    if distance <= inner {
        1.0
    } else if distance >= outer {
        0.0
    } else {
        let falloff = 1.0 - smoothstep(inner, outer, distance);
        falloff.powf(rolloff.max(MIN_ROLLOFF)).clamp(0.0, 1.0)
    }
}

pub const MIN_ROLLOFF: f32 = 0.1;

/// Reverb send before the configured mix: a floor of 0.15 up close,
/// rising to 1.0 at the outer radius
pub fn reverb_send(distance: f32, inner: f32, outer: f32) -> f32 {
    const FLOOR: f32 = 0.15;
    if distance <= inner {
        FLOOR
    } else {
        FLOOR + smoothstep(inner, outer, distance) * (1.0 - FLOOR)
    }
}

/// One-pole coefficient for air absorption at `distance_m` meters
///
/// 1.0 means no filtering.
pub fn air_absorption_alpha(distance_m: f32) -> f32 {
    if distance_m < 5.0 {
        1.0
    } else {
        (1.0 / (1.0 + 0.008 * distance_m)).clamp(0.15, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    fn listener(yaw: f32) -> Pose {
        Pose::new(Vec3::ZERO, yaw)
    }

    #[test]
    fn test_azimuth_convention() {
        let ahead = relative_position(&listener(0.0), Vec3::new(100.0, 0.0, 0.0));
        assert!(ahead.azimuth.abs() < 1e-6);
        assert!((ahead.distance - 100.0).abs() < 1e-4);

        // Right vector at yaw 0 is (0, -1)
        let right = relative_position(&listener(0.0), Vec3::new(0.0, -100.0, 0.0));
        assert!((right.azimuth - FRAC_PI_2).abs() < 1e-5);

        let left = relative_position(&listener(0.0), Vec3::new(0.0, 100.0, 0.0));
        assert!((left.azimuth + FRAC_PI_2).abs() < 1e-5);

        let behind = relative_position(&listener(0.0), Vec3::new(-100.0, 0.0, 0.0));
        assert!((behind.azimuth.abs() - PI).abs() < 1e-5);
    }

    #[test]
    fn test_yaw_rotates_frame() {
        // Facing +Y, a source at +Y is straight ahead
        let rel = relative_position(&listener(FRAC_PI_2), Vec3::new(0.0, 50.0, 0.0));
        assert!(rel.azimuth.abs() < 1e-5);
        assert!((rel.forward - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_vertical_source_has_zero_azimuth() {
        let rel = relative_position(&listener(1.0), Vec3::new(0.0, 0.0, 300.0));
        assert_eq!(rel.azimuth, 0.0);
        assert!((rel.distance - 300.0).abs() < 1e-4);
    }

    #[test]
    fn test_attenuation_edges() {
        assert_eq!(distance_attenuation(0.0, 1500.0, 8000.0, 1.0), 1.0);
        assert_eq!(distance_attenuation(1500.0, 1500.0, 8000.0, 1.0), 1.0);
        assert_eq!(distance_attenuation(8000.0, 1500.0, 8000.0, 1.0), 0.0);
        assert_eq!(distance_attenuation(9000.0, 1500.0, 8000.0, 1.0), 0.0);

        let mid = distance_attenuation(4750.0, 1500.0, 8000.0, 1.0);
        assert!((mid - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_reverb_send_range() {
        assert!((reverb_send(0.0, 1500.0, 8000.0) - 0.15).abs() < 1e-6);
        assert!((reverb_send(8000.0, 1500.0, 8000.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_air_absorption() {
        assert_eq!(air_absorption_alpha(4.9), 1.0);
        assert!((air_absorption_alpha(10.0) - 1.0 / 1.08).abs() < 1e-6);
        assert_eq!(air_absorption_alpha(100_000.0), 0.15);
    }

    proptest! {
        #[test]
        fn prop_attenuation_monotonic(
            inner in 0.0f32..5000.0,
            span in 1.0f32..10000.0,
            rolloff in 0.1f32..8.0,
            a in 0.0f32..20000.0,
            b in 0.0f32..20000.0,
        ) {
            let outer = inner + span;
            let (near, far) = if a <= b { (a, b) } else { (b, a) };
            let g_near = distance_attenuation(near, inner, outer, rolloff);
            let g_far = distance_attenuation(far, inner, outer, rolloff);
            prop_assert!(g_far <= g_near + 1e-6);
            prop_assert!((0.0..=1.0).contains(&g_near));
        }
    }
}
