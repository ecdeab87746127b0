//! Stateless stereo mixing

/// Add `src` into the front of `dest`, sample by sample
///
/// Returns the number of samples mixed.
#[inline]
pub fn mix_into(dest: &mut [f32], src: &[f32]) -> usize {
    let n = dest.len().min(src.len());
    for (d, s) in dest[..n].iter_mut().zip(&src[..n]) {
        *d += s;
    }
    n
}

/// Largest magnitude the mixer emits; `tanh` rounds to 1.0 in f32 past ~9
const MAX_OUTPUT: f32 = 1.0 - f32::EPSILON;

/// Bound every sample strictly inside full scale with `tanh`
#[inline]
pub fn soft_saturate(buffer: &mut [f32]) {
    for sample in buffer {
        *sample = sample.tanh().clamp(-MAX_OUTPUT, MAX_OUTPUT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_mix_is_additive() {
        let mut dest = vec![0.5, 0.25, 0.125];
        assert_eq!(mix_into(&mut dest, &[1.0, -1.0]), 2);
        assert_eq!(dest, vec![1.5, -0.75, 0.125]);
    }

    #[test]
    fn test_saturation_is_odd_and_small_signal_transparent() {
        let mut buf = vec![0.01, -0.01, 0.0];
        soft_saturate(&mut buf);
        assert!((buf[0] - 0.01).abs() < 1e-5);
        assert_eq!(buf[0], -buf[1]);
        assert_eq!(buf[2], 0.0);
    }

    #[test]
    fn test_many_full_scale_sines_stay_below_full_scale() {
        let frames = 480;
        let mut dest = vec![0.0f32; frames * 2];

        for peer in 0..8 {
            let freq = 110.0 * (peer + 1) as f32;
            let block: Vec<f32> = (0..frames)
                .flat_map(|i| {
                    let s = (2.0 * PI * freq * i as f32 / 48_000.0).sin();
                    [s, s]
                })
                .collect();
            mix_into(&mut dest, &block);
        }
        soft_saturate(&mut dest);

        assert!(dest.iter().all(|s| s.abs() < 1.0));
    }

    #[test]
    fn test_in_phase_peers_never_reach_full_scale() {
        let frames = 480;
        let mut dest = vec![0.0f32; frames * 2];
        let block: Vec<f32> = (0..frames)
            .flat_map(|i| {
                let s = (2.0 * PI * 100.0 * i as f32 / 48_000.0).sin();
                [s, s]
            })
            .collect();

        for _ in 0..32 {
            mix_into(&mut dest, &block);
        }
        soft_saturate(&mut dest);

        let peak = dest.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak < 1.0, "peak {}", peak);
        assert!(peak > 0.99);
    }

    #[test]
    fn test_huge_values_clamp_symmetrically() {
        let mut buf = vec![1e6, -1e6, f32::MAX];
        soft_saturate(&mut buf);
        assert!(buf[0] < 1.0);
        assert_eq!(buf[0], -buf[1]);
        assert_eq!(buf[2], buf[0]);
    }
}
