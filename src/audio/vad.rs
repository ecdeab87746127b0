//! Energy-based voice activity detection with a frame-counted hold

use crate::constants::FRAME_DURATION_MS;

/// Root-mean-square level of a block of samples
#[inline]
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Threshold detector that keeps reporting voice for a while after the
/// energy drops, so word endings are not clipped
#[derive(Debug, Clone)]
pub struct VoiceActivityDetector {
    threshold: f32,
    hold_frames: u32,
    hold_remaining: u32,
}

impl VoiceActivityDetector {
    pub fn new(threshold: f32, hold_time_ms: f32) -> Self {
        Self {
            threshold,
            hold_frames: Self::hold_frames_for(hold_time_ms),
            hold_remaining: 0,
        }
    }

    fn hold_frames_for(hold_time_ms: f32) -> u32 {
        (hold_time_ms.max(0.0) / FRAME_DURATION_MS as f32) as u32
    }

    /// Feed one frame's RMS energy; returns whether the frame counts as voice
    pub fn process(&mut self, energy: f32) -> bool {
        if energy > self.threshold {
            self.hold_remaining = self.hold_frames;
            true
        } else if self.hold_remaining > 0 {
            self.hold_remaining -= 1;
            true
        } else {
            false
        }
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Takes effect the next time energy crosses the threshold
    pub fn set_hold_time_ms(&mut self, hold_time_ms: f32) {
        self.hold_frames = Self::hold_frames_for(hold_time_ms);
    }

    pub fn hold_frames(&self) -> u32 {
        self.hold_frames
    }

    pub fn reset(&mut self) {
        self.hold_remaining = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_level() {
        assert_eq!(rms_level(&[]), 0.0);
        assert!((rms_level(&[0.5; 64]) - 0.5).abs() < 1e-6);
        assert!((rms_level(&[1.0, -1.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_hold_counts_whole_frames() {
        let vad = VoiceActivityDetector::new(0.01, 500.0);
        assert_eq!(vad.hold_frames(), 25);

        let vad = VoiceActivityDetector::new(0.01, 50.0);
        assert_eq!(vad.hold_frames(), 2);
    }

    #[test]
    fn test_hold_after_voice() {
        let mut vad = VoiceActivityDetector::new(0.1, 60.0);

        assert!(!vad.process(0.0));
        assert!(vad.process(0.5));
        // Three frames of hold, then silence
        assert!(vad.process(0.0));
        assert!(vad.process(0.0));
        assert!(vad.process(0.0));
        assert!(!vad.process(0.0));
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut vad = VoiceActivityDetector::new(0.1, 0.0);
        assert!(!vad.process(0.1));
        assert!(vad.process(0.1001));
    }

    #[test]
    fn test_reset_clears_hold() {
        let mut vad = VoiceActivityDetector::new(0.1, 500.0);
        assert!(vad.process(1.0));
        vad.reset();
        assert!(!vad.process(0.0));
    }
}
