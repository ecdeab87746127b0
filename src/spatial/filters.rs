//! One-pole filters and parameter smoothing

use std::f32::consts::PI;

/// Exponential smoother stepped once per sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smoothed {
    pub current: f32,
    pub target: f32,
}

impl Smoothed {
    pub fn new(value: f32) -> Self {
        Self {
            current: value,
            target: value,
        }
    }

    /// Per-sample coefficient for a time constant in milliseconds
    pub fn coefficient(time_ms: f32, sample_rate: f32) -> f32 {
        let samples = (time_ms * 0.001 * sample_rate).max(1.0);
        1.0 - (-1.0 / samples).exp()
    }

    #[inline]
    pub fn set(&mut self, target: f32) {
        self.target = target;
    }

    /// Jump straight to `value`
    #[inline]
    pub fn snap(&mut self, value: f32) {
        self.current = value;
        self.target = value;
    }

    #[inline]
    pub fn step(&mut self, coeff: f32) -> f32 {
        self.current += (self.target - self.current) * coeff;
        self.current
    }
}

/// `y = alpha * x + (1 - alpha) * y`; alpha 1.0 passes the input through
#[derive(Debug, Clone, Default)]
pub struct OnePoleLowPass {
    state: f32,
}

impl OnePoleLowPass {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn process(&mut self, input: f32, alpha: f32) -> f32 {
        self.state = alpha * input + (1.0 - alpha) * self.state;
        self.state
    }

    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}

/// Bilinear-transform one-pole low-pass with a movable cutoff
#[derive(Debug, Clone)]
pub struct HeadShadowFilter {
    b0: f32,
    a1: f32,
    x1: f32,
    y1: f32,
}

impl Default for HeadShadowFilter {
    fn default() -> Self {
        Self {
            b0: 1.0,
            a1: 0.0,
            x1: 0.0,
            y1: 0.0,
        }
    }
}

impl HeadShadowFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute coefficients; filter memory is kept
    pub fn set_cutoff(&mut self, cutoff_hz: f32, sample_rate: f32) {
        let fc = cutoff_hz.clamp(20.0, sample_rate * 0.45);
        let g = (PI * fc / sample_rate).tan();
        self.b0 = g / (1.0 + g);
        self.a1 = (g - 1.0) / (1.0 + g);
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let out = self.b0 * (input + self.x1) - self.a1 * self.y1;
        self.x1 = input;
        self.y1 = out;
        out
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}
