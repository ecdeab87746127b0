//! Circular delay lines for interaural delay and Doppler resampling

use super::binaural::SPEED_OF_SOUND;

/// Length of each per-ear interaural delay line
pub const ITD_LINE_SIZE: usize = 64;
/// Length of the Doppler resampling line
pub const DOPPLER_LINE_SIZE: usize = 4096;
/// Lag the Doppler read pointer starts at, in samples
pub const DOPPLER_NOMINAL_LAG: usize = 240;

const DOPPLER_MIN_LAG: f64 = 1.0;
const DOPPLER_MAX_LAG: f64 = (DOPPLER_LINE_SIZE - 64) as f64;

pub const MIN_PITCH: f32 = 0.88;
pub const MAX_PITCH: f32 = 1.12;

/// Short delay line read at a fractional delay with linear interpolation
#[derive(Debug, Clone)]
pub struct FractionalDelay {
    buffer: [f32; ITD_LINE_SIZE],
    write_pos: usize,
}

impl Default for FractionalDelay {
    fn default() -> Self {
        Self {
            buffer: [0.0; ITD_LINE_SIZE],
            write_pos: 0,
        }
    }
}

impl FractionalDelay {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % ITD_LINE_SIZE;
    }

    /// Read `delay` samples behind the most recent write
    #[inline]
    pub fn read(&self, delay: f32) -> f32 {
        let delay = delay.clamp(0.0, (ITD_LINE_SIZE - 2) as f32);
        let whole = delay.floor();
        let frac = delay - whole;

        let newest = self.write_pos + ITD_LINE_SIZE - 1;
        let i0 = (newest - whole as usize) % ITD_LINE_SIZE;
        let i1 = (i0 + ITD_LINE_SIZE - 1) % ITD_LINE_SIZE;

        self.buffer[i0] * (1.0 - frac) + self.buffer[i1] * frac
    }

    pub fn clear(&mut self) {
        self.buffer = [0.0; ITD_LINE_SIZE];
        self.write_pos = 0;
    }
}

/// Resampling delay line whose read pointer advances at the pitch ratio
///
/// The read pointer trails the write pointer by between 1 and
/// `DOPPLER_LINE_SIZE - 64` samples.
#[derive(Debug, Clone)]
pub struct DopplerLine {
    buffer: Vec<f32>,
    /// Total samples written, including the initial silent lag
    written: u64,
    read_pos: f64,
}

impl Default for DopplerLine {
    fn default() -> Self {
        Self::new()
    }
}

impl DopplerLine {
    pub fn new() -> Self {
        Self {
            buffer: vec![0.0; DOPPLER_LINE_SIZE],
            written: DOPPLER_NOMINAL_LAG as u64,
            read_pos: 0.0,
        }
    }

    /// Write one sample, advance the reader by `pitch` and read
    #[inline]
    pub fn process(&mut self, sample: f32, pitch: f32) -> f32 {
        self.buffer[(self.written % DOPPLER_LINE_SIZE as u64) as usize] = sample;
        self.written += 1;

        self.read_pos += pitch as f64;
        let write = self.written as f64;
        let lag = (write - self.read_pos).clamp(DOPPLER_MIN_LAG, DOPPLER_MAX_LAG);
        self.read_pos = write - lag;

        self.read_interpolated()
    }

    fn read_interpolated(&self) -> f32 {
        let whole = self.read_pos.floor();
        let frac = (self.read_pos - whole) as f32;
        let i0 = whole as u64;

        let a = self.buffer[(i0 % DOPPLER_LINE_SIZE as u64) as usize];
        let b = self.buffer[((i0 + 1) % DOPPLER_LINE_SIZE as u64) as usize];
        a + (b - a) * frac
    }

    /// Current distance between write and read pointers, in samples
    pub fn lag(&self) -> f64 {
        self.written as f64 - self.read_pos
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.written = DOPPLER_NOMINAL_LAG as u64;
        self.read_pos = 0.0;
    }
}

/// Pitch ratio for a source whose distance changed between two frames
///
/// Distances are in world units; positive radial velocity (receding)
/// lowers the pitch.
pub fn doppler_pitch_ratio(
    prev_distance: f32,
    distance: f32,
    units_per_meter: f32,
    frame_seconds: f32,
    exaggeration: f32,
) -> f32 {
    let velocity = (distance - prev_distance) / units_per_meter / frame_seconds;
    let limit = SPEED_OF_SOUND * 0.8;
    let v = (velocity * exaggeration).clamp(-limit, limit);
    let pitch = SPEED_OF_SOUND / (SPEED_OF_SOUND + v);
    if pitch.is_finite() {
        pitch.clamp(MIN_PITCH, MAX_PITCH)
    } else {
        1.0
    }
}
