//! Schroeder-style stereo reverb
//!
//! Six early-reflection taps plus, per channel, four parallel damped
//! combs feeding two series allpasses. Tunings are the Freeverb values
//! at 44.1 kHz scaled to the running rate; the right channel gets small
//! offsets for width.

const COMB_TUNING: [usize; 4] = [1557, 1617, 1491, 1422];
const COMB_SPREAD_R: [usize; 4] = [23, 17, 31, 13];
const ALLPASS_TUNING: [usize; 2] = [556, 441];
const ALLPASS_SPREAD_R: [usize; 2] = [11, 7];

const COMB_FEEDBACK: f32 = 0.84;
const COMB_DAMPING: f32 = 0.3;
const ALLPASS_GAIN: f32 = 0.5;

/// (delay at 44.1 kHz, left gain, right gain): floor, ceiling, side walls,
/// far and back walls
const EARLY_TAPS: [(usize, f32, f32); 6] = [
    (171, 0.45, 0.45),
    (353, 0.38, 0.38),
    (557, 0.55, 0.22),
    (619, 0.22, 0.55),
    (857, 0.30, 0.28),
    (1187, 0.18, 0.20),
];
const EARLY_LINE_SIZE: usize = 2048;

const EARLY_MIX: f32 = 0.6;
const LATE_MIX: f32 = 0.4;

#[derive(Debug, Clone)]
struct Comb {
    buffer: Vec<f32>,
    index: usize,
    filter_store: f32,
}

impl Comb {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
            filter_store: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.index];
        self.filter_store = output * (1.0 - COMB_DAMPING) + self.filter_store * COMB_DAMPING;
        self.buffer[self.index] = input + self.filter_store * COMB_FEEDBACK;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
        self.filter_store = 0.0;
    }
}

#[derive(Debug, Clone)]
struct Allpass {
    buffer: Vec<f32>,
    index: usize,
}

impl Allpass {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.index];
        self.buffer[self.index] = input + buffered * ALLPASS_GAIN;
        self.index = (self.index + 1) % self.buffer.len();
        buffered - input
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
    }
}

#[derive(Debug, Clone)]
struct Channel {
    combs: Vec<Comb>,
    allpasses: Vec<Allpass>,
}

impl Channel {
    fn new(scale: f32, comb_spread: &[usize], allpass_spread: &[usize]) -> Self {
        let combs = COMB_TUNING
            .iter()
            .zip(comb_spread)
            .map(|(&t, &s)| Comb::new((t as f32 * scale) as usize + s))
            .collect();
        let allpasses = ALLPASS_TUNING
            .iter()
            .zip(allpass_spread)
            .map(|(&t, &s)| Allpass::new((t as f32 * scale) as usize + s))
            .collect();
        Self { combs, allpasses }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let mut late = 0.0;
        for comb in &mut self.combs {
            late += comb.process(input);
        }
        late *= 1.0 / COMB_TUNING.len() as f32;
        for allpass in &mut self.allpasses {
            late = allpass.process(late);
        }
        late
    }

    fn clear(&mut self) {
        self.combs.iter_mut().for_each(Comb::clear);
        self.allpasses.iter_mut().for_each(Allpass::clear);
    }
}

/// Per-peer stereo reverb
#[derive(Debug, Clone)]
pub struct Reverb {
    left: Channel,
    right: Channel,
    early_line: Vec<f32>,
    early_pos: usize,
    early_taps: [(usize, f32, f32); 6],
}

impl Reverb {
    pub fn new(sample_rate: f32) -> Self {
        let scale = sample_rate / 44_100.0;
        let mut early_taps = EARLY_TAPS;
        for tap in &mut early_taps {
            tap.0 = ((tap.0 as f32 * scale) as usize).clamp(1, EARLY_LINE_SIZE - 1);
        }

        Self {
            left: Channel::new(scale, &[0; 4], &[0; 2]),
            right: Channel::new(scale, &COMB_SPREAD_R, &ALLPASS_SPREAD_R),
            early_line: vec![0.0; EARLY_LINE_SIZE],
            early_pos: 0,
            early_taps,
        }
    }

    /// Process one mono sample into a (left, right) wet pair
    #[inline]
    pub fn process(&mut self, input: f32) -> (f32, f32) {
        self.early_line[self.early_pos] = input;

        let mut early_l = 0.0;
        let mut early_r = 0.0;
        for &(delay, gain_l, gain_r) in &self.early_taps {
            let sample = self.early_line[(self.early_pos + EARLY_LINE_SIZE - delay) % EARLY_LINE_SIZE];
            early_l += sample * gain_l;
            early_r += sample * gain_r;
        }
        self.early_pos = (self.early_pos + 1) % EARLY_LINE_SIZE;

        let late_l = self.left.process(input);
        let late_r = self.right.process(input);

        (
            early_l * EARLY_MIX + late_l * LATE_MIX,
            early_r * EARLY_MIX + late_r * LATE_MIX,
        )
    }

    pub fn clear(&mut self) {
        self.left.clear();
        self.right.clear();
        self.early_line.fill(0.0);
        self.early_pos = 0;
    }
}
