use rand::{Error as RandError, Rng, RngCore};

use crate::config::PauseConfig;

/// Linear-congruential generator, `seed' = (a * seed + c) mod 2^32`.
///
/// Reproducible under test while still looking irregular from the outside.
/// Implements [`RngCore`] so it can be handed to anything that takes
/// `impl Rng`.
#[derive(Debug, Clone)]
pub struct Lcg {
    seed: u32,
    state: u32,
    cursor: u64,
}

impl Lcg {
    const A: u32 = 1_664_525;
    const C: u32 = 1_013_904_223;
    const M: f64 = 4_294_967_296.0;

    pub fn new(seed: u32) -> Self {
        Self {
            seed,
            state: seed,
            cursor: 0,
        }
    }

    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Number of steps taken since construction.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    fn step(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(Self::A).wrapping_add(Self::C);
        self.cursor += 1;
        self.state
    }

    /// Next value normalized to `[0, 1)`.
    pub fn next_unit(&mut self) -> f64 {
        f64::from(self.step()) / Self::M
    }
}

impl RngCore for Lcg {
    fn next_u32(&mut self) -> u32 {
        self.step()
    }

    fn next_u64(&mut self) -> u64 {
        let hi = u64::from(self.step());
        let lo = u64::from(self.step());
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.step().to_be_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), RandError> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// Bounded random delays and boundary-aware pauses.
#[derive(Debug, Clone, Copy)]
pub struct TimingModel {
    pub word_pause_ms: u64,
    pub sentence_pause_ms: u64,
}

impl TimingModel {
    pub fn new(pause: &PauseConfig) -> Self {
        Self {
            word_pause_ms: pause.word_ms,
            sentence_pause_ms: pause.sentence_ms,
        }
    }

    /// Uniform sample in `[min, max]`; degenerate ranges return `min`.
    pub fn sample(&self, min: u64, max: u64, rng: &mut impl Rng) -> u64 {
        if min >= max {
            return min;
        }
        rng.gen_range(min..=max)
    }

    /// Extra delay owed after typing `c`.
    pub fn boundary_pause(&self, c: char) -> u64 {
        match c {
            ' ' => self.word_pause_ms,
            '.' | '!' | '?' | '\n' => self.sentence_pause_ms,
            _ => 0,
        }
    }

    /// Length of a "thinking" wait, between half and all of `idle_timeout`.
    pub fn idle_sample(&self, idle_timeout: u64, rng: &mut impl Rng) -> u64 {
        self.sample(idle_timeout / 2, idle_timeout, rng)
    }

    /// `base ± base * ratio`, never below zero.
    pub fn jittered(&self, base: u64, ratio: f64, rng: &mut impl Rng) -> u64 {
        let spread = (base as f64 * ratio.clamp(0.0, 1.0)).round();
        if spread <= 0.0 {
            return base;
        }
        let delta = rng.gen_range(-spread..=spread);
        (base as f64 + delta).max(0.0).round() as u64
    }
}
