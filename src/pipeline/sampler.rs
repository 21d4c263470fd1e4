//! Rotating skip counter for the sampling gate.
//!
//! Every Nth item that reaches the gate is skipped. After each skip, N is
//! drawn again uniformly from the configured range so the cadence never
//! settles into a fixed pattern.

use rand::Rng;

/// Inclusive bounds for the skip interval N.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingRange {
    pub min: u32,
    pub max: u32,
}

impl SamplingRange {
    /// Both bounds are clamped to at least 1 and ordered.
    pub fn new(min: u32, max: u32) -> Self {
        let min = min.max(1);
        let max = max.max(min);
        Self { min, max }
    }
}

#[derive(Debug)]
pub struct Sampler {
    range: Option<SamplingRange>,
    counter: u32,
    next_skip: u32,
}

impl Sampler {
    pub fn new<R: Rng + ?Sized>(range: Option<SamplingRange>, rng: &mut R) -> Self {
        let next_skip = range.map(|r| draw(r, rng)).unwrap_or(0);
        Self {
            range,
            counter: 0,
            next_skip,
        }
    }

    /// Advance the counter for one item. Returns `true` if it must be skipped.
    pub fn should_skip<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        let Some(range) = self.range else {
            return false;
        };

        self.counter += 1;
        if self.counter >= self.next_skip {
            self.counter = 0;
            self.next_skip = draw(range, rng);
            true
        } else {
            false
        }
    }

    /// Items remaining until the next skip (for diagnostics).
    pub fn until_next_skip(&self) -> Option<u32> {
        self.range.map(|_| self.next_skip - self.counter)
    }
}

fn draw<R: Rng + ?Sized>(range: SamplingRange, rng: &mut R) -> u32 {
    rng.gen_range(range.min..=range.max)
}
