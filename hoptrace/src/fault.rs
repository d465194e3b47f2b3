// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! Fault injection for storage writes.
//!
//! A storage write asks its [`Fault`] once before issuing the call. When the fault fires the write is
//! redirected to [`FAULT_BUCKET`], which does not exist, so the store fails the call on its own and the
//! failure travels the same reporting path as a real one. The payload is never touched.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

/// Bucket a faulted write is redirected to.
pub const FAULT_BUCKET: &str = "wrong-bucket-name";
/// Draws are taken uniformly from `0..FAULT_RANGE`.
pub const FAULT_RANGE: u32 = 15;
/// The draw that fires a fault.
pub const FAULT_SENTINEL: u32 = 1;

/// Decides whether the next storage write fails.
pub trait Fault: Send {
    /// Consumes one decision.
    fn inject(&mut self) -> bool;
}

impl<F: Fault + ?Sized> Fault for Box<F> {
    fn inject(&mut self) -> bool {
        (**self).inject()
    }
}

/// Fires when a uniform draw from `0..range` equals `sentinel`, i.e. with probability `1 / range`.
#[derive(Debug, Clone)]
pub struct RandomFault<R = StdRng> {
    rng: R,
    range: u32,
    sentinel: u32,
}

impl RandomFault<StdRng> {
    /// Seeds the generator from the wall clock. Every process gets its own sequence.
    pub fn from_clock() -> Self {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or_default();
        Self::with_seed(nanos)
    }

    /// Fixed seed, reproducible sequence.
    pub fn with_seed(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> RandomFault<R> {
    /// Wraps a generator with the default `1 / 15` rate.
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            range: FAULT_RANGE,
            sentinel: FAULT_SENTINEL,
        }
    }

    /// Set the draw range and the firing value.
    ///
    /// A zero range falls back to [`FAULT_RANGE`]. A sentinel outside the range is clamped to its
    /// last value, so the rate stays `1 / range`.
    pub fn with_range(mut self, range: u32, sentinel: u32) -> Self {
        self.range = if range == 0 { FAULT_RANGE } else { range };
        self.sentinel = sentinel.min(self.range - 1);
        self
    }

    /// Draw range.
    pub fn range(&self) -> u32 {
        self.range
    }

    /// Value that fires the fault.
    pub fn sentinel(&self) -> u32 {
        self.sentinel
    }
}

impl<R: Rng + Send> Fault for RandomFault<R> {
    fn inject(&mut self) -> bool {
        self.rng.gen_range(0..self.range) == self.sentinel
    }
}

/// Never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverFault;

impl Fault for NeverFault {
    fn inject(&mut self) -> bool {
        false
    }
}

/// Replays a fixed list of decisions, then never fires again.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFault {
    script: VecDeque<bool>,
}

impl ScriptedFault {
    /// Decisions in the order they will be returned.
    pub fn new(script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    /// Fires on the first write only.
    pub fn once() -> Self {
        Self::new([true])
    }

    /// Decisions not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Fault for ScriptedFault {
    fn inject(&mut self) -> bool {
        self.script.pop_front().unwrap_or(false)
    }
}
