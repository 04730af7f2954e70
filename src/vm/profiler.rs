//! Hot-loop profiler: `(func, loop)` hit counters and the tiering threshold
//! gate.

use hashbrown::HashMap;

use crate::consts::HOT_THRESHOLD;

/// A single loop slot's sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HotPathSample {
    pub hit_count: u32,
}

/// Identifies one loop within one function, keyed the way the JIT cache
/// keys its entries too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopKey {
    pub func: u32,
    pub loop_id: u32,
}

/// Counts back-edge hits per `(func, loop)` and reports exactly once when a
/// slot crosses `hot_threshold`.
#[derive(Debug, Default)]
pub struct Profiler {
    samples: HashMap<LoopKey, HotPathSample>,
    hot_threshold: u32,
}

impl Profiler {
    pub fn new(hot_threshold: u32) -> Self {
        Self {
            samples: HashMap::new(),
            hot_threshold,
        }
    }

    /// Increments the `(func, loop)` counter and returns `true` iff it has
    /// just reached `hot_threshold`. The threshold check is `==`, not `>=`,
    /// so it fires exactly once per crossing even if the counter is never
    /// reset by a caller.
    pub fn profile_tick(&mut self, key: LoopKey) -> bool {
        let sample = self.samples.entry(key).or_default();
        sample.hit_count += 1;
        sample.hit_count == self.hot_threshold
    }

    /// Resets a slot's counter to zero, regardless of whether the JIT is
    /// enabled.
    pub fn reset(&mut self, key: LoopKey) {
        if let Some(sample) = self.samples.get_mut(&key) {
            sample.hit_count = 0;
        }
    }

    pub fn sample(&self, key: LoopKey) -> HotPathSample {
        self.samples.get(&key).copied().unwrap_or_default()
    }
}
