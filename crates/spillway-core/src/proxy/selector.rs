//! Provider selection for one request.

use std::time::Instant;

use rand::Rng;

use crate::proxy::registry::BreakerRegistry;

/// Ordered attempt sequence for a single request, consumed lazily by the
/// forward engine.
///
/// With probability `probe_probability`, one currently-open provider is
/// picked uniformly at random and yielded first (half-open probe). The
/// priority walk then yields every provider whose breaker is closed at the
/// moment of the yield, so a breaker that auto-resets mid-cascade becomes
/// immediately eligible. The last-priority provider is always yielded, and
/// no index is yielded twice.
pub struct AttemptPlan<'a> {
    registry: &'a BreakerRegistry,
    len: usize,
    probe: Option<usize>,
    probe_emitted: bool,
    next_index: usize,
}

impl<'a> AttemptPlan<'a> {
    pub fn new<R: Rng>(
        registry: &'a BreakerRegistry,
        probe_probability: f64,
        rng: &mut R,
    ) -> Self {
        let len = registry.len();
        let probe = if probe_probability > 0.0 && rng.gen::<f64>() < probe_probability {
            pick_probe(registry, len, rng)
        } else {
            None
        };

        Self { registry, len, probe, probe_emitted: false, next_index: 0 }
    }

    /// The index chosen for a half-open probe this request, if any.
    pub fn probe(&self) -> Option<usize> {
        self.probe
    }
}

/// Uniform pick over the open breakers, excluding the last-index fallback
/// (which reports closed anyway).
fn pick_probe<R: Rng>(registry: &BreakerRegistry, len: usize, rng: &mut R) -> Option<usize> {
    let now = Instant::now();
    let open: Vec<usize> =
        (0..len.saturating_sub(1)).filter(|&index| registry.is_open(index, now)).collect();
    if open.is_empty() {
        None
    } else {
        Some(open[rng.gen_range(0..open.len())])
    }
}

impl Iterator for AttemptPlan<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if !self.probe_emitted {
            self.probe_emitted = true;
            if let Some(probe) = self.probe {
                return Some(probe);
            }
        }

        while self.next_index < self.len {
            let index = self.next_index;
            self.next_index += 1;

            if Some(index) == self.probe {
                continue;
            }

            let is_last = index + 1 == self.len;
            if is_last || !self.registry.is_open(index, Instant::now()) {
                return Some(index);
            }
        }

        None
    }
}
