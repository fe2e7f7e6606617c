//! Sliding-window draft-token acceptance statistics.
//!
//! Tracks how often the target model confirms drafted tokens, both as a
//! global per-batch ratio and per tree depth. Windows are bounded deques:
//! once full, the oldest sample is evicted, so the estimates follow the
//! current workload instead of the lifetime average.
//!
//! One instance lives for the duration of a serving-engine instance and is
//! shared across requests; a single internal lock covers all recording and
//! querying, and every critical section is O(1) arithmetic plus deque
//! maintenance.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

/// Acceptance probability reported before any data has been recorded:
/// an explicit "unknown" prior, deliberately not 0.0 so an empty window
/// does not read as "drafts never survive".
const UNKNOWN_PRIOR: f64 = 0.5;

/// Default number of samples kept per window.
pub const DEFAULT_WINDOW_SIZE: usize = 100;

#[derive(Default)]
struct StatsInner {
    /// Per-batch acceptance ratios, newest at the back.
    global: VecDeque<f64>,
    /// Per tree depth: recent accept/reject outcomes. BTreeMap so depth
    /// scans run in ascending position order.
    per_position: BTreeMap<usize, VecDeque<bool>>,
}

/// Sliding-window estimate of draft-token acceptance probability.
pub struct AcceptanceStats {
    window_size: usize,
    inner: Mutex<StatsInner>,
}

impl Default for AcceptanceStats {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

/// Point-in-time view of the tracked acceptance rates.
#[derive(Debug, Clone, Serialize)]
pub struct AcceptanceSnapshot {
    /// Windowed global acceptance rate.
    pub acceptance_rate: f64,
    /// Number of batches currently in the global window.
    pub num_batches: usize,
    /// `(position, windowed rate)` for every tracked position, ascending.
    pub per_position: Vec<(usize, f64)>,
}

impl AcceptanceStats {
    /// Create a tracker whose windows hold at most `window_size` samples.
    /// A zero size is clamped to 1.
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            inner: Mutex::new(StatsInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatsInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one verification batch: `num_accepted` of `num_proposed`
    /// drafted tokens survived. A batch with nothing proposed is a no-op.
    pub fn record(&self, num_proposed: usize, num_accepted: usize) {
        if num_proposed == 0 {
            return;
        }
        let ratio = num_accepted as f64 / num_proposed as f64;
        let mut inner = self.lock();
        inner.global.push_back(ratio);
        if inner.global.len() > self.window_size {
            inner.global.pop_front();
        }
    }

    /// Record one accept/reject outcome for a tree position.
    pub fn record_position(&self, position: usize, accepted: bool) {
        let mut inner = self.lock();
        let window = inner.per_position.entry(position).or_default();
        window.push_back(accepted);
        if window.len() > self.window_size {
            window.pop_front();
        }
    }

    /// Windowed global acceptance rate; the unknown prior (0.5) when no
    /// batch has been recorded yet.
    pub fn get_acceptance_rate(&self) -> f64 {
        let inner = self.lock();
        mean_ratio(&inner.global)
    }

    /// Windowed acceptance rate for one position; the unknown prior (0.5)
    /// when that position has no data.
    pub fn get_position_acceptance_rate(&self, position: usize) -> f64 {
        let inner = self.lock();
        inner
            .per_position
            .get(&position)
            .map_or(UNKNOWN_PRIOR, |window| mean_bool(window))
    }

    /// Recommend a speculation depth for the next tree.
    ///
    /// Scans tracked positions in ascending order and returns the first
    /// whose windowed rate falls below `min_rate`, clamped to at least 1.
    /// When every tracked position satisfies `min_rate`, returns the
    /// deepest tracked position (untracked gaps count as unknown, not
    /// failing); 1 when nothing is tracked yet.
    pub fn get_optimal_depth(&self, min_rate: f64) -> usize {
        let inner = self.lock();
        let mut deepest = None;
        for (&position, window) in &inner.per_position {
            if mean_bool(window) < min_rate {
                return position.max(1);
            }
            deepest = Some(position);
        }
        deepest.map_or(1, |position| position.max(1))
    }

    /// Serializable view of the current windows, for engine stats.
    pub fn snapshot(&self) -> AcceptanceSnapshot {
        let inner = self.lock();
        AcceptanceSnapshot {
            acceptance_rate: mean_ratio(&inner.global),
            num_batches: inner.global.len(),
            per_position: inner
                .per_position
                .iter()
                .map(|(&position, window)| (position, mean_bool(window)))
                .collect(),
        }
    }
}

fn mean_ratio(window: &VecDeque<f64>) -> f64 {
    if window.is_empty() {
        return UNKNOWN_PRIOR;
    }
    window.iter().sum::<f64>() / window.len() as f64
}

fn mean_bool(window: &VecDeque<bool>) -> f64 {
    if window.is_empty() {
        return UNKNOWN_PRIOR;
    }
    window.iter().filter(|&&accepted| accepted).count() as f64 / window.len() as f64
}
