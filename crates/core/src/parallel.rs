//! Parallel sampling fan-out and aggregation.
//!
//! A request with `n > 1` or `best_of > 1` is split into independent child
//! completions, one per candidate. The [`ParallelSamplingManager`] owns the
//! registry correlating child request ids to their parents; each
//! [`ParentRequest`] owns the per-request fan-out state and decides, per
//! delivered [`CompletionOutput`], what (if anything) goes back to the
//! response layer.
//!
//! Scheduling of the children is the executor's job: this module only mints
//! child ids and per-child params, routes completion callbacks, and
//! aggregates (or streams) the results under the request's
//! [`OutputKind`](crate::sampling::OutputKind).

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, warn};

use crate::request::CompletionOutput;
use crate::sampling::SamplingParams;

// ─── Errors ───────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ParallelSamplingError {
    #[error("parent request {0} is already registered")]
    DuplicateParent(String),
    #[error("unknown parent request {0}")]
    UnknownParent(String),
    #[error("invalid sampling params: {0}")]
    InvalidParams(String),
    #[error("child index {index} exceeds the {limit} children configured for parent {parent_id}")]
    ChildLimitExceeded {
        parent_id: String,
        index: usize,
        limit: usize,
    },
}

fn validate_params(params: &SamplingParams) -> Result<(), ParallelSamplingError> {
    if params.n < 1 {
        return Err(ParallelSamplingError::InvalidParams(
            "n must be at least 1".to_string(),
        ));
    }
    if params.max_tokens < 1 {
        return Err(ParallelSamplingError::InvalidParams(
            "max_tokens must be at least 1".to_string(),
        ));
    }
    if let Some(bo) = params.best_of {
        if bo < params.n {
            return Err(ParallelSamplingError::InvalidParams(format!(
                "best_of ({bo}) must be greater than or equal to n ({})",
                params.n
            )));
        }
    }
    Ok(())
}

// ─── Result carriers ──────────────────────────────────────────────────────

/// One child completion to hand to the executor.
#[derive(Debug, Clone)]
pub struct ChildRequest {
    /// Content-addressed child id: `"{index}_{parent_id}"`.
    pub child_id: String,
    /// Per-child params: always `n = 1`, seed derived from the parent's
    /// base seed when one is set.
    pub params: SamplingParams,
}

/// What a routed child completion produced for the response layer.
#[derive(Debug, Clone)]
pub struct ParentOutput {
    /// The owning parent request id.
    pub parent_id: String,
    /// Outputs to deliver now. Empty while a buffered request is still
    /// waiting on siblings, or when a duplicate delivery was suppressed.
    pub outputs: Vec<CompletionOutput>,
    /// True once every child of the parent has finished.
    pub finished: bool,
}

// ─── ParentRequest ────────────────────────────────────────────────────────

/// Fan-out state for one logical n / best-of-n request.
pub struct ParentRequest {
    request_id: String,
    sampling_params: SamplingParams,
    /// Child ids still generating.
    child_requests: HashSet<String>,
    /// Every child id minted for this parent, in index order.
    child_ids: Vec<String>,
    /// Latest output per child index. Only consulted under
    /// `OutputKind::FinalOnly`; streaming requests never buffer.
    output_aggregator: Vec<Option<CompletionOutput>>,
    finished_children: usize,
    next_child_index: usize,
    /// Largest completion length seen across children, for engine stats.
    max_num_generation_tokens: usize,
}

impl ParentRequest {
    pub fn new(request_id: String, sampling_params: SamplingParams) -> Self {
        let num_children = sampling_params.num_children();
        Self {
            request_id,
            sampling_params,
            child_requests: HashSet::with_capacity(num_children),
            child_ids: Vec::with_capacity(num_children),
            output_aggregator: (0..num_children).map(|_| None).collect(),
            finished_children: 0,
            next_child_index: 0,
            max_num_generation_tokens: 0,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn sampling_params(&self) -> &SamplingParams {
        &self.sampling_params
    }

    /// Total number of children this parent fans out into (`best_of`, or
    /// `n` when `best_of` is unset).
    pub fn num_children(&self) -> usize {
        self.sampling_params.num_children()
    }

    pub fn finished_children(&self) -> usize {
        self.finished_children
    }

    /// Every child id minted so far, in index order.
    pub fn child_ids(&self) -> &[String] {
        &self.child_ids
    }

    pub fn max_num_generation_tokens(&self) -> usize {
        self.max_num_generation_tokens
    }

    /// Mint the next child id and its derived params.
    ///
    /// Children are minted sequentially; asking for more than the
    /// configured child count is a programmer error and fails fast.
    pub fn get_child_info(
        &mut self,
    ) -> Result<(String, SamplingParams), ParallelSamplingError> {
        let index = self.next_child_index;
        let limit = self.num_children();
        if index >= limit {
            return Err(ParallelSamplingError::ChildLimitExceeded {
                parent_id: self.request_id.clone(),
                index,
                limit,
            });
        }
        self.next_child_index += 1;

        let child_id = format!("{index}_{}", self.request_id);
        self.child_requests.insert(child_id.clone());
        self.child_ids.push(child_id.clone());
        Ok((child_id, self.sampling_params.child_params(index)))
    }

    /// Record one child's output and decide what to emit.
    ///
    /// Returns the outputs to deliver now and whether the parent is done.
    /// Streaming requests pass the output straight through (duplicates for
    /// an already-finished child are suppressed); buffered requests return
    /// nothing until the last child finishes, then the full final list.
    pub fn record_child_output(
        &mut self,
        child_id: &str,
        completion: CompletionOutput,
    ) -> (Vec<CompletionOutput>, bool) {
        // A late or duplicate delivery for a child that already finished.
        let already_finished = !self.child_requests.contains(child_id);

        if completion.finished() && !already_finished {
            self.child_requests.remove(child_id);
            self.finished_children += 1;
        }
        self.max_num_generation_tokens =
            self.max_num_generation_tokens.max(completion.num_tokens());

        let finished = self.child_requests.is_empty();

        if self.sampling_params.output_kind.is_streaming() {
            if already_finished {
                debug!(
                    parent_id = %self.request_id,
                    child_id = %child_id,
                    "suppressing duplicate output for finished child"
                );
                return (Vec::new(), finished);
            }
            return (vec![completion], finished);
        }

        // FinalOnly: buffer by candidate index until every child is done.
        match self.output_aggregator.get_mut(completion.index) {
            Some(slot) => *slot = Some(completion),
            None => {
                warn!(
                    parent_id = %self.request_id,
                    child_id = %child_id,
                    index = completion.index,
                    "completion index out of range; dropping output"
                );
                return (Vec::new(), finished);
            }
        }

        if finished {
            (self.take_final_outputs(), true)
        } else {
            (Vec::new(), false)
        }
    }

    /// Drain the aggregator into the final output list.
    ///
    /// With `best_of > n`, candidates are ranked by mean per-token logprob
    /// (stable sort, ties keep submission order), truncated to `n`, and
    /// re-indexed `0..n` in the new order.
    fn take_final_outputs(&mut self) -> Vec<CompletionOutput> {
        let outputs: Vec<CompletionOutput> = self
            .output_aggregator
            .iter_mut()
            .filter_map(Option::take)
            .collect();

        let n = self.sampling_params.n;
        if !self.sampling_params.best_of.is_some_and(|bo| bo != n) {
            return outputs;
        }

        let mut scored: Vec<(f32, CompletionOutput)> = outputs
            .into_iter()
            .map(|output| (output.compute_score(), output))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored.truncate(n);

        scored
            .into_iter()
            .enumerate()
            .map(|(new_index, (_, mut output))| {
                output.index = new_index;
                output
            })
            .collect()
    }
}

// ─── ParallelSamplingManager ──────────────────────────────────────────────

#[derive(Default)]
struct ManagerState {
    parent_requests: HashMap<String, ParentRequest>,
    child_to_parent: HashMap<String, String>,
}

/// Top-level registry correlating child request ids to parents.
///
/// One instance per serving engine; the two maps are instance state so
/// independent engines (and unit tests) never observe each other. A single
/// coarse lock covers both maps — every entry point is a short
/// read-modify-write, so hold times are bounded by map operations plus the
/// per-parent bookkeeping in [`ParentRequest`].
#[derive(Default)]
pub struct ParallelSamplingManager {
    state: Mutex<ManagerState>,
}

impl ParallelSamplingManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new parent request.
    ///
    /// Fails fast on a duplicate `request_id`: silently overwriting would
    /// orphan the previous parent's children.
    pub fn create_parent(
        &self,
        request_id: &str,
        params: SamplingParams,
    ) -> Result<(), ParallelSamplingError> {
        validate_params(&params)?;
        let mut state = self.lock();
        if state.parent_requests.contains_key(request_id) {
            return Err(ParallelSamplingError::DuplicateParent(
                request_id.to_string(),
            ));
        }
        debug!(
            request_id = %request_id,
            num_children = params.num_children(),
            "registered parallel sampling parent"
        );
        state.parent_requests.insert(
            request_id.to_string(),
            ParentRequest::new(request_id.to_string(), params),
        );
        Ok(())
    }

    /// Mint child ids and per-child params for a registered parent.
    ///
    /// One-shot per parent: a second call would mint ids past the
    /// configured child count and fails with
    /// [`ParallelSamplingError::ChildLimitExceeded`].
    pub fn get_child_requests(
        &self,
        request_id: &str,
    ) -> Result<Vec<ChildRequest>, ParallelSamplingError> {
        let mut state = self.lock();
        let ManagerState {
            parent_requests,
            child_to_parent,
        } = &mut *state;

        let parent = parent_requests
            .get_mut(request_id)
            .ok_or_else(|| ParallelSamplingError::UnknownParent(request_id.to_string()))?;

        let mut children = Vec::with_capacity(parent.num_children());
        for _ in 0..parent.num_children() {
            let (child_id, params) = parent.get_child_info()?;
            child_to_parent.insert(child_id.clone(), request_id.to_string());
            children.push(ChildRequest { child_id, params });
        }
        Ok(children)
    }

    /// Route a completion callback to its owning parent, if any.
    ///
    /// Returns `None` when `request_id` is not a tracked child — the caller
    /// then treats the completion as an ordinary standalone one. Completions
    /// arriving after the parent was released (finished or cancelled) land
    /// on the same path and are silently dropped.
    ///
    /// When the delivery finishes the parent's last child, the parent and
    /// all of its child links are released inside the same critical section,
    /// and the returned [`ParentOutput`] carries the final output list.
    pub fn record_output(
        &self,
        request_id: &str,
        completion: CompletionOutput,
    ) -> Option<ParentOutput> {
        let mut state = self.lock();
        let parent_id = state.child_to_parent.get(request_id)?.clone();

        let (outputs, finished) = match state.parent_requests.get_mut(&parent_id) {
            Some(parent) => parent.record_child_output(request_id, completion),
            None => {
                warn!(
                    child_id = %request_id,
                    parent_id = %parent_id,
                    "child link points at a released parent; dropping output"
                );
                state.child_to_parent.remove(request_id);
                return None;
            }
        };

        if finished {
            if let Some(parent) = state.parent_requests.remove(&parent_id) {
                for child_id in parent.child_ids() {
                    state.child_to_parent.remove(child_id);
                }
                debug!(
                    parent_id = %parent_id,
                    finished_children = parent.finished_children(),
                    max_num_generation_tokens = parent.max_num_generation_tokens(),
                    "parallel sampling parent completed"
                );
            }
        }

        Some(ParentOutput {
            parent_id,
            outputs,
            finished,
        })
    }

    /// Remove a parent and unlink every child id it minted.
    ///
    /// Used for cancellation and explicit release. Child completions that
    /// arrive afterwards hit the untracked-child path in
    /// [`record_output`](Self::record_output) and are dropped, never
    /// resurrected. Returns the removed parent, or `None` if absent.
    pub fn finish_parent(&self, parent_id: &str) -> Option<ParentRequest> {
        let mut state = self.lock();
        let parent = state.parent_requests.remove(parent_id);
        match &parent {
            Some(parent) => {
                for child_id in parent.child_ids() {
                    state.child_to_parent.remove(child_id);
                }
                debug!(parent_id = %parent_id, "released parallel sampling parent");
            }
            None => {
                debug!(parent_id = %parent_id, "finish_parent for unknown parent");
            }
        }
        parent
    }

    /// Number of live parent requests.
    pub fn num_parents(&self) -> usize {
        self.lock().parent_requests.len()
    }

    /// Number of tracked child-to-parent links.
    pub fn num_tracked_children(&self) -> usize {
        self.lock().child_to_parent.len()
    }
}
