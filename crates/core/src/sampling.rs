//! Request-level sampling configuration.
//!
//! [`SamplingParams`] describes how a logical generation request is sampled
//! and how many candidate completions it fans out into. The sampling math
//! itself (temperature scaling, top-k/top-p filtering) runs in the model
//! executor; this crate only consumes the fan-out-relevant fields.

use serde::{Deserialize, Serialize};

/// How completion outputs are delivered to the response layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Buffer per-child outputs and deliver the full set once every child
    /// has finished. Default.
    #[default]
    FinalOnly,
    /// Stream each incremental output as it arrives, carrying only the
    /// newly generated suffix.
    Delta,
    /// Stream each incremental output as it arrives, carrying the full
    /// accumulated text so far.
    Cumulative,
}

impl OutputKind {
    /// Whether outputs are forwarded as they arrive instead of buffered.
    pub fn is_streaming(self) -> bool {
        matches!(self, Self::Delta | Self::Cumulative)
    }
}

/// Parameters controlling sampling and fan-out for one logical request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Number of completions to return.
    pub n: usize,
    /// Temperature for logit scaling. 0.0 = greedy, higher = more random.
    pub temperature: f32,
    /// Nucleus sampling threshold (0..1). 1.0 = disabled.
    pub top_p: f32,
    /// Top-K filtering. 0 = disabled.
    pub top_k: u32,
    /// Optional seed for deterministic sampling. None = non-deterministic.
    pub seed: Option<u64>,
    /// Maximum number of tokens to generate per completion.
    pub max_tokens: usize,
    /// Stop strings that end generation when produced.
    pub stop: Vec<String>,
    /// How outputs are delivered (buffered vs. streamed).
    pub output_kind: OutputKind,
    /// Generate `best_of` completions and return the best `n` by
    /// mean per-token logprob. Must be >= `n` when set; None = `n`.
    pub best_of: Option<usize>,
    /// Diversity penalty applied across sibling completions. 0.0 = none.
    pub diversity_penalty: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            n: 1,
            temperature: 1.0,
            top_p: 1.0,
            top_k: 0,
            seed: None,
            max_tokens: 128,
            stop: Vec::new(),
            output_kind: OutputKind::FinalOnly,
            best_of: None,
            diversity_penalty: 0.0,
        }
    }
}

impl SamplingParams {
    /// Number of child completions this request fans out into.
    pub fn num_children(&self) -> usize {
        self.best_of.unwrap_or(self.n)
    }

    /// Whether this request needs parallel-sampling fan-out at all.
    pub fn needs_parallel_sampling(&self) -> bool {
        self.num_children() > 1
    }

    /// Derive the params for the child completion at `index`.
    ///
    /// Each child samples a single completion. When the parent carries a
    /// seed, children get unique derived seeds (`base + index`) so siblings
    /// do not collapse onto identical outputs; unseeded parents produce
    /// unseeded children. Always a fresh copy — child params are never
    /// shared mutable state between siblings.
    pub fn child_params(&self, index: usize) -> SamplingParams {
        SamplingParams {
            n: 1,
            best_of: None,
            seed: self.seed.map(|base| base + index as u64),
            ..self.clone()
        }
    }
}
