//! Per-completion output data.
//!
//! A [`CompletionOutput`] is the executor's report for one candidate
//! completion: accumulated text, token ids, and logprob mass. For parallel
//! sampling it carries the candidate's position (`index`) within the
//! n-sample set.

use serde::{Deserialize, Serialize};

/// Why a completion stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model emitted its end-of-sequence token.
    Eos,
    /// The completion hit its `max_tokens` budget.
    Length,
    /// A stop string or stop token was produced.
    Stop,
    /// The request was cancelled before the completion finished.
    Abort,
}

/// A single candidate completion's accumulated output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOutput {
    /// Position of this candidate within the n-sample set.
    pub index: usize,
    /// Generated text (delta, cumulative, or final — per the request's
    /// output kind).
    pub text: String,
    /// Generated token ids, in order.
    pub token_ids: Vec<u32>,
    /// Sum of per-token log probabilities.
    pub cumulative_logprob: f32,
    /// Set once the completion has finished; None while still generating.
    pub finish_reason: Option<FinishReason>,
    /// Per-token log probabilities, when the request asked for them.
    pub logprobs: Option<Vec<f32>>,
}

impl CompletionOutput {
    /// A fresh, unfinished output at `index` with no tokens yet.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            text: String::new(),
            token_ids: Vec::new(),
            cumulative_logprob: 0.0,
            finish_reason: None,
            logprobs: None,
        }
    }

    /// Whether this completion has finished generating.
    pub fn finished(&self) -> bool {
        self.finish_reason.is_some()
    }

    /// Number of generated tokens.
    pub fn num_tokens(&self) -> usize {
        self.token_ids.len()
    }

    /// Mean per-token log probability, used for best-of-n ranking.
    ///
    /// Defined as 0.0 for an empty token sequence so that scoring a
    /// degenerate candidate is never an error.
    pub fn compute_score(&self) -> f32 {
        if self.token_ids.is_empty() {
            return 0.0;
        }
        self.cumulative_logprob / self.token_ids.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output_with(token_ids: Vec<u32>, cumulative_logprob: f32) -> CompletionOutput {
        CompletionOutput {
            token_ids,
            cumulative_logprob,
            ..CompletionOutput::new(0)
        }
    }

    #[test]
    fn new_output_is_unfinished() {
        let out = CompletionOutput::new(2);
        assert_eq!(out.index, 2);
        assert!(!out.finished());
        assert_eq!(out.num_tokens(), 0);
    }

    #[test]
    fn finished_tracks_finish_reason() {
        let mut out = CompletionOutput::new(0);
        assert!(!out.finished());
        out.finish_reason = Some(FinishReason::Eos);
        assert!(out.finished());
    }

    #[test]
    fn score_is_mean_per_token_logprob() {
        let out = output_with(vec![1, 2, 3, 4], -2.0);
        assert!((out.compute_score() - (-0.5)).abs() < 1e-6);
    }

    #[test]
    fn score_of_empty_output_is_zero() {
        let out = output_with(Vec::new(), -3.0);
        assert_eq!(out.compute_score(), 0.0);
    }

    #[test]
    fn finish_reason_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&FinishReason::Eos).unwrap(),
            "\"eos\""
        );
        assert_eq!(
            serde_json::to_string(&FinishReason::Length).unwrap(),
            "\"length\""
        );
        assert_eq!(
            serde_json::to_string(&FinishReason::Abort).unwrap(),
            "\"abort\""
        );
    }
}
