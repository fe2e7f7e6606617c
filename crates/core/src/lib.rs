//! Per-request control core for an LLM generation engine.
//!
//! Two independent pieces of request bookkeeping live here:
//!
//! - [`parallel`]: fan a single logical `n`-sample request into independent
//!   child completions, aggregate or stream their results, and optionally
//!   narrow the result set via best-of-n scoring.
//! - [`spec_decode`]: build, expand, and prune a speculative-decoding
//!   candidate tree, and track empirical token-acceptance rates to size
//!   future speculation.
//!
//! Token generation itself (model execution, tokenization, sampling math)
//! is the caller's responsibility: the executor feeds
//! [`CompletionOutput`](request::CompletionOutput)s and draft
//! `(token_id, logprob)` candidates into this crate and consumes the
//! aggregated outputs and depth recommendations it produces.

pub mod parallel;
pub mod request;
pub mod sampling;
pub mod spec_decode;
