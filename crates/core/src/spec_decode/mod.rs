//! Speculative decoding bookkeeping.
//!
//! Per decode step, a draft proposer builds a [`SpeculativeTree`] of
//! candidate future tokens, expands it with scored candidates, and hands
//! every root-to-leaf path to the verifier. After verification the tree is
//! pruned to the accepted depth, and [`AcceptanceStats`] records which
//! positions survived so [`AcceptanceStats::get_optimal_depth`] can size
//! the next step's tree.
//!
//! The draft and target models themselves live outside this crate;
//! [`EagleConfig`] is the immutable configuration value their proposer
//! consumes.

pub mod acceptance;
pub mod eagle;
pub mod tree;

pub use acceptance::{AcceptanceSnapshot, AcceptanceStats};
pub use eagle::{EagleConfig, EagleConfigError, EagleMethod, KvDtype};
pub use tree::{NodeId, SpeculativeTree, TreeNode};
