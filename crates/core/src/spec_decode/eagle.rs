//! Eagle proposer configuration.
//!
//! Eagle (Extrapolation Algorithm for Greater Language-model Efficiency)
//! drafts future tokens by autoregressing over the base model's hidden
//! states. The proposer itself runs in the model executor; this module
//! only carries its configuration. The config is a plain immutable value:
//! nothing mutates it after construction, so it can be shared across
//! threads freely.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which Eagle variant the draft network implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EagleMethod {
    /// Original EAGLE: feature-level autoregression with one draft layer.
    #[default]
    Eagle1,
    /// EAGLE-2: dynamic draft tree built from draft-model confidence.
    Eagle2,
    /// EAGLE-3: training-time test distribution with multi-layer features.
    Eagle3,
    /// EAGLE-3 variant for LFM-family models.
    Eagle3Lfm,
}

impl EagleMethod {
    /// Whether this is an EAGLE-3 family method.
    pub fn is_eagle3(self) -> bool {
        matches!(self, Self::Eagle3 | Self::Eagle3Lfm)
    }
}

/// Data type the draft network's KV cache and hidden states are kept in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KvDtype {
    F16,
    #[default]
    Bf16,
    F32,
}

#[derive(Debug, Error)]
pub enum EagleConfigError {
    #[error("{field} must be at least 1")]
    FieldTooSmall { field: &'static str },
}

/// Immutable configuration for an Eagle draft proposer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EagleConfig {
    /// Number of tokens to draft per decode step.
    pub num_speculative_tokens: usize,
    /// Maximum sequence length the draft network supports.
    pub max_model_len: usize,
    /// KV cache block size, in tokens.
    pub block_size: usize,
    /// Hidden dimension; must match the base model.
    pub hidden_size: usize,
    /// Data type for draft KV cache and hidden states.
    pub dtype: KvDtype,
    /// Which Eagle variant the draft network implements.
    pub method: EagleMethod,
    /// Capture the draft forward pass in a CUDA graph.
    pub use_cuda_graph: bool,
    /// Verify candidates as a tree (tree attention) instead of a chain.
    pub use_tree_attention: bool,
    /// Largest batch the draft network is sized for.
    pub max_batch_size: usize,
    /// Largest number of tokens per draft forward pass.
    pub max_num_tokens: usize,
    /// Data-parallel rank this proposer serves.
    pub dp_rank: usize,
    /// Base model uses M-RoPE position encoding (multimodal models).
    pub uses_mrope: bool,
    /// EAGLE-3: feed auxiliary hidden states from intermediate base-model
    /// layers into the draft network.
    pub eagle3_use_aux_hidden_state: bool,
}

impl Default for EagleConfig {
    fn default() -> Self {
        Self {
            num_speculative_tokens: 5,
            max_model_len: 4096,
            block_size: 16,
            hidden_size: 4096,
            dtype: KvDtype::Bf16,
            method: EagleMethod::Eagle1,
            use_cuda_graph: true,
            use_tree_attention: false,
            max_batch_size: 256,
            max_num_tokens: 8192,
            dp_rank: 0,
            uses_mrope: false,
            eagle3_use_aux_hidden_state: true,
        }
    }
}

impl EagleConfig {
    /// Check the size fields at the admission boundary.
    pub fn validate(&self) -> Result<(), EagleConfigError> {
        for (field, value) in [
            ("num_speculative_tokens", self.num_speculative_tokens),
            ("max_model_len", self.max_model_len),
            ("block_size", self.block_size),
            ("hidden_size", self.hidden_size),
            ("max_batch_size", self.max_batch_size),
            ("max_num_tokens", self.max_num_tokens),
        ] {
            if value < 1 {
                return Err(EagleConfigError::FieldTooSmall { field });
            }
        }
        Ok(())
    }

    /// Whether the proposer must receive auxiliary hidden states from the
    /// base model (EAGLE-3 methods only).
    pub fn requires_aux_hidden_state(&self) -> bool {
        self.eagle3_use_aux_hidden_state && self.method.is_eagle3()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EagleConfig::default();
        config.validate().unwrap();
        assert_eq!(config.method, EagleMethod::Eagle1);
        assert_eq!(config.num_speculative_tokens, 5);
    }

    #[test]
    fn zero_sized_fields_rejected() {
        let config = EagleConfig {
            block_size: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            EagleConfigError::FieldTooSmall { field: "block_size" }
        ));
    }

    #[test]
    fn eagle3_family_predicate() {
        assert!(!EagleMethod::Eagle1.is_eagle3());
        assert!(!EagleMethod::Eagle2.is_eagle3());
        assert!(EagleMethod::Eagle3.is_eagle3());
        assert!(EagleMethod::Eagle3Lfm.is_eagle3());
    }

    #[test]
    fn aux_hidden_state_only_for_eagle3() {
        let eagle1 = EagleConfig::default();
        assert!(!eagle1.requires_aux_hidden_state());

        let eagle3 = EagleConfig {
            method: EagleMethod::Eagle3,
            ..Default::default()
        };
        assert!(eagle3.requires_aux_hidden_state());

        let eagle3_no_aux = EagleConfig {
            method: EagleMethod::Eagle3,
            eagle3_use_aux_hidden_state: false,
            ..Default::default()
        };
        assert!(!eagle3_no_aux.requires_aux_hidden_state());
    }

    #[test]
    fn method_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&EagleMethod::Eagle1).unwrap(),
            "\"eagle1\""
        );
        assert_eq!(
            serde_json::to_string(&EagleMethod::Eagle3Lfm).unwrap(),
            "\"eagle3_lfm\""
        );
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = EagleConfig {
            method: EagleMethod::Eagle3,
            dtype: KvDtype::F16,
            use_tree_attention: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: EagleConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
