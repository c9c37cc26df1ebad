//! JSON artifact consumed by the visualization layer.
//!
//! The document embeds the build parameters alongside the tree so a viewer
//! can label its output without re-reading the build invocation. Field names
//! are camelCase on the wire; floats round-trip exactly through serde_json's
//! shortest-representation formatting.

use serde::{Deserialize, Serialize};

use crate::expand::BuildConfig;
use crate::node::TokenTreeNode;

/// Serialized build output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeArtifact {
    pub max_depth: usize,
    pub top_k_per_step: usize,
    pub temperature: f64,
    pub prompt: String,
    pub tree: TokenTreeNode,
}

impl TreeArtifact {
    pub fn new(config: &BuildConfig, prompt: impl Into<String>, tree: TokenTreeNode) -> Self {
        TreeArtifact {
            max_depth: config.max_depth,
            top_k_per_step: config.top_k_per_step,
            temperature: config.temperature,
            prompt: prompt.into(),
            tree,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::build_token_tree;
    use crate::scripted::ScriptedSampler;

    fn sample_artifact() -> TreeArtifact {
        let sampler = ScriptedSampler::from_probs(&[("a", 0.9), ("b", 0.1)]);
        let config = BuildConfig {
            max_depth: 2,
            top_k_per_step: 2,
            beam_width: None,
            min_branch_prob: None,
            top_p_mass: None,
            temperature: 0.0,
        };
        let build = build_token_tree(&sampler, "Hi", &config, |_| false).unwrap();
        TreeArtifact::new(&config, "Hi", build.root)
    }

    #[test]
    fn test_round_trip_is_exact() {
        let artifact = sample_artifact();
        let json = artifact.to_json().unwrap();
        let parsed = TreeArtifact::from_json(&json).unwrap();

        assert_eq!(parsed, artifact);
        // Bit-exact floats, not just approximate equality.
        assert_eq!(
            parsed.tree.children[0].logprob.to_bits(),
            artifact.tree.children[0].logprob.to_bits()
        );
        assert_eq!(
            parsed.tree.children[0].children[1].total_logprob.to_bits(),
            artifact.tree.children[0].children[1].total_logprob.to_bits()
        );
    }

    #[test]
    fn test_wire_field_names_are_camel_case() {
        let json = sample_artifact().to_json().unwrap();
        assert!(json.contains("\"maxDepth\""));
        assert!(json.contains("\"topKPerStep\""));
        assert!(json.contains("\"totalLogprob\""));
        assert!(!json.contains("\"total_logprob\""));
    }

    #[test]
    fn test_strings_survive_byte_for_byte() {
        let mut artifact = sample_artifact();
        artifact.prompt = "caf\u{e9} \n\t \"quoted\" \u{1f600}".to_string();
        artifact.tree.text = artifact.prompt.clone();
        let parsed = TreeArtifact::from_json(&artifact.to_json().unwrap()).unwrap();
        assert_eq!(parsed.prompt.as_bytes(), artifact.prompt.as_bytes());
        assert_eq!(parsed.tree.text.as_bytes(), artifact.tree.text.as_bytes());
    }
}
