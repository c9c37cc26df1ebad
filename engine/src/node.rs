//! Token trie node and oracle choice types.
//!
//! Nodes own their children exclusively. A node is created once, expanded at
//! most once (by the single task that holds its `&mut`), and never mutated
//! after the build returns.

use serde::{Deserialize, Serialize};

/// One alternative returned by the oracle for a single generation step.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenChoice {
    /// Literal token text. Any string is accepted, including empty.
    pub token: String,
    /// log P(token | prefix), natural log.
    pub logprob: f64,
    /// Backend token id, when the oracle reports one.
    pub token_id: Option<u32>,
}

impl TokenChoice {
    pub fn new(token: impl Into<String>, logprob: f64) -> Self {
        TokenChoice {
            token: token.into(),
            logprob,
            token_id: None,
        }
    }
}

/// A node in the token trie.
///
/// Invariants, for every node `n` with parent `p`:
///   `n.total_logprob == p.total_logprob + n.logprob`   (root: 0.0)
///   `n.text == p.text + n.token`                       (root: the prompt)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTreeNode {
    /// Token attributed to this node; empty on the root.
    pub token: String,
    /// log P(token | prefix) for this step; 0 on the root.
    pub logprob: f64,
    /// Sum of `logprob` along the root-to-here path.
    pub total_logprob: f64,
    /// Full decoded text from the prompt through this node.
    pub text: String,
    /// Children in acceptance order (probability-descending at scan time,
    /// never re-sorted afterward).
    pub children: Vec<TokenTreeNode>,
}

impl TokenTreeNode {
    /// Root node for a prompt. Carries no token and zero log-probability.
    pub fn root(prompt: impl Into<String>) -> Self {
        TokenTreeNode {
            token: String::new(),
            logprob: 0.0,
            total_logprob: 0.0,
            text: prompt.into(),
            children: Vec::new(),
        }
    }

    /// Child node for an accepted oracle choice. No token validation.
    pub fn child(choice: &TokenChoice, parent: &TokenTreeNode) -> Self {
        TokenTreeNode {
            token: choice.token.clone(),
            logprob: choice.logprob,
            total_logprob: parent.total_logprob + choice.logprob,
            text: format!("{}{}", parent.text, choice.token),
            children: Vec::new(),
        }
    }

    /// Height of the subtree below this node; a leaf has depth 0.
    pub fn depth(&self) -> usize {
        self.children.iter().map(|c| 1 + c.depth()).max().unwrap_or(0)
    }

    /// Node count of the subtree, this node included.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TokenTreeNode::size).sum::<usize>()
    }
}
