//! Frontier scheduling, pruning, and the depth driver.
//!
//! One round expands every frontier node at the current depth: the frontier
//! is sorted best-first by cumulative log-probability, optionally capped to
//! the beam width, then fanned out across the rayon pool with one task per
//! node. `collect()` is the fan-in barrier. Each task holds the exclusive
//! `&mut` of its own node, so tasks never contend and completion order
//! cannot show up in the resulting tree.
//!
//! Oracle failures are captured per task and aggregated after the barrier:
//! the failing node keeps zero children, the failure lands in the build
//! report, and every other task in the round proceeds untouched.

use std::cmp::Ordering;

use rayon::prelude::*;
use thiserror::Error;

use crate::node::{TokenChoice, TokenTreeNode};
use crate::sampler::{SampleOptions, Sampler, SamplerError};

/// Build parameters. Validated once, before the first oracle call.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
    /// Number of expansion rounds; each round adds one token of depth.
    pub max_depth: usize,
    /// Alternatives requested from the oracle at every node.
    pub top_k_per_step: usize,
    /// Frontier cap per round. `None` leaves the frontier unbounded; the
    /// worst-case call volume is then `top_k_per_step ^ max_depth`.
    pub beam_width: Option<usize>,
    /// Candidates below this probability are never materialized.
    pub min_branch_prob: Option<f64>,
    /// Stop scanning a node once its accepted probability mass reaches this.
    pub top_p_mass: Option<f64>,
    /// Oracle temperature.
    pub temperature: f64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            max_depth: 10,
            top_k_per_step: 5,
            beam_width: None,
            min_branch_prob: None,
            top_p_mass: Some(0.95),
            temperature: 0.7,
        }
    }
}

/// Rejected build parameters. Fatal: the build never starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("max_depth must be at least 1")]
    ZeroMaxDepth,
    #[error("top_k_per_step must be at least 1")]
    ZeroTopK,
    #[error("beam_width, when set, must be at least 1")]
    ZeroBeamWidth,
    #[error("min_branch_prob must be a probability in (0, 1], got {0}")]
    BadMinBranchProb(f64),
    #[error("top_p_mass must be a probability in (0, 1], got {0}")]
    BadTopPMass(f64),
    #[error("temperature must be finite and non-negative, got {0}")]
    BadTemperature(f64),
}

impl BuildConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth == 0 {
            return Err(ConfigError::ZeroMaxDepth);
        }
        if self.top_k_per_step == 0 {
            return Err(ConfigError::ZeroTopK);
        }
        if self.beam_width == Some(0) {
            return Err(ConfigError::ZeroBeamWidth);
        }
        if let Some(floor) = self.min_branch_prob {
            if !floor.is_finite() || floor <= 0.0 || floor > 1.0 {
                return Err(ConfigError::BadMinBranchProb(floor));
            }
        }
        if let Some(mass) = self.top_p_mass {
            if !mass.is_finite() || mass <= 0.0 || mass > 1.0 {
                return Err(ConfigError::BadTopPMass(mass));
            }
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(ConfigError::BadTemperature(self.temperature));
        }
        Ok(())
    }
}

/// One isolated oracle failure, attributed to the prefix whose call failed.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFailure {
    /// Depth of the node whose call failed (root = 0).
    pub depth: usize,
    /// The node's full text at call time.
    pub prefix: String,
    pub error: SamplerError,
}

/// A completed build: the root plus any isolated failures. The tree is
/// always present; failures only truncate individual branches.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeBuild {
    pub root: TokenTreeNode,
    pub failures: Vec<NodeFailure>,
}

/// A frontier entry, alive only between two rounds.
struct FrontierItem<'t> {
    node: &'t mut TokenTreeNode,
    depth: usize,
}

/// Result of one node's expansion task.
struct NodeOutcome<'t> {
    node: &'t mut TokenTreeNode,
    depth: usize,
    /// Indices into `node.children` that continue into the next round.
    live: Vec<usize>,
    failure: Option<SamplerError>,
}

/// Build the token tree for `prompt` by repeated beam-style expansion.
///
/// `stop_if` must be pure and cheap; it is called once per frontier node per
/// round plus once per accepted candidate. A panic inside it aborts the
/// build. Isolated oracle failures are returned in [`TreeBuild::failures`],
/// never as an `Err`.
pub fn build_token_tree<S, F>(
    sampler: &S,
    prompt: &str,
    config: &BuildConfig,
    stop_if: F,
) -> Result<TreeBuild, ConfigError>
where
    S: Sampler + ?Sized,
    F: Fn(&str) -> bool + Sync,
{
    config.validate()?;

    let opts = SampleOptions {
        top_k: config.top_k_per_step,
        temperature: config.temperature,
    };

    let mut root = TokenTreeNode::root(prompt);
    let mut failures: Vec<NodeFailure> = Vec::new();

    let mut frontier: Vec<FrontierItem<'_>> = vec![FrontierItem {
        node: &mut root,
        depth: 0,
    }];

    for round in 0..config.max_depth {
        // Best prefixes first; the sort is stable, so equal scores keep
        // their arrival order.
        frontier.sort_by(|a, b| {
            b.node
                .total_logprob
                .partial_cmp(&a.node.total_logprob)
                .unwrap_or(Ordering::Equal)
        });
        if let Some(width) = config.beam_width {
            if frontier.len() > width {
                frontier.truncate(width);
            }
        }

        log::debug!("round {}: expanding {} frontier node(s)", round, frontier.len());

        // Fan out one task per node; collect() is the fan-in barrier and
        // preserves frontier order.
        let outcomes: Vec<NodeOutcome<'_>> = frontier
            .into_par_iter()
            .map(|item| expand_node(sampler, item, &opts, config, &stop_if))
            .collect();

        let mut next: Vec<FrontierItem<'_>> = Vec::new();
        for outcome in outcomes {
            let NodeOutcome { node, depth, live, failure } = outcome;
            if let Some(error) = failure {
                log::warn!("oracle call failed at depth {}: {}", depth, error);
                failures.push(NodeFailure {
                    depth,
                    prefix: node.text.clone(),
                    error,
                });
            }
            for (idx, child) in node.children.iter_mut().enumerate() {
                if live.contains(&idx) {
                    next.push(FrontierItem {
                        node: child,
                        depth: depth + 1,
                    });
                }
            }
        }

        frontier = next;
        if frontier.is_empty() {
            break;
        }
    }
    drop(frontier);

    Ok(TreeBuild { root, failures })
}

/// Expand a single frontier node: stop check, oracle call, pruning scan.
fn expand_node<'t, S, F>(
    sampler: &S,
    item: FrontierItem<'t>,
    opts: &SampleOptions,
    config: &BuildConfig,
    stop_if: &F,
) -> NodeOutcome<'t>
where
    S: Sampler + ?Sized,
    F: Fn(&str) -> bool + Sync,
{
    let FrontierItem { node, depth } = item;

    if stop_if(&node.text) {
        return NodeOutcome { node, depth, live: Vec::new(), failure: None };
    }

    let choices = match sampler.sample_next(&node.text, opts) {
        Ok(choices) if choices.is_empty() => {
            let error = SamplerError::Protocol("oracle returned zero choices".into());
            return NodeOutcome { node, depth, live: Vec::new(), failure: Some(error) };
        }
        Ok(choices) => choices,
        Err(error) => {
            return NodeOutcome { node, depth, live: Vec::new(), failure: Some(error) };
        }
    };

    let live = attach_children(node, &choices, config, stop_if);
    NodeOutcome { node, depth, live, failure: None }
}

/// Scan candidates probability-descending and attach the survivors.
///
/// Returns the child indices that continue into the next frontier. The scan
/// is sequential on purpose: both cutoffs depend on the mass accepted so
/// far at this node.
fn attach_children<F>(
    node: &mut TokenTreeNode,
    choices: &[TokenChoice],
    config: &BuildConfig,
    stop_if: &F,
) -> Vec<usize>
where
    F: Fn(&str) -> bool + Sync,
{
    let probs: Vec<f64> = choices.iter().map(|c| c.logprob.exp()).collect();

    // Stable sort: equal probabilities keep the oracle's return order.
    let mut order: Vec<usize> = (0..choices.len()).collect();
    order.sort_by(|&i, &j| probs[j].partial_cmp(&probs[i]).unwrap_or(Ordering::Equal));

    let mut mass = 0.0_f64;
    let mut live: Vec<usize> = Vec::new();
    for i in order {
        let prob = probs[i];

        // Probability-descending scan: the first floor miss means every
        // remaining candidate misses too.
        if let Some(floor) = config.min_branch_prob {
            if prob < floor {
                break;
            }
        }

        let child = TokenTreeNode::child(&choices[i], node);
        mass += prob;

        let idx = node.children.len();
        // A stop-hit child stays in the tree as a terminal leaf; it just
        // never reaches the next frontier.
        let terminal = stop_if(&child.text);
        node.children.push(child);
        if !terminal {
            live.push(idx);
        }

        // The nucleus cutoff fires after every accepted child, terminal or
        // not; the last accepted child is the one that crossed the line.
        if let Some(threshold) = config.top_p_mass {
            if mass >= threshold {
                break;
            }
        }
    }
    live
}
