//! Oracle contract consumed by the expansion engine.
//!
//! The engine is backend-agnostic: anything that can report top-K next-token
//! alternatives for a text prefix (a local llama.cpp server, a hosted API, a
//! scripted fixture) plugs in through [`Sampler`].

use thiserror::Error;

use crate::node::TokenChoice;

/// Per-call options passed to the oracle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleOptions {
    /// Maximum number of alternatives requested. Always > 0.
    pub top_k: usize,
    /// Model temperature. Always finite and >= 0.
    pub temperature: f64,
}

/// Oracle failure modes. Both are isolated to the node whose call failed;
/// neither aborts the round it occurred in.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SamplerError {
    /// The call failed at the network / HTTP layer.
    #[error("sampler transport failure: {0}")]
    Transport(String),
    /// The oracle responded, but with zero or unparseable alternatives.
    #[error("sampler protocol violation: {0}")]
    Protocol(String),
}

/// Next-token oracle: returns alternatives for the token following `prefix`.
///
/// The returned list is not guaranteed sorted by probability and may hold
/// fewer than `top_k` entries, but never zero. Implementations are called
/// from multiple rayon worker threads within one round, hence the `Sync`
/// bound. Per-call timeouts, if wanted, belong inside the implementation.
pub trait Sampler: Sync {
    fn sample_next(
        &self,
        prefix: &str,
        opts: &SampleOptions,
    ) -> Result<Vec<TokenChoice>, SamplerError>;
}
