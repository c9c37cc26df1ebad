//! Deterministic scripted sampler for tests and benches.
//!
//! Replays one fixed choice list at every step, so tree shapes are exactly
//! predictable: with no pruning, `top_k ^ depth` leaves. Prefix-triggered
//! failures make the isolation behavior of the driver testable without a
//! network in sight.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::node::TokenChoice;
use crate::sampler::{SampleOptions, Sampler, SamplerError};

/// Sampler that returns the same choice list for every prefix.
pub struct ScriptedSampler {
    choices: Vec<TokenChoice>,
    /// Prefixes ending with this suffix fail with a transport error.
    fail_suffix: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedSampler {
    pub fn new(choices: Vec<TokenChoice>) -> Self {
        ScriptedSampler {
            choices,
            fail_suffix: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Build from `(token, probability)` pairs; probabilities are converted
    /// to natural-log space.
    pub fn from_probs(pairs: &[(&str, f64)]) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|(token, prob)| TokenChoice::new(*token, prob.ln()))
                .collect(),
        )
    }

    /// Fail any call whose prefix ends with `suffix`.
    pub fn fail_when_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.fail_suffix = Some(suffix.into());
        self
    }

    /// Number of `sample_next` calls so far, across all threads.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Sampler for ScriptedSampler {
    fn sample_next(
        &self,
        prefix: &str,
        opts: &SampleOptions,
    ) -> Result<Vec<TokenChoice>, SamplerError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(suffix) = &self.fail_suffix {
            if prefix.ends_with(suffix.as_str()) {
                return Err(SamplerError::Transport(format!(
                    "scripted failure for prefix {prefix:?}"
                )));
            }
        }
        Ok(self.choices.iter().take(opts.top_k).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_honors_top_k() {
        let sampler = ScriptedSampler::from_probs(&[("a", 0.5), ("b", 0.3), ("c", 0.2)]);
        let opts = SampleOptions { top_k: 2, temperature: 0.0 };
        let choices = sampler.sample_next("p", &opts).unwrap();
        assert_eq!(choices.len(), 2);
        assert_eq!(sampler.calls(), 1);
    }

    #[test]
    fn test_fail_suffix_triggers_transport_error() {
        let sampler = ScriptedSampler::from_probs(&[("a", 1.0)]).fail_when_suffix("!");
        let opts = SampleOptions { top_k: 1, temperature: 0.0 };
        assert!(sampler.sample_next("ok", &opts).is_ok());
        assert!(matches!(
            sampler.sample_next("boom!", &opts),
            Err(SamplerError::Transport(_))
        ));
    }
}
