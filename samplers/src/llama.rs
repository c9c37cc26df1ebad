//! llama.cpp completion-server backend.
//!
//! Talks to the `/completion` endpoint: one predicted token with `n_probs`
//! alternatives. The probability list has moved between field names across
//! server builds, so extraction walks the known spellings before falling
//! back to the completion content itself.

use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::{json, Value};

use trellis_engine::node::TokenChoice;
use trellis_engine::sampler::{SampleOptions, Sampler, SamplerError};

/// Log-probability assigned when the server reports a token without one.
fn missing_logprob() -> f64 {
    1e-9_f64.ln()
}

/// Sampler backed by a llama.cpp server's `/completion` endpoint.
pub struct LlamaServerSampler {
    base_url: String,
    client: Client,
}

impl LlamaServerSampler {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:8080`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, SamplerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| SamplerError::Transport(e.to_string()))?;
        let base = base_url.into();
        Ok(LlamaServerSampler {
            base_url: base.trim_end_matches('/').to_string(),
            client,
        })
    }
}

impl Sampler for LlamaServerSampler {
    fn sample_next(
        &self,
        prefix: &str,
        opts: &SampleOptions,
    ) -> Result<Vec<TokenChoice>, SamplerError> {
        let body = json!({
            "prompt": prefix,
            "temperature": opts.temperature,
            // One token forward is enough; branching happens in the engine.
            "n_predict": 1,
            "n_probs": opts.top_k,
            // A cached prefix can shift the reported probabilities between
            // otherwise identical runs.
            "cache_prompt": false,
            "seed": -1,
        });

        let response = self
            .client
            .post(format!("{}/completion", self.base_url))
            .json(&body)
            .send()
            .map_err(|e| SamplerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(SamplerError::Transport(format!(
                "llama server returned {status}: {text}"
            )));
        }

        let body: Value = response
            .json()
            .map_err(|e| SamplerError::Protocol(e.to_string()))?;
        parse_completion(&body, opts.top_k)
    }
}

/// Extract top-K alternatives from a `/completion` response body.
pub fn parse_completion(body: &Value, top_k: usize) -> Result<Vec<TokenChoice>, SamplerError> {
    let top = body
        .pointer("/completion_probabilities/0/top_logprobs")
        .or_else(|| body.pointer("/tokens/0/top_logprobs"))
        .or_else(|| body.pointer("/top_probs/0"))
        .and_then(Value::as_array)
        .filter(|entries| !entries.is_empty());

    let Some(top) = top else {
        // Servers built without probability output still return the token.
        let token = body
            .get("content")
            .or_else(|| body.get("completion"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if token.is_empty() {
            return Err(SamplerError::Protocol(
                "no probability list and no completion content".into(),
            ));
        }
        log::debug!("llama response carried no probability list; using completion content");
        return Ok(vec![TokenChoice::new(token, missing_logprob())]);
    };

    let choices = top
        .iter()
        .take(top_k)
        .map(|entry| {
            let token = entry
                .get("token")
                .or_else(|| entry.get("text"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let logprob = entry
                .get("logprob")
                .and_then(Value::as_f64)
                .unwrap_or_else(missing_logprob);
            let token_id = entry.get("id").and_then(Value::as_u64).map(|id| id as u32);
            TokenChoice { token, logprob, token_id }
        })
        .collect();
    Ok(choices)
}
