//! Google Generative Language backend.
//!
//! `sample_next` asks for exactly one output token with `responseLogprobs`
//! enabled and reads the alternatives out of
//! `logprobsResult.topCandidates[0].candidates`. The same endpoint also
//! powers [`GeminiSampler::trace`]: one full generation reported step by
//! step with its top-K candidates.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::{json, Value};

use trellis_engine::node::TokenChoice;
use trellis_engine::sampler::{SampleOptions, Sampler, SamplerError};

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

fn missing_logprob() -> f64 {
    1e-9_f64.ln()
}

/// Sampler backed by the Generative Language `generateContent` REST call.
pub struct GeminiSampler {
    api_key: String,
    model: String,
    endpoint: String,
    client: Client,
}

impl GeminiSampler {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, SamplerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| SamplerError::Transport(e.to_string()))?;
        Ok(GeminiSampler {
            api_key: api_key.into(),
            model: model.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            client,
        })
    }

    /// Point at a different API root (self-hosted proxy, mock server).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    fn generate(&self, body: &Value) -> Result<Value, SamplerError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.endpoint, self.model, self.api_key
        );
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .map_err(|e| SamplerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(SamplerError::Transport(format!(
                "gemini returned {status}: {text}"
            )));
        }
        response
            .json()
            .map_err(|e| SamplerError::Protocol(e.to_string()))
    }

    /// One full generation; reports the top-K candidates at every step.
    pub fn trace(&self, input: &str, top_k: usize) -> Result<GenerationTrace, SamplerError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": input }] }],
            "generationConfig": {
                "responseLogprobs": true,
                "logprobs": top_k,
            },
        });
        let response = self.generate(&body)?;
        parse_trace(&response)
    }
}

impl Sampler for GeminiSampler {
    fn sample_next(
        &self,
        prefix: &str,
        opts: &SampleOptions,
    ) -> Result<Vec<TokenChoice>, SamplerError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prefix }] }],
            "generationConfig": {
                "maxOutputTokens": 1,
                "temperature": opts.temperature,
                "responseLogprobs": true,
                "logprobs": opts.top_k,
            },
        });
        let response = self.generate(&body)?;
        parse_generate_content(&response, opts.top_k)
    }
}

/// Extract the first step's top-K alternatives from a `generateContent` body.
pub fn parse_generate_content(body: &Value, top_k: usize) -> Result<Vec<TokenChoice>, SamplerError> {
    let result = body.pointer("/candidates/0/logprobsResult");
    let alternatives = result
        .and_then(|r| r.pointer("/topCandidates/0/candidates"))
        .and_then(Value::as_array)
        .filter(|entries| !entries.is_empty());
    let chosen = result
        .and_then(|r| r.pointer("/chosenCandidates/0"))
        .map(candidate_choice);

    if let Some(alternatives) = alternatives {
        let mut choices: Vec<TokenChoice> =
            alternatives.iter().take(top_k).map(candidate_choice).collect();
        // Some responses leave the chosen token out of the alternatives.
        if let Some(chosen) = chosen {
            if !choices.iter().any(|c| c.token == chosen.token) {
                choices.insert(0, chosen);
                choices.truncate(top_k);
            }
        }
        return Ok(choices);
    }

    // No alternatives at all: fall back to the chosen token, then to the
    // plain output text, so the tree can still proceed one step.
    if let Some(chosen) = chosen.filter(|c| !c.token.is_empty()) {
        return Ok(vec![chosen]);
    }
    let text = body
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if text.is_empty() {
        return Err(SamplerError::Protocol(
            "no logprobs and no output text in response".into(),
        ));
    }
    log::debug!("gemini response carried no logprobs; using output text");
    Ok(vec![TokenChoice::new(text, missing_logprob())])
}

fn candidate_choice(value: &Value) -> TokenChoice {
    // REST bodies use a plain string token; older SDK captures nest it
    // under token.text.
    let token = value
        .get("token")
        .and_then(|t| {
            t.as_str()
                .map(str::to_string)
                .or_else(|| t.pointer("/text").and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_default();
    let logprob = value
        .get("logProbability")
        .or_else(|| value.get("logprob"))
        .and_then(Value::as_f64)
        .unwrap_or_else(missing_logprob);
    let token_id = value
        .get("tokenId")
        .and_then(Value::as_u64)
        .map(|id| id as u32);
    TokenChoice { token, logprob, token_id }
}

/// One generated step of a linear trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStep {
    pub step: usize,
    pub candidates: Vec<TraceCandidate>,
}

/// One candidate within a trace step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceCandidate {
    pub token: String,
    pub log_probability: f64,
    pub probability: f64,
}

/// A full generation with per-step candidate probabilities.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationTrace {
    pub output_text: String,
    pub probability_tree: Vec<TraceStep>,
}

/// Build a linear trace from a `generateContent` body.
pub fn parse_trace(body: &Value) -> Result<GenerationTrace, SamplerError> {
    let output_text = body
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let probability_tree = body
        .pointer("/candidates/0/logprobsResult/topCandidates")
        .and_then(Value::as_array)
        .map(|steps| {
            steps
                .iter()
                .enumerate()
                .map(|(step, entry)| TraceStep {
                    step,
                    candidates: entry
                        .get("candidates")
                        .and_then(Value::as_array)
                        .map(|cands| {
                            cands
                                .iter()
                                .map(|c| {
                                    let choice = candidate_choice(c);
                                    TraceCandidate {
                                        probability: choice.logprob.exp(),
                                        token: choice.token,
                                        log_probability: choice.logprob,
                                    }
                                })
                                .collect()
                        })
                        .unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(GenerationTrace { output_text, probability_tree })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with_alternatives() -> Value {
        json!({
            "candidates": [{
                "content": { "parts": [{ "text": " Paris" }] },
                "logprobsResult": {
                    "chosenCandidates": [
                        { "token": " Paris", "logProbability": -0.05, "tokenId": 7 }
                    ],
                    "topCandidates": [{
                        "candidates": [
                            { "token": " Paris", "logProbability": -0.05, "tokenId": 7 },
                            { "token": " Lyon", "logProbability": -3.2 }
                        ]
                    }]
                }
            }]
        })
    }

    #[test]
    fn test_parse_top_candidates() {
        let choices = parse_generate_content(&response_with_alternatives(), 5).unwrap();
        assert_eq!(choices.len(), 2);
        assert_eq!(choices[0].token, " Paris");
        assert_eq!(choices[0].token_id, Some(7));
        assert!((choices[0].logprob + 0.05).abs() < 1e-12);
        assert_eq!(choices[1].token, " Lyon");
    }

    #[test]
    fn test_chosen_token_prepended_when_missing_from_alternatives() {
        let body = json!({
            "candidates": [{
                "logprobsResult": {
                    "chosenCandidates": [{ "token": " Nice", "logProbability": -0.4 }],
                    "topCandidates": [{
                        "candidates": [{ "token": " Lyon", "logProbability": -1.0 }]
                    }]
                }
            }]
        });
        let choices = parse_generate_content(&body, 5).unwrap();
        assert_eq!(choices[0].token, " Nice");
        assert_eq!(choices[1].token, " Lyon");
    }

    #[test]
    fn test_fallback_to_output_text() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": " Paris" }] } }]
        });
        let choices = parse_generate_content(&body, 5).unwrap();
        assert_eq!(choices.len(), 1);
        assert_eq!(choices[0].token, " Paris");
    }

    #[test]
    fn test_missing_everything_is_protocol_error() {
        let body = json!({ "candidates": [] });
        assert!(matches!(
            parse_generate_content(&body, 5),
            Err(SamplerError::Protocol(_))
        ));
    }

    #[test]
    fn test_sdk_nested_token_text_shape() {
        let body = json!({
            "candidates": [{
                "logprobsResult": {
                    "topCandidates": [{
                        "candidates": [{ "token": { "text": " Paris" }, "logprob": -0.2 }]
                    }]
                }
            }]
        });
        let choices = parse_generate_content(&body, 5).unwrap();
        assert_eq!(choices[0].token, " Paris");
        assert!((choices[0].logprob + 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_trace_steps_and_probabilities() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [{ "text": " Paris is" }] },
                "logprobsResult": {
                    "topCandidates": [
                        { "candidates": [{ "token": " Paris", "logProbability": -0.1 }] },
                        { "candidates": [
                            { "token": " is", "logProbability": -0.3 },
                            { "token": " was", "logProbability": -2.0 }
                        ]}
                    ]
                }
            }]
        });
        let trace = parse_trace(&body).unwrap();
        assert_eq!(trace.output_text, " Paris is");
        assert_eq!(trace.probability_tree.len(), 2);
        assert_eq!(trace.probability_tree[1].step, 1);
        assert_eq!(trace.probability_tree[1].candidates.len(), 2);
        let candidate = &trace.probability_tree[1].candidates[0];
        assert!((candidate.probability - (-0.3_f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_trace_without_logprobs_is_empty_not_an_error() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "hello" }] } }]
        });
        let trace = parse_trace(&body).unwrap();
        assert_eq!(trace.output_text, "hello");
        assert!(trace.probability_tree.is_empty());
    }
}
