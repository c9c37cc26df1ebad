//! Oracle backends for the trellis engine.
//!
//! Two HTTP implementations of the engine's `Sampler` trait: a local
//! llama.cpp completion server and the Google Generative Language API.
//! Response parsing is split out of the transport so it stays testable
//! against canned bodies.

pub mod gemini;
pub mod llama;
