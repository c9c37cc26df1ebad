//! trellis engine - token-tree expansion over a next-token oracle
//!
//! Builds a weighted trie of alternative continuations by repeatedly asking
//! an oracle for the top-K next tokens at every frontier node: one round per
//! depth, concurrent fan-out within a round, and per-node pruning (probability
//! floor, nucleus cutoff, beam cap). The oracle is a trait, so the engine is
//! backend-agnostic and fully testable against a scripted fixture.

pub mod artifact;
pub mod expand;
pub mod node;
pub mod sampler;
pub mod scripted;
