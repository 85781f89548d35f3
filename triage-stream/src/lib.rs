//! Wire-level envelope for the triage agent's streaming surface.
//!
//! This crate defines only the envelope (session id, node id, monotonic event id) that wraps
//! each `StreamUpdate` emitted by `triage-core`; it does not depend on `triage-core` and knows
//! nothing about pipeline semantics. `triage-core::stream` serializes its own `StreamUpdate`
//! enum and calls [`EnvelopeState::to_json`] to attach the envelope before handing the value to
//! the caller-supplied sink.

pub mod envelope;

pub use envelope::{Envelope, EnvelopeState};
