//! Eligibility pipeline.
//!
//! Every item that clears the watermark flows through the gates in
//! [`gates`], in order, and ends up with exactly one [`gates::Verdict`].
//! No network I/O happens here; item snapshots are fetched by the engine.

pub mod extract;
pub mod gates;
pub mod history;
pub mod sampler;
