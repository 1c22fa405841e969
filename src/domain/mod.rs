//! Domain layer types and invariants.

pub mod block;
pub mod digest;
