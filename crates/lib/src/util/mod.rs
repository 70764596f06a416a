//! Shared utilities.
//!
//! Content digests used by the server store, the bundle codec and the agent.

pub mod digest;

pub use digest::{Digest, DigestError};
