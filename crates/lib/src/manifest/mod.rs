//! Manifest types.
//!
//! The [`Manifest`] is the server's versioned declaration of the deployments a
//! device should run. [`ManifestResponse`] is its wire form, served to agents as
//! JSON and addressed by the digest of the serialized body.

mod types;
mod wire;

pub use types::*;
pub use wire::*;
