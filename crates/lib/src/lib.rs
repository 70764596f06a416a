//! fleetsync-lib: content-addressed deployment manifests for device fleets
//!
//! - `store`: per-device manifests with versioning and blob storage
//! - `service` and `api`: the HTTP server that edits and serves them
//! - `agent`: the device-side poller that reconciles a local cache
//! - `bundle`: deterministic tar.gz packing of a manifest's descriptors

pub mod agent;
pub mod api;
pub mod bundle;
pub mod conditional;
pub mod config;
pub mod consts;
pub mod descriptor;
pub mod manifest;
pub mod service;
pub mod store;
pub mod util;
