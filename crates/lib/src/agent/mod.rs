//! Device-side agent.
//!
//! Polls the device manifest, resolves each desired deployment by digest (from the
//! bootstrap bundle, the local cache or an individual fetch) and reconciles the
//! cache, emitting deploy, update and undeploy actions.

mod error;
mod reconcile;
mod runner;
mod state;
mod transport;

pub use error::AgentError;
pub use reconcile::{Action, CycleOutcome, CycleReport, Resolution, Resolved, apply_plan, build_plan, poll_once};
pub use runner::Agent;
pub use state::{AgentState, CacheEntry, EphemeralState, StateFile, StateStore};
pub use transport::{HttpTransport, ManifestFetch, Transport, resolve_url};
