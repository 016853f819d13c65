//! Core logic for gust: resolving a workflow reference to a dispatchable
//! workflow file, and correlating a dispatch with the run it creates.
//!
//! The dispatch endpoint returns no run id, so after dispatching the engine
//! polls the run listing with bounded exponential backoff until a run created
//! after the dispatch moment appears. Both halves are generic over
//! [`gust_api::ActionsApi`] so tests can script the remote side.

pub mod correlate;
pub mod error;
pub mod resolve;

pub use correlate::{CorrelatedRun, Correlator};
pub use error::EngineError;
pub use resolve::resolve_workflow_file;
