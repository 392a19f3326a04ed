//! Batch run machinery
//!
//! - `Orchestrator`: admission, workers, dedupe, and the run report
//! - `RateGate`: global request pacing
//! - cancellation primitives shared by every layer

mod cancel;
mod orchestrator;
mod rate;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use orchestrator::{Orchestrator, RunReport};
pub use rate::RateGate;
