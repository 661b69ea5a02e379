//! Core monitoring logic.
//!
//! This module contains:
//! - Detector: decides which fetched records are new
//! - FailureGovernor: consecutive upstream failure tracking
//! - TimingEstimator: synthesis duration prediction
//! - CursorStore: durable cursor + settings snapshot
//! - PollLoop: the fetch/detect/announce cycle and its control surface

pub mod cursor_store;
pub mod detector;
pub mod estimator;
pub mod governor;
pub mod poller;

// Re-export commonly used types
pub use cursor_store::{CursorStore, PersistedState, StoreError, STATE_VERSION};
pub use detector::{detect_new, Detection, MalformedRecord, NewResponse};
pub use estimator::{estimate_accuracy, TimingEstimator, TimingSample};
pub use governor::FailureGovernor;
pub use poller::{
    LoopSnapshot, LoopState, PollCommand, PollControl, PollLoop, StopReason, TickOutcome,
};
