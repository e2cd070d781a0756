//! Request/response correlation.
//!
//! A pre-send hook tags an outgoing request with a script-chosen key; a
//! later message hook resolves that key with the inbound message.

pub mod tracker;

pub use tracker::{CorrelationTracker, RequestStatus, TrackedRequest, DEFAULT_HISTORY_LIMIT};
