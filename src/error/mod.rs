//! Error handling and classification module
//!
//! This module maps faults surfaced by remote calls into a closed set of
//! [`ErrorKind`]s, each with a retryability flag and, for rate limits, the
//! wait hint the remote side supplied.

pub mod classification;
pub mod classifier;

// Re-export main types for convenient access
pub use classification::{ClassifiedError, ErrorKind, FaultCause, OpaqueFault};
pub use classifier::{
    classify, classify_api_status, classify_owned, classify_panic, ErrorClassifier, ErrorPattern,
};
