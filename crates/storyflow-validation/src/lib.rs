//! Quality gate for generated artifacts
//!
//! Decides whether candidate text from the backend becomes an artifact.
//! Rejections carry a shape or depth reason that drives the next attempt's
//! prompt escalation.

mod document;
mod gate;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use document::parse_candidate;
pub use gate::{QualityGate, Rejection, Verdict, has_error_path, has_loop};
pub use storyflow_utils::error::ValidationError;
