//! Completion post-processing
//!
//! Reconciles raw model output with the text the user typed:
//! - Text normalization for comparison
//! - Overlap detection between input suffix and completion prefix
//! - Reasoning-tag stripping

mod cleaner;
mod normalize;
mod overlap;

pub use cleaner::clean_completion;
pub use normalize::normalize;
pub use overlap::remove_overlap;
