//! Saving attachments: naming policy and the per-attachment write sequence.

pub mod attachment;
pub mod filename;

pub use attachment::{process_attachment, WriteOutcome};
