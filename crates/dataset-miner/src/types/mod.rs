//! Core types for the mining pipeline

pub mod document;
pub mod qa_pair;
pub mod usage;

pub use document::{Chunk, ChunkSource, Document, FileType, Language, Segment, SegmentLabel};
pub use qa_pair::{QaPair, Verification, VerificationStatus};
pub use usage::{OperationKind, UsageRecord};
