//! Run orchestration: file discovery, the mining loop, output and summary

mod driver;
mod output;
mod report;

pub use driver::{discover_files, Miner};
pub use output::OutputWriter;
pub use report::{RunReport, SkippedFile};
