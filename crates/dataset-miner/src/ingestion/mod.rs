//! Document ingestion: extraction, token estimation and chunking

mod chunker;
mod extractor;
mod separators;
mod tabular;
mod tokens;

pub use chunker::{TextChunker, TextSpan, SEGMENT_JOINER};
pub use extractor::Extractor;
pub use separators::separators_for;
pub use tabular::Table;
pub use tokens::count_tokens;
