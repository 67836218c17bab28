//! Document, segment and chunk types with provenance tracking

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Programming and markup languages with syntax-aware splitting
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Java,
    Kotlin,
    Js,
    Ts,
    Php,
    Proto,
    Cpp,
    C,
    Ruby,
    Rust,
    Scala,
    Swift,
    Markdown,
    Latex,
    Sol,
    CSharp,
    Cobol,
    Lua,
    Perl,
    Haskell,
    Elixir,
    PowerShell,
    Rst,
    Go,
}

impl Language {
    /// Map a lowercase extension (without the dot) to a language
    pub fn from_extension(ext: &str) -> Option<Self> {
        let language = match ext {
            "py" => Self::Python,
            "java" => Self::Java,
            "kt" => Self::Kotlin,
            "js" => Self::Js,
            "ts" => Self::Ts,
            "php" => Self::Php,
            "proto" => Self::Proto,
            "cpp" => Self::Cpp,
            "c" => Self::C,
            "rb" => Self::Ruby,
            "rs" => Self::Rust,
            "scala" => Self::Scala,
            "swift" => Self::Swift,
            "md" => Self::Markdown,
            "tex" => Self::Latex,
            "sol" => Self::Sol,
            "cs" => Self::CSharp,
            "cbl" => Self::Cobol,
            "lua" => Self::Lua,
            "pl" => Self::Perl,
            "hs" => Self::Haskell,
            "ex" => Self::Elixir,
            "ps1" => Self::PowerShell,
            "rst" => Self::Rst,
            "go" => Self::Go,
            _ => return None,
        };
        Some(language)
    }

    /// Display name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Java => "java",
            Self::Kotlin => "kotlin",
            Self::Js => "javascript",
            Self::Ts => "typescript",
            Self::Php => "php",
            Self::Proto => "protobuf",
            Self::Cpp => "cpp",
            Self::C => "c",
            Self::Ruby => "ruby",
            Self::Rust => "rust",
            Self::Scala => "scala",
            Self::Swift => "swift",
            Self::Markdown => "markdown",
            Self::Latex => "latex",
            Self::Sol => "solidity",
            Self::CSharp => "csharp",
            Self::Cobol => "cobol",
            Self::Lua => "lua",
            Self::Perl => "perl",
            Self::Haskell => "haskell",
            Self::Elixir => "elixir",
            Self::PowerShell => "powershell",
            Self::Rst => "rst",
            Self::Go => "go",
        }
    }
}

/// Supported file types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// PDF document
    Pdf,
    /// Microsoft Word document (.docx)
    Docx,
    /// Microsoft PowerPoint presentation (.pptx)
    Pptx,
    /// Plain text file
    Txt,
    /// JSON document
    Json,
    /// CSV file
    Csv,
    /// Excel spreadsheet (.xlsx)
    Xlsx,
    /// Legacy Excel spreadsheet (.xls)
    Xls,
    /// HTML document
    Html,
    /// Markdown file
    Markdown,
    /// Source code file with language
    Code(Language),
    /// Unknown file type
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.trim_start_matches('.').to_lowercase();
        match ext.as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "pptx" => Self::Pptx,
            "txt" => Self::Txt,
            "json" => Self::Json,
            "csv" => Self::Csv,
            "xlsx" => Self::Xlsx,
            "xls" => Self::Xls,
            "html" | "htm" => Self::Html,
            "md" => Self::Markdown,
            other => Language::from_extension(other)
                .map(Self::Code)
                .unwrap_or(Self::Unknown),
        }
    }

    /// Detect file type from a path's extension
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }

    /// Check if this is a supported file type
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Language used to pick split boundaries
    pub fn language(&self) -> Option<Language> {
        match self {
            Self::Code(language) => Some(*language),
            Self::Markdown => Some(Language::Markdown),
            _ => None,
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Docx => "Word Document (.docx)",
            Self::Pptx => "PowerPoint (.pptx)",
            Self::Txt => "Text File",
            Self::Json => "JSON",
            Self::Csv => "CSV",
            Self::Xlsx => "Excel Spreadsheet (.xlsx)",
            Self::Xls => "Excel Spreadsheet (.xls)",
            Self::Html => "HTML",
            Self::Markdown => "Markdown",
            Self::Code(language) => language.name(),
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Where a segment came from inside its file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum SegmentLabel {
    /// Whole file
    Whole,
    /// PDF page (1-indexed)
    Page(u32),
    /// Presentation slide (1-indexed)
    Slide(u32),
    /// Spreadsheet sheet name
    Sheet(String),
    /// CSV data row (1-indexed, header excluded)
    Row(u32),
    /// HTML section heading
    Section(String),
}

impl fmt::Display for SegmentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whole => f.write_str("whole file"),
            Self::Page(n) => write!(f, "Page {}", n),
            Self::Slide(n) => write!(f, "Slide {}", n),
            Self::Sheet(name) => write!(f, "Sheet: {}", name),
            Self::Row(n) => write!(f, "Row {}", n),
            Self::Section(title) => write!(f, "Section: {}", title),
        }
    }
}

/// A labeled piece of extracted text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub label: SegmentLabel,
}

impl Segment {
    pub fn new(text: impl Into<String>, label: SegmentLabel) -> Self {
        Self {
            text: text.into(),
            label,
        }
    }

    pub fn whole(text: impl Into<String>) -> Self {
        Self::new(text, SegmentLabel::Whole)
    }
}

/// A file after extraction
#[derive(Debug, Clone)]
pub struct Document {
    /// Source path
    pub path: PathBuf,
    /// Detected format
    pub file_type: FileType,
    /// Segments in file order
    pub segments: Vec<Segment>,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>, file_type: FileType, segments: Vec<Segment>) -> Self {
        Self {
            path: path.into(),
            file_type,
            segments,
        }
    }

    /// File name for logs and provenance
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Total extracted characters across segments
    pub fn char_count(&self) -> usize {
        self.segments.iter().map(|s| s.text.chars().count()).sum()
    }
}

/// Provenance for a chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSource {
    /// Source file
    pub path: PathBuf,
    /// Indices of the segments the chunk overlaps
    pub segments: Range<usize>,
    /// Label of the first covered segment
    pub label: SegmentLabel,
}

impl ChunkSource {
    /// Format source for log lines
    pub fn describe(&self) -> String {
        match &self.label {
            SegmentLabel::Whole => self.path.display().to_string(),
            label => format!("{} ({})", self.path.display(), label),
        }
    }
}

/// A token-bounded piece of a document sent to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Text content
    pub content: String,
    /// Estimated token count of `content`
    pub token_count: usize,
    /// Chunk index within its document
    pub index: usize,
    /// Byte range in the joined document text
    pub byte_range: Range<usize>,
    /// Source information
    pub source: ChunkSource,
}
