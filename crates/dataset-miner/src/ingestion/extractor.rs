//! Multi-format text extraction

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use once_cell::sync::Lazy;
use std::path::Path;
use std::time::Duration;

use super::tabular;
use crate::config::ExtractionConfig;
use crate::error::{Error, Result};
use crate::types::{Document, FileType, Segment, SegmentLabel};

/// Share of control characters above which decoded text counts as binary
const MAX_CONTROL_RATIO: f64 = 0.10;

/// Ligatures and typographic glyphs that PDF fonts leave behind
const PDF_REPLACEMENTS: &[(&str, &str)] = &[
    ("\u{FB00}", "ff"),
    ("\u{FB01}", "fi"),
    ("\u{FB02}", "fl"),
    ("\u{FB03}", "ffi"),
    ("\u{FB04}", "ffl"),
    ("\u{2010}", "-"),
    ("\u{2011}", "-"),
    ("\u{2013}", "-"),
    ("\u{2014}", "--"),
    ("\u{2018}", "'"),
    ("\u{2019}", "'"),
    ("\u{201C}", "\""),
    ("\u{201D}", "\""),
    ("\u{2022}", "* "),
    ("\u{2026}", "..."),
    ("\u{00A0}", " "),
    ("\u{0000}", ""),
];

/// Glyph names that leak into text when a font lacks a ToUnicode map
const PDF_GLYPH_NAMES: &[(&str, &str)] = &[
    ("f_f_i", "ffi"),
    ("f_f_l", "ffl"),
    ("f_f", "ff"),
    ("f_i", "fi"),
    ("f_l", "fl"),
    ("uni2019", "'"),
    ("uni2013", "-"),
    ("uni2014", "--"),
    ("uni00A0", " "),
];

static BODY_SELECTOR: Lazy<scraper::Selector> =
    Lazy::new(|| scraper::Selector::parse("body").expect("valid selector"));

/// Turns files into labeled text segments
#[derive(Debug, Clone)]
pub struct Extractor {
    config: ExtractionConfig,
    primary_encoding: &'static Encoding,
}

impl Extractor {
    /// Create an extractor; unknown encoding labels fall back to UTF-8
    pub fn new(config: ExtractionConfig) -> Self {
        let primary_encoding =
            Encoding::for_label(config.text_encoding.as_bytes()).unwrap_or(UTF_8);
        Self {
            config,
            primary_encoding,
        }
    }

    /// Read and extract a file from disk
    pub fn extract(&self, path: &Path) -> Result<Document> {
        let file_type = FileType::from_path(path);
        if !file_type.is_supported() {
            let ext = path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_else(|| "(no extension)".to_string());
            return Err(Error::UnsupportedFormat(ext));
        }

        let data = std::fs::read(path)
            .map_err(|e| Error::extraction(path, format!("cannot read file: {}", e)))?;
        self.extract_bytes(path, file_type, &data)
    }

    /// Extract already-loaded file contents
    pub fn extract_bytes(&self, path: &Path, file_type: FileType, data: &[u8]) -> Result<Document> {
        let segments = match file_type {
            FileType::Pdf => self.parse_pdf(path, data)?,
            FileType::Docx => vec![parse_docx(path, data)?],
            FileType::Pptx => parse_pptx(path, data)?,
            FileType::Json => vec![self.parse_json(path, data)?],
            FileType::Csv => {
                let text = self.decode_text(path, data)?;
                tabular::csv_segments(path, &text, self.config.remove_empty_columns)?
            }
            FileType::Xlsx | FileType::Xls => {
                tabular::workbook_segments(path, data, self.config.remove_empty_columns)?
            }
            FileType::Html => parse_html(&self.decode_text(path, data)?),
            FileType::Txt | FileType::Markdown | FileType::Code(_) => {
                vec![Segment::whole(self.decode_text(path, data)?)]
            }
            FileType::Unknown => return Err(Error::UnsupportedFormat(path.display().to_string())),
        };

        let segments: Vec<Segment> = segments
            .into_iter()
            .filter(|segment| !segment.text.trim().is_empty())
            .collect();

        if segments.is_empty() {
            return Err(Error::extraction(path, "no text content"));
        }

        tracing::debug!(
            "Extracted {} segment(s) from {} ({})",
            segments.len(),
            path.display(),
            file_type
        );

        Ok(Document::new(path, file_type, segments))
    }

    /// Decode text with the configured encoding, then the fallbacks
    pub fn decode_text(&self, path: &Path, data: &[u8]) -> Result<String> {
        let bom = Encoding::for_bom(data);

        let mut candidates: Vec<&'static Encoding> = vec![self.primary_encoding];
        if let Some((encoding, _)) = bom {
            candidates.push(encoding);
        }
        candidates.push(WINDOWS_1252);
        candidates.dedup();

        for encoding in candidates {
            let body = match bom {
                Some((bom_encoding, len)) if bom_encoding == encoding => &data[len..],
                _ => data,
            };
            let (text, had_errors) = encoding.decode_without_bom_handling(body);
            if had_errors {
                tracing::debug!("{} is not valid {}", path.display(), encoding.name());
                continue;
            }
            if looks_binary(&text) {
                tracing::debug!(
                    "{} decoded as {} looks binary",
                    path.display(),
                    encoding.name()
                );
                continue;
            }
            return Ok(text.into_owned());
        }

        Err(Error::extraction(
            path,
            "could not decode text with any known encoding",
        ))
    }

    /// Parse a PDF page by page, falling back to whole-document extraction
    fn parse_pdf(&self, path: &Path, data: &[u8]) -> Result<Vec<Segment>> {
        match pdf_pages(data) {
            Ok(pages) if !pages.is_empty() => return Ok(pages),
            Ok(_) => tracing::debug!("lopdf found no text in {}, trying pdf-extract", path.display()),
            Err(e) => tracing::debug!("lopdf failed on {}: {}, trying pdf-extract", path.display(), e),
        }

        let timeout = Duration::from_secs(self.config.pdf_timeout_secs);
        let text = extract_pdf_with_timeout(path, data, timeout)?;
        Ok(vec![Segment::whole(cleanup_pdf_text(&text))])
    }

    fn parse_json(&self, path: &Path, data: &[u8]) -> Result<Segment> {
        let text = self.decode_text(path, data)?;
        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| Error::extraction(path, format!("invalid JSON: {}", e)))?;
        let pretty = serde_json::to_string_pretty(&value)?;
        Ok(Segment::whole(pretty))
    }
}

/// NUL bytes or a high share of control characters mean a wrong decode
fn looks_binary(text: &str) -> bool {
    if text.contains('\0') {
        return true;
    }
    let mut total = 0usize;
    let mut control = 0usize;
    for c in text.chars() {
        total += 1;
        if c.is_control() && !matches!(c, '\n' | '\r' | '\t' | '\x0c') {
            control += 1;
        }
    }
    total > 0 && control as f64 / total as f64 > MAX_CONTROL_RATIO
}

/// Per-page text through lopdf
fn pdf_pages(data: &[u8]) -> std::result::Result<Vec<Segment>, lopdf::Error> {
    let doc = lopdf::Document::load_mem(data)?;
    let mut segments = Vec::new();

    for page_number in doc.get_pages().keys().copied() {
        match doc.extract_text(&[page_number]) {
            Ok(text) => {
                let text = cleanup_pdf_text(&text);
                if !text.trim().is_empty() {
                    segments.push(Segment::new(text, SegmentLabel::Page(page_number)));
                }
            }
            Err(e) => tracing::debug!("Could not extract page {}: {}", page_number, e),
        }
    }

    Ok(segments)
}

/// Run pdf-extract on a helper thread; it can hang or panic on unusual fonts
fn extract_pdf_with_timeout(path: &Path, data: &[u8], timeout: Duration) -> Result<String> {
    let owned = data.to_vec();
    run_with_timeout(path, timeout, move || {
        pdf_extract::extract_text_from_mem(&owned).map_err(|e| format!("unreadable PDF: {}", e))
    })
}

/// Run `job` on its own thread; a panic or a timeout becomes an extraction error
///
/// Relies on unwinding: the release profile must not set `panic = "abort"`.
fn run_with_timeout<F>(path: &Path, timeout: Duration, job: F) -> Result<String>
where
    F: FnOnce() -> std::result::Result<String, String> + Send + 'static,
{
    use std::sync::mpsc;
    use std::thread;

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(job());
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(message)) => Err(Error::extraction(path, message)),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(Error::extraction(
            path,
            format!("PDF extraction timed out after {}s", timeout.as_secs()),
        )),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(Error::extraction(path, "PDF extraction thread crashed"))
        }
    }
}

/// Normalize glyph leftovers and drop blank lines
fn cleanup_pdf_text(text: &str) -> String {
    let mut result = text.to_string();
    for (glyph, replacement) in PDF_GLYPH_NAMES.iter().chain(PDF_REPLACEMENTS) {
        if result.contains(glyph) {
            result = result.replace(glyph, replacement);
        }
    }

    result
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Paragraphs and tables in document order
fn parse_docx(path: &Path, data: &[u8]) -> Result<Segment> {
    let docx = docx_rs::read_docx(data)
        .map_err(|e| Error::extraction(path, format!("unreadable Word document: {}", e)))?;

    let mut blocks = Vec::new();
    for child in &docx.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(paragraph) => {
                let text = paragraph_text(paragraph);
                if !text.trim().is_empty() {
                    blocks.push(text);
                }
            }
            docx_rs::DocumentChild::Table(table) => {
                let rendered = table_text(table);
                if !rendered.is_empty() {
                    blocks.push(format!("=== Table ===\n{}", rendered));
                }
            }
            _ => {}
        }
    }

    Ok(Segment::whole(blocks.join("\n")))
}

fn paragraph_text(paragraph: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    push_paragraph_children(&paragraph.children, &mut text);
    text
}

fn push_paragraph_children(children: &[docx_rs::ParagraphChild], out: &mut String) {
    for child in children {
        match child {
            docx_rs::ParagraphChild::Run(run) => {
                for run_child in &run.children {
                    match run_child {
                        docx_rs::RunChild::Text(t) => out.push_str(&t.text),
                        docx_rs::RunChild::Tab(_) => out.push('\t'),
                        _ => {}
                    }
                }
            }
            docx_rs::ParagraphChild::Hyperlink(link) => push_paragraph_children(&link.children, out),
            _ => {}
        }
    }
}

fn table_text(table: &docx_rs::Table) -> String {
    let mut rows = Vec::new();
    for docx_rs::TableChild::TableRow(row) in &table.rows {
        let cells: Vec<String> = row
            .cells
            .iter()
            .map(|docx_rs::TableRowChild::TableCell(cell)| {
                cell.children
                    .iter()
                    .filter_map(|content| match content {
                        docx_rs::TableCellContent::Paragraph(p) => Some(paragraph_text(p)),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
                    .trim()
                    .to_string()
            })
            .collect();
        if cells.iter().any(|c| !c.is_empty()) {
            rows.push(cells.join(" | "));
        }
    }
    rows.join("\n")
}

/// One segment per slide, in slide order
fn parse_pptx(path: &Path, data: &[u8]) -> Result<Vec<Segment>> {
    use std::io::Read;

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(data))
        .map_err(|e| Error::extraction(path, format!("unreadable presentation: {}", e)))?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse::<u32>()
                .ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slides.sort();

    let mut segments = Vec::with_capacity(slides.len());
    for (number, name) in slides {
        let mut xml = String::new();
        let read = archive
            .by_name(&name)
            .map_err(|e| e.to_string())
            .and_then(|mut file| file.read_to_string(&mut xml).map_err(|e| e.to_string()));
        if let Err(e) = read {
            tracing::debug!("Skipping slide {} of {}: {}", number, path.display(), e);
            continue;
        }
        segments.push(Segment::new(slide_text(&xml), SegmentLabel::Slide(number)));
    }

    Ok(segments)
}

/// Collect `<a:t>` runs, one line per `<a:p>` paragraph
fn slide_text(xml: &str) -> String {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut lines = Vec::new();
    let mut line = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(e)) if in_text => {
                if let Ok(text) = e.unescape() {
                    if !line.is_empty() {
                        line.push(' ');
                    }
                    line.push_str(text.trim());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if !line.is_empty() => lines.push(std::mem::take(&mut line)),
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }

    lines.join("\n")
}

fn is_heading(name: &str) -> bool {
    matches!(name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

fn is_hidden_element(name: &str) -> bool {
    matches!(name, "script" | "style" | "noscript" | "template")
}

/// Split body text into sections at each heading
fn parse_html(html: &str) -> Vec<Segment> {
    let document = scraper::Html::parse_document(html);
    let Some(body) = document.select(&BODY_SELECTOR).next() else {
        return Vec::new();
    };

    let mut segments = Vec::new();
    let mut label = SegmentLabel::Whole;
    let mut lines: Vec<String> = Vec::new();

    for node in body.descendants() {
        if let Some(element) = node.value().as_element() {
            if is_heading(element.name()) {
                if !lines.is_empty() {
                    segments.push(Segment::new(lines.join("\n"), label.clone()));
                    lines.clear();
                }
                let title = scraper::ElementRef::wrap(node)
                    .map(|heading| heading.text().collect::<Vec<_>>().join(" "))
                    .unwrap_or_default();
                let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
                lines.push(title.clone());
                label = SegmentLabel::Section(title);
            }
        } else if let Some(text) = node.value().as_text() {
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            let skip = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .map_or(false, |e| is_heading(e.name()) || is_hidden_element(e.name()))
            });
            if !skip {
                lines.push(text.to_string());
            }
        }
    }
    if !lines.is_empty() {
        segments.push(Segment::new(lines.join("\n"), label));
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn extractor() -> Extractor {
        Extractor::new(ExtractionConfig::default())
    }

    #[test]
    fn test_extract_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "First paragraph.\n\nSecond paragraph.").unwrap();

        let doc = extractor().extract(&path).unwrap();
        assert_eq!(doc.file_type, FileType::Txt);
        assert_eq!(doc.segments.len(), 1);
        assert!(doc.segments[0].text.contains("Second paragraph."));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool.exe");
        std::fs::write(&path, [0u8, 1, 2]).unwrap();
        assert!(matches!(
            extractor().extract(&path),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_binary_text_file_is_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&[0xff, 0xfe, 0x00, 0x00, 0x01, 0x02, 0x00, 0x9d, 0x00, 0x81])
            .unwrap();
        drop(file);

        assert!(matches!(
            extractor().extract(&path),
            Err(Error::Extraction { .. })
        ));
    }

    #[test]
    fn test_whitespace_only_is_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.md");
        std::fs::write(&path, "   \n\n\t  ").unwrap();
        let err = extractor().extract(&path).unwrap_err();
        assert!(err.to_string().contains("no text content"));
    }

    #[test]
    fn test_windows_1252_fallback() {
        let text = extractor()
            .decode_text(Path::new("legacy.txt"), b"caf\xe9 cr\xe8me")
            .unwrap();
        assert_eq!(text, "café crème");
    }

    #[test]
    fn test_utf16_with_bom() {
        let mut data = vec![0xff, 0xfe];
        for unit in "hello world".encode_utf16() {
            data.extend_from_slice(&unit.to_le_bytes());
        }
        let text = extractor().decode_text(Path::new("wide.txt"), &data).unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn test_utf8_bom_stripped() {
        let text = extractor()
            .decode_text(Path::new("bom.txt"), b"\xef\xbb\xbfplain")
            .unwrap();
        assert_eq!(text, "plain");
    }

    #[test]
    fn test_json_is_pretty_printed() {
        let doc = extractor()
            .extract_bytes(Path::new("data.json"), FileType::Json, br#"{"a":[1,2]}"#)
            .unwrap();
        assert!(doc.segments[0].text.contains("\n  \"a\""));

        let err = extractor()
            .extract_bytes(Path::new("bad.json"), FileType::Json, b"{not json")
            .unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }

    #[test]
    fn test_corrupt_binary_formats() {
        let garbage = b"this is not a zip archive or a pdf";
        for (name, file_type) in [
            ("a.pdf", FileType::Pdf),
            ("a.docx", FileType::Docx),
            ("a.pptx", FileType::Pptx),
            ("a.xlsx", FileType::Xlsx),
        ] {
            let result = extractor().extract_bytes(Path::new(name), file_type, garbage);
            assert!(
                matches!(result, Err(Error::Extraction { .. })),
                "{} should fail to extract",
                name
            );
        }
    }

    #[test]
    fn test_html_sections() {
        let html = r#"<html><head><style>p { color: red }</style></head><body>
            <p>Intro text.</p>
            <h2>Install</h2><p>Run the installer.</p>
            <script>var x = 1;</script>
            <h2>Usage</h2><ul><li>Open it</li><li>Click</li></ul>
        </body></html>"#;
        let segments = parse_html(html);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].label, SegmentLabel::Whole);
        assert_eq!(segments[1].label, SegmentLabel::Section("Install".into()));
        assert_eq!(segments[1].text, "Install\nRun the installer.");
        assert!(!segments[1].text.contains("var x"));
        assert_eq!(segments[2].text, "Usage\nOpen it\nClick");
    }

    #[test]
    fn test_slide_text() {
        let xml = r#"<p:sld xmlns:a="a" xmlns:p="p"><p:cSld><p:spTree>
            <a:p><a:r><a:t>Title</a:t></a:r></a:p>
            <a:p><a:r><a:t>Bullet</a:t></a:r><a:r><a:t>one</a:t></a:r></a:p>
        </p:spTree></p:cSld></p:sld>"#;
        assert_eq!(slide_text(xml), "Title\nBullet one");
    }

    #[test]
    fn test_panicking_parser_is_extraction_error() {
        let result = run_with_timeout(Path::new("bad.pdf"), Duration::from_secs(5), || {
            panic!("parser blew up")
        });
        match result {
            Err(Error::Extraction { message, .. }) => assert!(message.contains("crashed")),
            other => panic!("expected extraction error, got {:?}", other),
        }
    }

    #[test]
    fn test_hanging_parser_times_out() {
        let result = run_with_timeout(Path::new("slow.pdf"), Duration::from_millis(50), || {
            std::thread::sleep(Duration::from_secs(2));
            Ok(String::new())
        });
        match result {
            Err(Error::Extraction { message, .. }) => assert!(message.contains("timed out")),
            other => panic!("expected extraction error, got {:?}", other),
        }
    }

    #[test]
    fn test_cleanup_pdf_text() {
        let cleaned = cleanup_pdf_text("  e\u{FB03}cient\u{2014}fast \n\n\u{201C}ok\u{201D}  ");
        assert_eq!(cleaned, "efficient--fast\n\"ok\"");
    }

    #[test]
    fn test_docx_round_trip() {
        let mut buf = std::io::Cursor::new(Vec::new());
        docx_rs::Docx::new()
            .add_paragraph(
                docx_rs::Paragraph::new().add_run(docx_rs::Run::new().add_text("Intro paragraph")),
            )
            .add_table(docx_rs::Table::new(vec![docx_rs::TableRow::new(vec![
                docx_rs::TableCell::new().add_paragraph(
                    docx_rs::Paragraph::new().add_run(docx_rs::Run::new().add_text("Name")),
                ),
                docx_rs::TableCell::new().add_paragraph(
                    docx_rs::Paragraph::new().add_run(docx_rs::Run::new().add_text("Value")),
                ),
            ])]))
            .build()
            .pack(&mut buf)
            .unwrap();

        let doc = extractor()
            .extract_bytes(Path::new("report.docx"), FileType::Docx, buf.get_ref())
            .unwrap();
        let text = &doc.segments[0].text;
        assert!(text.starts_with("Intro paragraph"));
        assert!(text.contains("=== Table ===\nName | Value"));
    }
}
