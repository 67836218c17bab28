//! Token-bounded recursive chunking with overlap and provenance

use std::ops::Range;
use unicode_segmentation::UnicodeSegmentation;

use super::separators::separators_for;
use super::tokens::count_tokens;
use crate::config::ChunkingConfig;
use crate::error::Result;
use crate::types::{Chunk, ChunkSource, Document, Language};

/// Separator placed between segments when a document is joined
pub const SEGMENT_JOINER: &str = "\n\n";

/// Text longer than this many bytes per budgeted token is split without counting it
const MAX_BYTES_PER_TOKEN: usize = 16;

/// A chunk before provenance is attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    /// Byte range in the chunked text
    pub range: Range<usize>,
    /// Token count of the slice
    pub token_count: usize,
}

/// Smallest splittable unit, tagged with the strength of the boundary before it
#[derive(Debug, Clone)]
struct Atom {
    range: Range<usize>,
    tokens: usize,
    /// Index of the separator that starts this atom; lower is stronger
    level: usize,
}

/// Splits text into chunks of at most `max_tokens` tokens
#[derive(Debug, Clone)]
pub struct TextChunker {
    max_tokens: usize,
    overlap_tokens: usize,
    /// Upper bound for a single atom; an overlap tail plus the next atom fits with
    /// room left for tokens that merge across atom boundaries
    atom_tokens: usize,
}

impl TextChunker {
    /// Create a chunker; rejects `max_tokens < 8` and `overlap_tokens >= max_tokens`
    pub fn new(config: &ChunkingConfig) -> Result<Self> {
        config.validate()?;
        let atom_tokens = ((config.max_tokens - config.overlap_tokens) / 3).max(1);
        Ok(Self {
            max_tokens: config.max_tokens,
            overlap_tokens: config.overlap_tokens,
            atom_tokens,
        })
    }

    /// Chunk a document, mapping each chunk back to the segments it covers
    pub fn chunk_document(&self, doc: &Document) -> Vec<Chunk> {
        let mut joined = String::new();
        let mut starts = Vec::with_capacity(doc.segments.len());
        for (i, segment) in doc.segments.iter().enumerate() {
            if i > 0 {
                joined.push_str(SEGMENT_JOINER);
            }
            starts.push(joined.len());
            joined.push_str(&segment.text);
        }

        self.chunk(&joined, doc.file_type.language())
            .into_iter()
            .enumerate()
            .map(|(index, span)| {
                let slice = &joined[span.range.clone()];
                let text_start = span.range.start + (slice.len() - slice.trim_start().len());
                // Last segment starting at or before the first visible character
                let first = starts
                    .partition_point(|&start| start <= text_start)
                    .saturating_sub(1);
                let last = starts.partition_point(|&start| start < span.range.end);
                let segments = first..last.max(first + 1);

                Chunk {
                    content: slice.to_string(),
                    token_count: span.token_count,
                    index,
                    byte_range: span.range,
                    source: ChunkSource {
                        path: doc.path.clone(),
                        label: doc.segments[first].label.clone(),
                        segments,
                    },
                }
            })
            .collect()
    }

    /// Chunk raw text; output depends only on the text, language and configuration
    pub fn chunk(&self, text: &str, language: Option<Language>) -> Vec<TextSpan> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let separators = separators_for(language);
        let mut atoms = Vec::new();
        self.split_atoms(text, 0..text.len(), &separators, 0, 0, &mut atoms);

        let mut spans = Vec::new();
        let mut start = 0;
        let mut prev_end = 0;

        while prev_end < atoms.len() {
            let end = self.grow(text, &atoms, start, prev_end);
            if end <= prev_end {
                // Overlap tail plus the next atom no longer fits
                start += 1;
                continue;
            }

            let range = atoms[start].range.start..atoms[end - 1].range.end;
            let slice = &text[range.clone()];
            if !slice.trim().is_empty() {
                spans.push(TextSpan {
                    token_count: count_tokens(slice),
                    range,
                });
            }

            prev_end = end;
            start = self.next_start(text, &atoms, start, end);
        }

        spans
    }

    /// Recursively split `range` until every piece fits in an atom
    fn split_atoms(
        &self,
        text: &str,
        range: Range<usize>,
        separators: &[&str],
        depth: usize,
        level: usize,
        atoms: &mut Vec<Atom>,
    ) {
        if range.is_empty() {
            return;
        }
        let slice = &text[range.clone()];
        if slice.len() <= self.atom_tokens * MAX_BYTES_PER_TOKEN {
            let tokens = count_tokens(slice);
            if tokens <= self.atom_tokens {
                atoms.push(Atom { range, tokens, level });
                return;
            }
        }

        for (offset, separator) in separators.iter().enumerate().skip(depth) {
            if separator.is_empty() {
                break;
            }
            let cuts: Vec<usize> = slice
                .match_indices(separator)
                .map(|(i, _)| range.start + i)
                .filter(|&i| i > range.start)
                .collect();
            if cuts.is_empty() {
                continue;
            }

            // The separator stays attached to the start of the following piece
            let mut piece_start = range.start;
            for (i, cut) in cuts.into_iter().chain(std::iter::once(range.end)).enumerate() {
                let piece_level = if i == 0 { level } else { offset };
                self.split_atoms(text, piece_start..cut, separators, offset + 1, piece_level, atoms);
                piece_start = cut;
            }
            return;
        }

        let bounds: Vec<usize> = slice
            .grapheme_indices(true)
            .map(|(i, _)| range.start + i)
            .chain(std::iter::once(range.end))
            .collect();
        self.pack_units(text, &bounds, level, separators.len(), atoms);
    }

    /// Greedily pack consecutive units (graphemes or chars) into atoms
    fn pack_units(&self, text: &str, bounds: &[usize], level: usize, weakest: usize, atoms: &mut Vec<Atom>) {
        let last = bounds.len() - 1;
        let mut i = 0;
        while i < last {
            // Largest j whose span still fits, searched within a window near i
            let window = (i + self.atom_tokens * MAX_BYTES_PER_TOKEN).min(last);
            let lo = largest_fitting(i + 1, window, |j| {
                count_tokens(&text[bounds[i]..bounds[j]]) <= self.atom_tokens
            });

            let range = bounds[i]..bounds[lo];
            let piece_level = if i == 0 { level } else { weakest };
            let tokens = count_tokens(&text[range.clone()]);

            if tokens > self.atom_tokens && text[range.clone()].chars().count() > 1 {
                // A single oversized grapheme falls back to char boundaries
                let chars: Vec<usize> = text[range.clone()]
                    .char_indices()
                    .map(|(c, _)| range.start + c)
                    .chain(std::iter::once(range.end))
                    .collect();
                self.pack_units(text, &chars, piece_level, weakest, atoms);
            } else {
                atoms.push(Atom {
                    range,
                    tokens,
                    level: piece_level,
                });
            }
            i = lo;
        }
    }

    /// Exclusive end atom index for a chunk starting at `start`
    fn grow(&self, text: &str, atoms: &[Atom], start: usize, prev_end: usize) -> usize {
        let from = atoms[start].range.start;
        let end = largest_fitting(start + 1, atoms.len(), |end| {
            count_tokens(&text[from..atoms[end - 1].range.end]) <= self.max_tokens
        });

        if end < atoms.len() {
            self.prefer_boundary(text, atoms, start, end, prev_end)
        } else {
            end
        }
    }

    /// Move the break back to the strongest boundary once the chunk is half full
    ///
    /// A break is only taken if the chunk past its first atom still holds a
    /// full overlap, so the next chunk can start inside it.
    fn prefer_boundary(
        &self,
        text: &str,
        atoms: &[Atom],
        start: usize,
        end: usize,
        prev_end: usize,
    ) -> usize {
        let half = self.max_tokens / 2;
        let mut filled = 0;
        let mut candidates = Vec::new();

        for k in (start + 1)..=end {
            filled += atoms[k - 1].tokens;
            if filled < half || k <= prev_end {
                continue;
            }
            candidates.push((atoms[k].level, k));
        }

        // Strongest boundary first, latest first among equals
        candidates.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
        candidates
            .into_iter()
            .map(|(_, k)| k)
            .find(|&k| k == end || self.holds_overlap(text, atoms, start, k))
            .unwrap_or(end)
    }

    /// Whether atoms `start + 1..end` alone carry at least `overlap_tokens`
    fn holds_overlap(&self, text: &str, atoms: &[Atom], start: usize, end: usize) -> bool {
        if self.overlap_tokens == 0 {
            return true;
        }
        end > start + 1
            && count_tokens(&text[atoms[start + 1].range.start..atoms[end - 1].range.end])
                >= self.overlap_tokens
    }

    /// First atom of the next chunk: the latest one whose tail holds the overlap
    fn next_start(&self, text: &str, atoms: &[Atom], start: usize, end: usize) -> usize {
        if self.overlap_tokens == 0 || end <= start + 1 {
            return end;
        }
        let tail_end = atoms[end - 1].range.end;
        let covers =
            |n: usize| count_tokens(&text[atoms[n].range.start..tail_end]) >= self.overlap_tokens;

        // Tail token counts shrink as n grows
        let (mut lo, mut hi) = (start + 1, end - 1);
        if !covers(lo) {
            return lo;
        }
        while lo < hi {
            let mid = (lo + hi + 1) / 2;
            if covers(mid) {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        lo
    }
}

/// Largest `n` in `lo..=hi` for which `fits(n)` holds, assuming `fits(lo)`
///
/// Gallops forward from `lo` and bisects the last step, so the cost follows
/// the answer rather than `hi`.
fn largest_fitting(mut lo: usize, mut hi: usize, fits: impl Fn(usize) -> bool) -> usize {
    let mut step = 1;
    while lo < hi {
        let next = (lo + step).min(hi);
        if fits(next) {
            lo = next;
            step *= 2;
        } else {
            hi = next - 1;
            break;
        }
    }
    while lo < hi {
        let mid = (lo + hi + 1) / 2;
        if fits(mid) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileType, Segment, SegmentLabel};
    use proptest::prelude::*;

    fn chunker(max_tokens: usize, overlap_tokens: usize) -> TextChunker {
        TextChunker::new(&ChunkingConfig {
            max_tokens,
            overlap_tokens,
        })
        .unwrap()
    }

    fn prose(sentences: usize) -> String {
        (0..sentences)
            .map(|i| format!("Sentence number {} talks about the river and the mill.", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_rejects_invalid_config() {
        let bad = [(4, 0), (16, 16), (16, 20)];
        for (max_tokens, overlap_tokens) in bad {
            assert!(TextChunker::new(&ChunkingConfig {
                max_tokens,
                overlap_tokens
            })
            .is_err());
        }
    }

    #[test]
    fn test_short_text_single_chunk() {
        let spans = chunker(100, 10).chunk("Just a short note.", None);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].range, 0..18);
    }

    #[test]
    fn test_empty_and_whitespace() {
        assert!(chunker(32, 4).chunk("", None).is_empty());
        assert!(chunker(32, 4).chunk(" \n\n\t ", None).is_empty());
    }

    #[test]
    fn test_chunks_respect_limit_and_overlap() {
        let text = prose(60);
        let (max, overlap) = (64, 12);
        let spans = chunker(max, overlap).chunk(&text, None);
        assert!(spans.len() > 3);

        for span in &spans {
            assert!(span.token_count <= max);
            assert_eq!(span.token_count, count_tokens(&text[span.range.clone()]));
        }
        for pair in spans.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            assert!(next.range.start > prev.range.start);
            assert!(next.range.start < prev.range.end);
            assert!(count_tokens(&text[next.range.start..prev.range.end]) >= overlap);
        }
        assert_eq!(spans.last().unwrap().range.end, text.len());
    }

    #[test]
    fn test_no_overlap_chunks_are_contiguous() {
        let text = prose(30);
        let spans = chunker(40, 0).chunk(&text, None);
        assert_eq!(spans[0].range.start, 0);
        for pair in spans.windows(2) {
            assert_eq!(pair[0].range.end, pair[1].range.start);
        }
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let paragraph = "Alpha beta gamma delta epsilon zeta eta theta iota kappa.";
        let text = [paragraph; 6].join("\n\n");
        let spans = chunker(40, 0).chunk(&text, None);
        for span in &spans[1..] {
            assert!(text[span.range.clone()].starts_with("\n\nAlpha"));
        }
    }

    #[test]
    fn test_code_splits_at_function_boundaries() {
        let function = "fn step() {\n    let x = compute(1, 2, 3);\n    log(x);\n}\n";
        let text = function.repeat(12);
        let spans = chunker(48, 0).chunk(&text, Some(Language::Rust));
        assert!(spans.len() > 1);
        for span in &spans[1..] {
            assert!(text[span.range.clone()].starts_with("\nfn step()"));
        }
    }

    #[test]
    fn test_unbroken_text_falls_back_to_graphemes() {
        let text = "é".repeat(400);
        let spans = chunker(16, 2).chunk(&text, None);
        assert!(spans.len() > 1);
        for span in &spans {
            assert!(span.token_count <= 16);
            assert!(text.is_char_boundary(span.range.start));
        }
    }

    fn assert_overlap(text: &str, spans: &[TextSpan], overlap: usize) {
        for pair in spans.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            assert!(next.range.start < prev.range.end);
            let shared = count_tokens(&text[next.range.start..prev.range.end]);
            assert!(shared >= overlap, "shared {} < overlap {}", shared, overlap);
        }
    }

    #[test]
    fn test_overlap_survives_short_punctuated_lines() {
        let text = "\n..,a,a, .,  .\n\nBvA\n .,a  .LpBh  ,.aA aA\n\nj.CBD MO";
        let (max, overlap) = (31, 12);
        let spans = chunker(max, overlap).chunk(text, None);
        for span in &spans {
            assert!(span.token_count <= max);
        }
        assert_overlap(text, &spans, overlap);
    }

    #[test]
    fn test_long_unbroken_run() {
        // Pseudo-random letters with no separator anywhere
        let mut seed = 7u32;
        let text: String = (0..20_000)
            .map(|_| {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (b'a' + ((seed >> 16) % 26) as u8) as char
            })
            .collect();

        let (max, overlap) = (64, 8);
        let spans = chunker(max, overlap).chunk(&text, None);
        assert!(spans.len() > 10);
        assert_eq!(spans[0].range.start, 0);
        assert_eq!(spans.last().unwrap().range.end, text.len());
        for span in &spans {
            assert!(span.token_count <= max);
        }
        assert_overlap(&text, &spans, overlap);
    }

    #[test]
    fn test_chunk_document_provenance() {
        let pages: Vec<Segment> = (1..=3)
            .map(|n| Segment::new(prose(12), SegmentLabel::Page(n)))
            .collect();
        let doc = Document::new("book.txt", FileType::Txt, pages);
        let chunks = chunker(80, 10).chunk_document(&doc);

        assert!(chunks.len() >= 3);
        assert_eq!(chunks[0].source.label, SegmentLabel::Page(1));
        assert_eq!(chunks[0].source.segments.start, 0);
        assert_eq!(chunks.last().unwrap().source.segments.end, 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert!(!chunk.source.segments.is_empty());
            assert_eq!(chunk.content.len(), chunk.byte_range.len());
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_chunks_bounded_and_deterministic(
            text in "[a-zA-Z ,.]{0,40}(\n\n?[a-zA-Z ,.]{0,60}){0,30}",
            max_tokens in 8usize..96,
            overlap_pct in 0usize..60,
        ) {
            let overlap = max_tokens * overlap_pct / 100;
            let chunker = chunker(max_tokens, overlap);
            let spans = chunker.chunk(&text, None);

            for span in &spans {
                prop_assert!(span.token_count <= max_tokens);
                prop_assert!(!text[span.range.clone()].trim().is_empty());
            }
            for pair in spans.windows(2) {
                prop_assert!(pair[1].range.start > pair[0].range.start);
                prop_assert!(pair[1].range.end > pair[0].range.end);
                if overlap > 0 {
                    prop_assert!(pair[1].range.start < pair[0].range.end);
                    let shared = count_tokens(&text[pair[1].range.start..pair[0].range.end]);
                    prop_assert!(shared >= overlap, "max={} overlap={} shared={}", max_tokens, overlap, shared);
                }
            }

            // Every byte outside all chunks is whitespace
            let mut covered = vec![false; text.len()];
            for span in &spans {
                covered[span.range.clone()].iter_mut().for_each(|c| *c = true);
            }
            for (i, byte) in text.bytes().enumerate() {
                prop_assert!(covered[i] || byte.is_ascii_whitespace());
            }

            prop_assert_eq!(spans, chunker.chunk(&text, None));
        }
    }
}
