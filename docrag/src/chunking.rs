//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and three implementations:
//!
//! - [`StructuralChunker`]: cuts at detected headings, falling back to
//!   fixed-length windows when too few headings are found
//! - [`FixedLengthChunker`]: fixed-length windows that snap to sentence ends
//! - [`ParagraphChunker`]: line paragraphs, sentence packing and forward
//!   merging of short units
//!
//! All lengths are measured in characters, not bytes.

use std::ops::Range;
use std::sync::Arc;

use tracing::debug;

use crate::boundary::{Boundary, DetectorChain};
use crate::config::{ChunkingStrategy, DEFAULT_CORPUS_NAME, SegmenterConfig};
use crate::document::{Chunk, Document};

/// A strategy for splitting documents into chunks.
///
/// Chunks are numbered from zero in emission order. Their ids use the
/// document's corpus name (or [`DEFAULT_CORPUS_NAME`]).
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has no text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Build the chunker selected by `config.strategy`.
pub fn chunker_for(config: &SegmenterConfig) -> Arc<dyn Chunker> {
    match config.strategy {
        ChunkingStrategy::Structural => Arc::new(StructuralChunker::from_config(config)),
        ChunkingStrategy::FixedLength => Arc::new(FixedLengthChunker::from_config(config)),
        ChunkingStrategy::Paragraph => Arc::new(ParagraphChunker::from_config(config)),
    }
}

/// Segment `text` with the default heading detectors and policy.
///
/// Convenience wrapper around [`StructuralChunker`].
pub fn segment(text: &str, corpus_name: &str, max_chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let document = Document::new(text, corpus_name);
    StructuralChunker::new(max_chunk_size, overlap).chunk(&document)
}

/// A chunk body before ids and sequence numbers are assigned.
#[derive(Debug, Clone, PartialEq)]
struct Piece {
    heading: Option<String>,
    text: String,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// First `chars` characters with line breaks collapsed, suffixed with `...`.
pub fn preview_title(text: &str, chars: usize) -> String {
    let head: String = text.chars().take(chars).collect();
    format!("{}...", head.replace(['\r', '\n'], " "))
}

fn materialize(pieces: Vec<Piece>, document: &Document, preview_chars: usize) -> Vec<Chunk> {
    let corpus_name = document.corpus_or(DEFAULT_CORPUS_NAME).to_string();
    pieces
        .into_iter()
        .enumerate()
        .map(|(index, piece)| Chunk {
            id: Chunk::make_id(&corpus_name, index),
            title: piece.heading.unwrap_or_else(|| preview_title(&piece.text, preview_chars)),
            text: piece.text,
            corpus_name: corpus_name.clone(),
            chunk_index: index,
            source: document.source.clone(),
        })
        .collect()
}

// ── Fixed-length splitting ─────────────────────────────────────────

/// Walks text in windows of `max_chunk_size` characters, snapping each cut
/// to the sentence terminator nearest the window edge.
#[derive(Debug, Clone)]
pub struct FixedLengthSplitter {
    max_chunk_size: usize,
    overlap: usize,
    snap_window: usize,
    terminators: Vec<char>,
}

impl FixedLengthSplitter {
    /// Create a splitter with the default terminators and a 50 character snap window.
    pub fn new(max_chunk_size: usize, overlap: usize) -> Self {
        let defaults = SegmenterConfig::default();
        Self {
            max_chunk_size: max_chunk_size.max(1),
            overlap,
            snap_window: defaults.snap_window,
            terminators: defaults.sentence_terminators,
        }
    }

    pub fn from_config(config: &SegmenterConfig) -> Self {
        Self {
            max_chunk_size: config.max_chunk_size.max(1),
            overlap: config.overlap,
            snap_window: config.snap_window,
            terminators: config.sentence_terminators.clone(),
        }
    }

    /// Override the characters a cut may follow.
    pub fn with_terminators(mut self, terminators: Vec<char>) -> Self {
        self.terminators = terminators;
        self
    }

    /// Override how far around the window edge terminators are searched.
    pub fn with_snap_window(mut self, snap_window: usize) -> Self {
        self.snap_window = snap_window;
        self
    }

    /// Byte ranges of every window, untrimmed, in order.
    ///
    /// Consecutive ranges overlap by up to `overlap` characters; together
    /// they cover the whole text.
    pub fn spans(&self, text: &str) -> Vec<Range<usize>> {
        let chars: Vec<char> = text.chars().collect();
        let offsets: Vec<usize> =
            text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
        let n = chars.len();
        // Snapping never moves a cut by more than half a window, which keeps
        // every piece within 1.5x the window size.
        let snap = self.snap_window.min(self.max_chunk_size / 2);

        let mut spans = Vec::new();
        let mut start = 0;
        while start < n {
            let window_end = start + self.max_chunk_size;
            let cut = if window_end >= n {
                n
            } else {
                self.snap_cut(&chars, start, window_end, snap).unwrap_or(window_end)
            };
            spans.push(offsets[start]..offsets[cut]);
            if cut >= n {
                break;
            }
            let next = cut.saturating_sub(self.overlap);
            // Without forward progress the overlap is dropped for this step.
            start = if next > start { next } else { cut };
        }
        spans
    }

    /// Trimmed, non-empty windows of `text`.
    pub fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.spans(text).into_iter().map(|r| text[r].trim()).filter(|s| !s.is_empty()).collect()
    }

    /// The cut position just after the terminator nearest `window_end`,
    /// searching `snap` characters either side. Ties prefer the earlier cut.
    fn snap_cut(&self, chars: &[char], start: usize, window_end: usize, snap: usize) -> Option<usize> {
        let lo = window_end.saturating_sub(snap).max(start);
        let hi = (window_end + snap).min(chars.len());
        (lo..hi)
            .filter(|&p| self.terminators.contains(&chars[p]))
            .map(|p| p + 1)
            .filter(|&cut| cut > start)
            .min_by_key(|&cut| (cut.abs_diff(window_end), cut))
    }
}

/// Splits text into fixed-length windows only.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::FixedLengthChunker;
///
/// let chunker = FixedLengthChunker::new(1000, 100);
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct FixedLengthChunker {
    splitter: FixedLengthSplitter,
    preview_chars: usize,
}

impl FixedLengthChunker {
    pub fn new(max_chunk_size: usize, overlap: usize) -> Self {
        Self {
            splitter: FixedLengthSplitter::new(max_chunk_size, overlap),
            preview_chars: SegmenterConfig::default().title_preview_chars,
        }
    }

    pub fn from_config(config: &SegmenterConfig) -> Self {
        Self {
            splitter: FixedLengthSplitter::from_config(config),
            preview_chars: config.title_preview_chars,
        }
    }

    pub fn splitter(&self) -> &FixedLengthSplitter {
        &self.splitter
    }
}

impl Chunker for FixedLengthChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.is_empty() {
            return Vec::new();
        }
        let pieces = self
            .splitter
            .split(&document.text)
            .into_iter()
            .map(|text| Piece { heading: None, text: text.to_string() })
            .collect();
        materialize(pieces, document, self.preview_chars)
    }
}

// ── Structural splitting ───────────────────────────────────────────

/// Cuts text at detected headings, one chunk per heading section.
///
/// When fewer than `min_boundaries` headings survive collapsing, heading
/// detection is not trusted and the whole text goes through the
/// fixed-length splitter instead. Sections longer than
/// `oversize_factor * max_chunk_size` are re-split with the fixed-length
/// splitter and keep their heading as title. Text before the first heading
/// becomes its own chunk with a preview title.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::StructuralChunker;
///
/// let chunker = StructuralChunker::new(1200, 150);
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug)]
pub struct StructuralChunker {
    detectors: DetectorChain,
    splitter: FixedLengthSplitter,
    max_chunk_size: usize,
    min_boundaries: usize,
    collapse_distance: usize,
    oversize_factor: f64,
    preview_chars: usize,
}

impl StructuralChunker {
    /// Create a chunker with the default detectors and policy.
    pub fn new(max_chunk_size: usize, overlap: usize) -> Self {
        let config = SegmenterConfig { max_chunk_size, overlap, ..SegmenterConfig::default() };
        Self::from_config(&config)
    }

    pub fn from_config(config: &SegmenterConfig) -> Self {
        Self {
            detectors: DetectorChain::default(),
            splitter: FixedLengthSplitter::from_config(config),
            max_chunk_size: config.max_chunk_size.max(1),
            min_boundaries: config.min_boundaries,
            collapse_distance: config.collapse_distance,
            oversize_factor: config.oversize_factor,
            preview_chars: config.title_preview_chars,
        }
    }

    /// Replace the heading detectors.
    pub fn with_detectors(mut self, detectors: DetectorChain) -> Self {
        self.detectors = detectors;
        self
    }

    /// Headings that survive collapsing, in text order.
    pub fn detect_boundaries(&self, text: &str) -> Vec<Boundary> {
        self.detectors.scan(text, self.collapse_distance)
    }

    /// Whether `text` has enough headings for a structural split.
    pub fn uses_structure(&self, text: &str) -> bool {
        self.detect_boundaries(text).len() >= self.min_boundaries
    }

    fn oversize_limit(&self) -> f64 {
        self.oversize_factor * self.max_chunk_size as f64
    }

    fn push_section(&self, pieces: &mut Vec<Piece>, heading: Option<&str>, section: &str) {
        let section = section.trim();
        if section.is_empty() {
            return;
        }
        if char_len(section) as f64 > self.oversize_limit() {
            for part in self.splitter.split(section) {
                pieces.push(Piece { heading: heading.map(str::to_string), text: part.to_string() });
            }
        } else {
            pieces.push(Piece { heading: heading.map(str::to_string), text: section.to_string() });
        }
    }

    fn pieces(&self, text: &str) -> Vec<Piece> {
        let boundaries = self.detect_boundaries(text);
        if boundaries.is_empty() || boundaries.len() < self.min_boundaries {
            debug!(
                boundaries = boundaries.len(),
                min_boundaries = self.min_boundaries,
                "too few headings, using fixed-length split"
            );
            return self
                .splitter
                .split(text)
                .into_iter()
                .map(|t| Piece { heading: None, text: t.to_string() })
                .collect();
        }

        debug!(boundaries = boundaries.len(), "splitting at detected headings");
        let mut pieces = Vec::with_capacity(boundaries.len() + 1);
        self.push_section(&mut pieces, None, &text[..boundaries[0].position]);
        for (i, boundary) in boundaries.iter().enumerate() {
            let end = boundaries.get(i + 1).map_or(text.len(), |next| next.position);
            self.push_section(&mut pieces, Some(&boundary.heading), &text[boundary.position..end]);
        }
        pieces
    }
}

impl Chunker for StructuralChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.is_empty() {
            return Vec::new();
        }
        materialize(self.pieces(&document.text), document, self.preview_chars)
    }
}

// ── Paragraph merging ──────────────────────────────────────────────

/// Splits on line breaks into paragraphs and merges short ones forward.
///
/// Paragraphs longer than `max_chunk_size` are split at sentence ends and
/// re-packed up to `max_chunk_size`; a single sentence that is still too
/// long goes through the fixed-length splitter. A unit shorter than
/// `min_chunk_size` is joined with the following one. A short final unit is
/// kept only if it has at least `trailing_floor` characters.
#[derive(Debug, Clone)]
pub struct ParagraphChunker {
    splitter: FixedLengthSplitter,
    max_chunk_size: usize,
    min_chunk_size: usize,
    trailing_floor: usize,
    preview_chars: usize,
}

impl ParagraphChunker {
    pub fn new(max_chunk_size: usize, min_chunk_size: usize) -> Self {
        let config = SegmenterConfig {
            max_chunk_size,
            min_chunk_size,
            overlap: 0,
            ..SegmenterConfig::default()
        };
        Self::from_config(&config)
    }

    pub fn from_config(config: &SegmenterConfig) -> Self {
        Self {
            splitter: FixedLengthSplitter::from_config(config),
            max_chunk_size: config.max_chunk_size.max(1),
            min_chunk_size: config.min_chunk_size,
            trailing_floor: config.trailing_floor,
            preview_chars: config.title_preview_chars,
        }
    }

    /// Override the minimum length of a final short unit.
    pub fn with_trailing_floor(mut self, floor: usize) -> Self {
        self.trailing_floor = floor;
        self
    }

    fn units(&self, text: &str) -> Vec<String> {
        let mut units = Vec::new();
        for paragraph in text.split('\n').map(str::trim).filter(|p| !p.is_empty()) {
            if char_len(paragraph) <= self.max_chunk_size {
                units.push(paragraph.to_string());
            } else {
                units.extend(self.pack_sentences(paragraph));
            }
        }
        units
    }

    fn pack_sentences(&self, paragraph: &str) -> Vec<String> {
        let mut packed = Vec::new();
        let mut current = String::new();
        for sentence in split_sentences(paragraph) {
            if char_len(sentence) > self.max_chunk_size {
                if !current.is_empty() {
                    packed.push(std::mem::take(&mut current));
                }
                packed.extend(self.splitter.split(sentence).into_iter().map(str::to_string));
                continue;
            }
            if current.is_empty() {
                current = sentence.to_string();
            } else if char_len(&current) + 1 + char_len(sentence) <= self.max_chunk_size {
                current.push(' ');
                current.push_str(sentence);
            } else {
                packed.push(std::mem::replace(&mut current, sentence.to_string()));
            }
        }
        if !current.is_empty() {
            packed.push(current);
        }
        packed
    }

    fn pieces(&self, text: &str) -> Vec<Piece> {
        let mut out = Vec::new();
        let mut carry: Option<String> = None;

        for unit in self.units(text) {
            let candidate = match carry.take() {
                Some(short) if char_len(&short) + 1 + char_len(&unit) <= self.max_chunk_size => {
                    format!("{short} {unit}")
                }
                Some(short) => {
                    // Merging would overflow the window; the short unit stands alone.
                    out.push(short);
                    unit
                }
                None => unit,
            };
            if char_len(&candidate) >= self.min_chunk_size {
                out.push(candidate);
            } else {
                carry = Some(candidate);
            }
        }

        if let Some(last) = carry {
            if char_len(&last) >= self.trailing_floor {
                out.push(last);
            } else {
                debug!(chars = char_len(&last), floor = self.trailing_floor, "dropping short trailing unit");
            }
        }

        out.into_iter().map(|text| Piece { heading: None, text }).collect()
    }
}

impl Chunker for ParagraphChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.is_empty() {
            return Vec::new();
        }
        materialize(self.pieces(&document.text), document, self.preview_chars)
    }
}

/// Split after `。！？` always and after `.!?` when followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut iter = text.char_indices().peekable();
    while let Some((i, c)) = iter.next() {
        let end = i + c.len_utf8();
        let boundary = match c {
            '。' | '！' | '？' => true,
            '.' | '!' | '?' => iter.peek().is_none_or(|(_, next)| next.is_whitespace()),
            _ => false,
        };
        if boundary {
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new(text, "medical")
    }

    /// Five well separated numbered sections.
    fn structured_text(body_len: usize) -> String {
        (1..=5)
            .map(|i| format!("{i} Section number{i}\n{}\n", "x".repeat(body_len)))
            .collect::<String>()
    }

    #[test]
    fn empty_text_produces_no_chunks() {
        assert!(StructuralChunker::new(100, 10).chunk(&doc("")).is_empty());
        assert!(FixedLengthChunker::new(100, 10).chunk(&doc("")).is_empty());
        assert!(ParagraphChunker::new(100, 10).chunk(&doc("")).is_empty());
    }

    #[test]
    fn whitespace_only_text_produces_no_chunks() {
        assert!(StructuralChunker::new(100, 10).chunk(&doc("  \n\n \t")).is_empty());
    }

    #[test]
    fn fixed_split_without_terminators_cuts_at_window_edges() {
        let text = "a".repeat(250);
        let splitter = FixedLengthSplitter::new(100, 20);
        let spans = splitter.spans(&text);
        assert_eq!(spans, vec![0..100, 80..180, 160..250]);
    }

    #[test]
    fn fixed_split_snaps_to_nearest_terminator() {
        // Terminators at char 89 (cut 90) and 104 (cut 105); window edge 100.
        let mut text: Vec<char> = "a".repeat(200).chars().collect();
        text[89] = '.';
        text[104] = '!';
        let text: String = text.into_iter().collect();
        let spans = FixedLengthSplitter::new(100, 0).spans(&text);
        // 105 is 5 away from the edge, 90 is 10 away.
        assert_eq!(spans[0], 0..105);
    }

    #[test]
    fn fixed_split_handles_multibyte_text() {
        let text = "数据。".repeat(100);
        let pieces = FixedLengthSplitter::new(50, 5).split(&text);
        assert!(pieces.len() > 1);
        for piece in &pieces {
            assert!(char_len(piece) <= 75);
            assert!(piece.ends_with('。'));
        }
    }

    #[test]
    fn fixed_split_terminates_when_overlap_would_stall() {
        // Snap pulls every cut back to just after the terminator, so
        // cut - overlap would not advance; the splitter still moves on.
        let text = "ab.".repeat(200);
        let spans = FixedLengthSplitter::new(10, 9).with_snap_window(5).spans(&text);
        assert!(spans.windows(2).all(|w| w[1].start > w[0].start));
        assert_eq!(spans.last().map(|r| r.end), Some(text.len()));
    }

    #[test]
    fn fixed_spans_cover_the_whole_text() {
        let text = "Sentence one. Sentence two is longer!\nAnd a third?".repeat(40);
        let spans = FixedLengthSplitter::new(120, 30).spans(&text);
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans.last().map(|r| r.end), Some(text.len()));
        for w in spans.windows(2) {
            assert!(w[1].start <= w[0].end, "gap between {:?} and {:?}", w[0], w[1]);
        }
    }

    #[test]
    fn adrenal_scenario_falls_back_because_of_the_gate() {
        let text = "7 Adrenal glands\nThe adrenal glands are small organs...\n8 Adrenal tumors\nTumors of the adrenal gland...";
        let chunker = StructuralChunker::new(1000, 100);
        assert_eq!(chunker.detect_boundaries(text).len(), 2);
        assert!(!chunker.uses_structure(text));

        let chunks = chunker.chunk(&doc(text));
        let fallback = FixedLengthChunker::new(1000, 100).chunk(&doc(text));
        assert_eq!(chunks, fallback);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].title, "7 Adrenal glands The adrenal glands are small orga...");
    }

    #[test]
    fn no_headings_falls_back_even_without_a_gate() {
        let text = "plain prose with no headings at all.";
        let config = SegmenterConfig { min_boundaries: 0, ..SegmenterConfig::default() };
        let chunks = StructuralChunker::from_config(&config).chunk(&doc(text));
        assert_eq!(chunks, FixedLengthChunker::from_config(&config).chunk(&doc(text)));
        assert_eq!(chunks.len(), 1);

        let bare = StructuralChunker::new(1000, 100).with_detectors(DetectorChain::empty());
        assert_eq!(bare.chunk(&doc(&structured_text(40))).len(), 1);
    }

    #[test]
    fn structural_split_uses_headings_as_titles() {
        let text = format!("Preface text.\n{}", structured_text(80));
        let chunks = StructuralChunker::new(1000, 100).chunk(&doc(&text));
        let titles: Vec<&str> = chunks.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Preface text....",
                "1 Section number",
                "2 Section number",
                "3 Section number",
                "4 Section number",
                "5 Section number",
            ]
        );
        assert!(chunks[1].text.starts_with("1 Section number1"));
        assert!(chunks[1].text.ends_with(&"x".repeat(80)));
    }

    #[test]
    fn oversized_sections_are_resplit_in_place() {
        let mut text = structured_text(60);
        // Make section 3 far longer than 1.5 x 100.
        text = text.replace(
            &format!("3 Section number3\n{}\n", "x".repeat(60)),
            &format!("3 Section number3\n{}\n", "long sentence here. ".repeat(30)),
        );
        let chunks = StructuralChunker::new(100, 10).chunk(&doc(&text));
        for chunk in &chunks {
            assert!(chunk.char_len() > 0);
            assert!(chunk.char_len() as f64 <= 150.0, "chunk too long: {}", chunk.char_len());
        }
        let section3: Vec<&Chunk> = chunks.iter().filter(|c| c.title == "3 Section number").collect();
        assert!(section3.len() > 1);
        // Pieces of section 3 sit between sections 2 and 4.
        let first = section3[0].chunk_index;
        assert_eq!(chunks[first - 1].title, "2 Section number");
        let last = section3.last().map(|c| c.chunk_index).unwrap_or_default();
        assert_eq!(chunks[last + 1].title, "4 Section number");
    }

    #[test]
    fn ids_are_sequential_and_zero_padded() {
        let chunks = StructuralChunker::new(100, 10).chunk(&doc(&structured_text(60)));
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.id, format!("medical_{i:06}"));
            assert_eq!(chunk.corpus_name, "medical");
        }
    }

    #[test]
    fn missing_corpus_name_uses_default() {
        let document = Document { text: "Some body text.".into(), ..Document::default() };
        let chunks = FixedLengthChunker::new(100, 0).chunk(&document);
        assert_eq!(chunks[0].id, format!("{DEFAULT_CORPUS_NAME}_000000"));
    }

    #[test]
    fn source_is_carried_onto_chunks() {
        let document = doc("Some body text.").with_source("medical.json");
        let chunks = FixedLengthChunker::new(100, 0).chunk(&document);
        assert_eq!(chunks[0].source.as_deref(), Some("medical.json"));
    }

    #[test]
    fn preview_title_collapses_newlines() {
        assert_eq!(preview_title("line one\nline two", 50), "line one line two...");
        assert_eq!(preview_title("abcdef", 3), "abc...");
    }

    #[test]
    fn paragraph_chunker_merges_short_units_forward() {
        let text = "Short intro.\nThis second paragraph is long enough to stand on its own as a chunk.";
        let chunks = ParagraphChunker::new(200, 40).chunk(&doc(text));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.starts_with("Short intro. This second"));
    }

    #[test]
    fn paragraph_chunker_drops_tiny_trailing_unit() {
        let text = format!("{}\nok", "p".repeat(60));
        let chunks = ParagraphChunker::new(200, 40).chunk(&doc(&text));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "p".repeat(60));
    }

    #[test]
    fn paragraph_chunker_keeps_trailing_unit_above_floor() {
        let tail = "t".repeat(55);
        let text = format!("{}\n{tail}", "p".repeat(120));
        let chunks = ParagraphChunker::new(200, 100).chunk(&doc(&text));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, tail);

        let strict = ParagraphChunker::new(200, 100).with_trailing_floor(60).chunk(&doc(&text));
        assert_eq!(strict.len(), 1);
    }

    #[test]
    fn paragraph_chunker_emits_short_unit_that_cannot_merge() {
        let text = format!("tiny\n{}", "q".repeat(100));
        let chunks = ParagraphChunker::new(100, 50).chunk(&doc(&text));
        let bodies: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(bodies, vec!["tiny".to_string(), "q".repeat(100)]);
    }

    #[test]
    fn paragraph_chunker_packs_sentences_of_long_paragraphs() {
        let paragraph = "This is a sentence of moderate length. ".repeat(10);
        let chunks = ParagraphChunker::new(100, 10).chunk(&doc(&paragraph));
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.char_len() <= 100);
            assert!(chunk.text.ends_with('.'));
        }
    }

    #[test]
    fn sentences_split_on_cjk_and_ascii_terminators() {
        assert_eq!(split_sentences("第一句。第二句！Third one. Fourth"), vec![
            "第一句。",
            "第二句！",
            "Third one.",
            "Fourth"
        ]);
        assert_eq!(split_sentences("e.g. value 3.5 ok"), vec!["e.g.", "value 3.5 ok"]);
    }

    #[test]
    fn chunker_for_selects_strategy() {
        let text = format!("start\n{}", "word ".repeat(40));
        let config = SegmenterConfig {
            strategy: ChunkingStrategy::Paragraph,
            max_chunk_size: 500,
            min_chunk_size: 10,
            overlap: 0,
            ..SegmenterConfig::default()
        };
        let chunks = chunker_for(&config).chunk(&doc(&text));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.starts_with("start word"));
    }

    #[test]
    fn segment_convenience_uses_corpus_name() {
        let chunks = segment("Plain text without headings.", "pubmed", 100, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "pubmed_000000");
    }
}
