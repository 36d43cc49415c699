//! Header-aware markdown chunker.
//!
//! Splits a markdown document into overlapping [`Chunk`]s bounded by a
//! byte-size target, tagging each chunk with the stack of headers it falls
//! under. Chunks overlap by a fixed number of lines so that a concept
//! spanning a boundary is still retrievable from either side.
//!
//! # Algorithm
//!
//! 1. Scan the document line by line, keeping a line buffer, its running
//!    size (bytes, newlines excluded), and a header stack.
//! 2. On an ATX heading of level `n`, pop every stack entry of level
//!    `n` or deeper and push the heading text. If the buffer holds more than
//!    `flush_threshold` bytes of which some line is new (not carried over
//!    as overlap), flush it first so the heading opens a fresh chunk.
//! 3. After appending any line, flush if the size has reached
//!    `target_size`.
//! 4. A flush emits the buffer joined with `\n`, then keeps only its last
//!    `overlap_lines` lines as the start of the next chunk.
//! 5. At end of input, flush whatever new content remains.
//!
//! A heading inside a fenced code block is treated as body text.
//!
//! # Example
//!
//! ```rust
//! use recall_harness_core::chunk::split;
//!
//! let chunks = split("# Notes\n\nfirst line\nsecond line", 1000, 3);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].header_label(), "Notes");
//! ```

use crate::models::Chunk;

/// Buffer size above which a heading forces a flush, independent of the target.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 200;
pub const DEFAULT_TARGET_SIZE: usize = 1000;
pub const DEFAULT_OVERLAP_LINES: usize = 3;

/// Chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub target_size: usize,
    pub overlap_lines: usize,
    pub flush_threshold: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            target_size: DEFAULT_TARGET_SIZE,
            overlap_lines: DEFAULT_OVERLAP_LINES,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }
}

/// Split `document` into chunks of roughly `target_size` bytes sharing
/// `overlap_lines` lines with their neighbours.
///
/// # Guarantees
///
/// - No chunk has empty or whitespace-only text; a blank document
///   yields no chunks.
/// - Every non-blank line of the input appears in at least one chunk.
/// - Each chunk after the first starts with the last
///   `min(overlap_lines, previous.lines)` lines of the previous chunk.
pub fn split(document: &str, target_size: usize, overlap_lines: usize) -> Vec<Chunk> {
    split_with(
        document,
        &ChunkParams {
            target_size,
            overlap_lines,
            ..ChunkParams::default()
        },
    )
}

/// [`split`] with an explicit header-flush threshold.
pub fn split_with(document: &str, params: &ChunkParams) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut headers: Vec<(usize, String)> = Vec::new();
    let mut buf = Buffer::default();
    let mut in_fence = false;

    for line in document.lines() {
        if is_fence(line) {
            in_fence = !in_fence;
        }

        if !in_fence {
            if let Some((level, title)) = parse_heading(line) {
                if buf.fresh && buf.size > params.flush_threshold {
                    buf.flush(&mut chunks, params.overlap_lines);
                }
                while headers.last().is_some_and(|(l, _)| *l >= level) {
                    headers.pop();
                }
                headers.push((level, title));
            }
        }

        buf.push(line, &headers);

        if buf.size >= params.target_size {
            buf.flush(&mut chunks, params.overlap_lines);
        }
    }

    buf.flush(&mut chunks, params.overlap_lines);
    chunks
}

#[derive(Default)]
struct Buffer<'a> {
    lines: Vec<&'a str>,
    size: usize,
    /// Holds a non-blank line appended since the last flush.
    fresh: bool,
    /// Header stack at the first fresh non-blank line.
    header_path: Option<Vec<String>>,
}

impl<'a> Buffer<'a> {
    fn push(&mut self, line: &'a str, headers: &[(usize, String)]) {
        self.lines.push(line);
        self.size += line.len();
        if !line.trim().is_empty() {
            self.fresh = true;
            if self.header_path.is_none() {
                self.header_path = Some(headers.iter().map(|(_, t)| t.clone()).collect());
            }
        }
    }

    fn flush(&mut self, chunks: &mut Vec<Chunk>, overlap_lines: usize) {
        if !self.fresh {
            return;
        }
        chunks.push(Chunk {
            text: self.lines.join("\n"),
            header_path: self.header_path.take().unwrap_or_default(),
            approximate_size: self.size,
        });

        let keep = overlap_lines.min(self.lines.len());
        self.lines.drain(..self.lines.len() - keep);
        self.size = self.lines.iter().map(|l| l.len()).sum();
        self.fresh = false;
    }
}

/// Parse an ATX heading (`#`..`######` followed by a space or end of line).
fn parse_heading(line: &str) -> Option<(usize, String)> {
    let level = line.bytes().take_while(|b| *b == b'#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &line[level..];
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim_end();
    Some((level, title.to_string()))
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}
