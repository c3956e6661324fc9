//! Hierarchical document chunking.
//!
//! The chunker splits a document into a tree of chunks: root chunks cover
//! coarse spans (sections in semantic mode), child chunks recursively split
//! oversized parents on natural boundaries (paragraphs, lines, sentences)
//! until the text fits the configured size or the tree reaches `max_depth`.
//! Chunks are emitted through a callback in tree order: parent first,
//! document order among siblings.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Byte span of a chunk within the original document text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPosition {
    /// Start offset (bytes).
    pub start: usize,

    /// End offset (bytes, exclusive).
    pub end: usize,
}

/// Time span of a chunk within an audio/video source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPosition {
    /// Start of the span in milliseconds.
    pub start_ms: u64,

    /// End of the span in milliseconds.
    pub end_ms: u64,
}

/// Type of content in a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    /// A section introduced by a heading.
    Section,
    /// A paragraph of prose.
    Paragraph,
    /// A fenced code block.
    Code,
    /// Generic text.
    Text,
}

/// A node of the chunk tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier, stable within one chunking pass.
    pub id: String,

    /// The chunk text. Non-first sibling leaves carry overlap context from
    /// their predecessor; `text_pos` always refers to the original span.
    pub text: String,

    /// Type of content.
    pub chunk_type: ChunkType,

    /// Depth in the tree; roots are at depth 0.
    pub depth: u32,

    /// Emission index in document tree order.
    pub index: usize,

    /// Parent chunk id; `None` exactly for roots.
    pub parent_id: Option<String>,

    /// Whether this chunk has no children.
    pub leaf: bool,

    /// Whether this chunk is a root.
    pub root: bool,

    /// Byte span in the original document.
    pub text_pos: TextPosition,

    /// Time span in the original media, when the source was audio/video.
    pub media_pos: Option<MediaPosition>,
}

/// Configuration for a chunking pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingOptions {
    /// Target chunk size in bytes.
    pub size: usize,

    /// Overlap carried between sibling leaves, in bytes.
    pub overlap: usize,

    /// Maximum tree height; 1 means root-only chunks.
    pub max_depth: u32,

    /// Maximum concurrent adapter calls downstream stages may issue per
    /// chunk batch.
    pub max_concurrent: usize,

    /// Whether to split on structural boundaries (headings, paragraphs,
    /// fenced code) instead of raw windows.
    pub semantic: bool,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            size: 1600,
            overlap: 200,
            max_depth: 2,
            max_concurrent: 4,
            semantic: true,
        }
    }
}

/// Capability interface for chunking.
///
/// Implementations must assign every chunk a unique id, set `parent_id` and
/// `depth` consistently, and emit roots in document order with each parent
/// before its children.
pub trait Chunker: Send + Sync {
    /// Short name used in error context.
    fn name(&self) -> &str;

    /// Split `text` and stream the resulting chunks through `emit`.
    fn chunk(
        &self,
        text: &str,
        options: &ChunkingOptions,
        emit: &mut dyn FnMut(Chunk),
    ) -> Result<()>;
}

const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " "];

/// Factor applied to `size` to obtain the span a root chunk covers.
const ROOT_SPAN_FACTOR: usize = 4;

/// Built-in hierarchical chunker.
pub struct HierarchicalChunker;

impl HierarchicalChunker {
    /// Create a new chunker.
    pub fn new() -> Self {
        Self
    }
}

impl Default for HierarchicalChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunker for HierarchicalChunker {
    fn name(&self) -> &str {
        "hierarchical"
    }

    fn chunk(
        &self,
        text: &str,
        options: &ChunkingOptions,
        emit: &mut dyn FnMut(Chunk),
    ) -> Result<()> {
        let root_span = options.size.saturating_mul(ROOT_SPAN_FACTOR).max(options.size);

        let blocks = if options.semantic {
            parse_blocks(text)
        } else {
            vec![Block {
                text: text.to_string(),
                offset: 0,
                block_type: ChunkType::Text,
                heading: false,
            }]
        };

        // Oversized blocks are pre-split so root packing has bounded input.
        let mut sized_blocks = Vec::new();
        for block in blocks {
            if block.text.len() <= root_span {
                sized_blocks.push(block);
            } else {
                for (offset, piece) in split_to_size(&block.text, root_span, SEPARATORS) {
                    sized_blocks.push(Block {
                        text: piece,
                        offset: block.offset + offset,
                        block_type: block.block_type,
                        heading: false,
                    });
                }
            }
        }

        let roots = pack_roots(sized_blocks, root_span);

        let mut index = 0usize;
        for root in roots {
            emit_tree(
                &root.text,
                root.offset,
                root.chunk_type,
                0,
                None,
                options,
                &mut index,
                emit,
            );
        }

        Ok(())
    }
}

/// A structural block of the document.
struct Block {
    text: String,
    offset: usize,
    block_type: ChunkType,
    heading: bool,
}

/// A packed root span.
struct RootSpan {
    text: String,
    offset: usize,
    chunk_type: ChunkType,
}

/// Parse the document into structural blocks: headings, fenced code,
/// paragraphs.
fn parse_blocks(text: &str) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut current = String::new();
    let mut current_start = 0usize;
    let mut in_code = false;
    let mut offset = 0usize;

    let mut flush = |buffer: &mut String, start: usize, block_type: ChunkType, heading: bool| {
        let trimmed = buffer.trim_end();
        if !trimmed.is_empty() {
            blocks.push(Block {
                text: trimmed.to_string(),
                offset: start,
                block_type,
                heading,
            });
        }
        buffer.clear();
    };

    for line in text.split_inclusive('\n') {
        let stripped = line.trim_end_matches('\n');
        let trimmed = stripped.trim_start();

        if trimmed.starts_with("```") {
            if in_code {
                current.push_str(stripped);
                flush(&mut current, current_start, ChunkType::Code, false);
                in_code = false;
            } else {
                flush(&mut current, current_start, ChunkType::Paragraph, false);
                in_code = true;
                current_start = offset;
                current.push_str(line);
            }
            offset += line.len();
            continue;
        }

        if in_code {
            current.push_str(line);
            offset += line.len();
            continue;
        }

        if heading_level(stripped).is_some() {
            flush(&mut current, current_start, ChunkType::Paragraph, false);
            current_start = offset;
            current.push_str(stripped);
            flush(&mut current, current_start, ChunkType::Section, true);
            offset += line.len();
            current_start = offset;
            continue;
        }

        if trimmed.is_empty() {
            flush(&mut current, current_start, ChunkType::Paragraph, false);
            offset += line.len();
            current_start = offset;
            continue;
        }

        if current.is_empty() {
            current_start = offset;
        }
        current.push_str(line);
        offset += line.len();
    }

    let block_type = if in_code { ChunkType::Code } else { ChunkType::Paragraph };
    flush(&mut current, current_start, block_type, false);

    blocks
}

/// Detect a markdown heading level (1-6).
fn heading_level(line: &str) -> Option<u8> {
    let trimmed = line.trim();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if rest.is_empty() || rest.starts_with(' ') {
        Some(level as u8)
    } else {
        None
    }
}

/// Pack blocks into root spans: a heading starts a new root, and a root never
/// exceeds `root_span` bytes.
fn pack_roots(blocks: Vec<Block>, root_span: usize) -> Vec<RootSpan> {
    let mut roots: Vec<RootSpan> = Vec::new();
    let mut current: Option<RootSpan> = None;

    for block in blocks {
        let start_new = match &current {
            None => true,
            Some(root) => {
                block.heading || root.text.len() + 2 + block.text.len() > root_span
            }
        };

        if start_new {
            if let Some(root) = current.take() {
                roots.push(root);
            }
            current = Some(RootSpan {
                text: block.text,
                offset: block.offset,
                chunk_type: if block.heading {
                    ChunkType::Section
                } else {
                    block.block_type
                },
            });
        } else if let Some(root) = current.as_mut() {
            root.text.push_str("\n\n");
            root.text.push_str(&block.text);
            if block.heading {
                root.chunk_type = ChunkType::Section;
            }
        }
    }

    if let Some(root) = current {
        roots.push(root);
    }

    roots
}

/// Emit a chunk and, when it is oversized and depth allows, its subtree.
#[allow(clippy::too_many_arguments)]
fn emit_tree(
    text: &str,
    base_offset: usize,
    chunk_type: ChunkType,
    depth: u32,
    parent_id: Option<&str>,
    options: &ChunkingOptions,
    index: &mut usize,
    emit: &mut dyn FnMut(Chunk),
) {
    let split = text.len() > options.size && depth + 1 < options.max_depth.max(1);
    let id = Uuid::new_v4().to_string();

    emit(Chunk {
        id: id.clone(),
        text: text.to_string(),
        chunk_type,
        depth,
        index: *index,
        parent_id: parent_id.map(str::to_string),
        leaf: !split,
        root: parent_id.is_none(),
        text_pos: TextPosition {
            start: base_offset,
            end: base_offset + text.len(),
        },
        media_pos: None,
    });
    *index += 1;

    if !split {
        return;
    }

    let pieces = split_to_size(text, options.size, SEPARATORS);
    let mut previous: Option<String> = None;

    for (offset, piece) in pieces {
        let child_depth = depth + 1;
        let needs_recursion = piece.len() > options.size && child_depth + 1 < options.max_depth;

        if needs_recursion {
            emit_tree(
                &piece,
                base_offset + offset,
                ChunkType::Text,
                child_depth,
                Some(&id),
                options,
                index,
                emit,
            );
            previous = Some(piece);
            continue;
        }

        // Leaf child: prepend overlap context from the previous sibling.
        let mut child_text = piece.clone();
        if options.overlap > 0 {
            if let Some(prev) = &previous {
                let tail = tail_bytes(prev, options.overlap);
                if !tail.is_empty() {
                    child_text = format!("{tail}{child_text}");
                }
            }
        }

        emit(Chunk {
            id: Uuid::new_v4().to_string(),
            text: child_text,
            chunk_type: ChunkType::Text,
            depth: child_depth,
            index: *index,
            parent_id: Some(id.clone()),
            leaf: true,
            root: false,
            text_pos: TextPosition {
                start: base_offset + offset,
                end: base_offset + offset + piece.len(),
            },
            media_pos: None,
        });
        *index += 1;
        previous = Some(piece);
    }
}

/// Split `text` into pieces of at most `size` bytes, preferring the earliest
/// separator in the cascade, and recursing to finer separators for parts that
/// still do not fit. Returns `(offset_within_text, piece)` pairs.
fn split_to_size(text: &str, size: usize, separators: &[&str]) -> Vec<(usize, String)> {
    if text.len() <= size || separators.is_empty() {
        return vec![(0, text.to_string())];
    }

    let separator = separators[0];
    let finer = &separators[1..];
    let parts: Vec<&str> = text.split(separator).collect();
    if parts.len() == 1 {
        return split_to_size(text, size, finer);
    }

    let mut pieces: Vec<(usize, String)> = Vec::new();
    let mut current = String::new();
    let mut current_start = 0usize;
    let mut offset = 0usize;

    let flush = |pieces: &mut Vec<(usize, String)>, start: usize, buffer: &str| {
        if buffer.is_empty() {
            return;
        }
        if buffer.len() > size {
            for (inner, piece) in split_to_size(buffer, size, finer) {
                pieces.push((start + inner, piece));
            }
        } else {
            pieces.push((start, buffer.to_string()));
        }
    };

    for (i, part) in parts.iter().enumerate() {
        let grown = if current.is_empty() {
            part.len()
        } else {
            current.len() + separator.len() + part.len()
        };

        if grown > size && !current.is_empty() {
            flush(&mut pieces, current_start, &current);
            current.clear();
            current_start = offset;
            current.push_str(part);
        } else {
            if current.is_empty() {
                current_start = offset;
            } else {
                current.push_str(separator);
            }
            current.push_str(part);
        }

        offset += part.len();
        if i < parts.len() - 1 {
            offset += separator.len();
        }
    }

    flush(&mut pieces, current_start, &current);
    pieces
}

/// Last `n` bytes of `s`, adjusted down to a character boundary.
fn tail_bytes(s: &str, n: usize) -> &str {
    if s.len() <= n {
        return s;
    }
    let mut start = s.len() - n;
    while start < s.len() && !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::{HashMap, HashSet};

    fn collect_chunks(text: &str, options: &ChunkingOptions) -> Vec<Chunk> {
        let chunker = HierarchicalChunker::new();
        let mut chunks = Vec::new();
        chunker
            .chunk(text, options, &mut |chunk| chunks.push(chunk))
            .unwrap();
        chunks
    }

    #[test]
    fn test_small_text_single_root_leaf() {
        let chunks = collect_chunks("Just one paragraph.", &ChunkingOptions::default());

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].root);
        assert!(chunks[0].leaf);
        assert_eq!(chunks[0].depth, 0);
        assert_eq!(chunks[0].parent_id, None);
    }

    #[test]
    fn test_headings_start_new_roots() {
        let text = "# One\n\nFirst section body.\n\n# Two\n\nSecond section body.";
        let chunks = collect_chunks(text, &ChunkingOptions::default());

        let roots: Vec<_> = chunks.iter().filter(|c| c.root).collect();
        assert_eq!(roots.len(), 2);
        assert!(roots[0].text.contains("First section"));
        assert!(roots[1].text.contains("Second section"));
        assert_eq!(roots[0].chunk_type, ChunkType::Section);
        // Roots come out in document order.
        assert!(roots[0].text_pos.start < roots[1].text_pos.start);
    }

    #[test]
    fn test_oversized_root_gets_children() {
        let options = ChunkingOptions {
            size: 80,
            overlap: 0,
            ..ChunkingOptions::default()
        };
        let paragraph = "word ".repeat(100);
        let chunks = collect_chunks(&paragraph, &options);

        let roots: Vec<_> = chunks.iter().filter(|c| c.root).collect();
        let leaves: Vec<_> = chunks.iter().filter(|c| c.leaf).collect();
        assert!(!roots.is_empty());
        assert!(leaves.iter().all(|c| c.text.len() <= options.size));

        // Every non-root points at an emitted parent one level up.
        let by_id: HashMap<&str, &Chunk> =
            chunks.iter().map(|c| (c.id.as_str(), c)).collect();
        for chunk in &chunks {
            match &chunk.parent_id {
                None => assert!(chunk.root),
                Some(parent_id) => {
                    let parent = by_id[parent_id.as_str()];
                    assert_eq!(chunk.depth, parent.depth + 1);
                    assert!(!parent.leaf);
                }
            }
        }
    }

    #[test]
    fn test_tree_order_and_unique_ids() {
        let options = ChunkingOptions {
            size: 60,
            overlap: 10,
            ..ChunkingOptions::default()
        };
        let text = "# A\n\nalpha beta gamma delta epsilon zeta eta theta iota kappa.\n\n\
                    # B\n\nlambda mu nu xi omicron pi rho sigma tau upsilon phi chi.";
        let chunks = collect_chunks(text, &options);

        let ids: HashSet<_> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), chunks.len());

        // Emission index is the position in the stream, parents first.
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            if let Some(parent_id) = &chunk.parent_id {
                let parent_index = chunks
                    .iter()
                    .position(|c| &c.id == parent_id)
                    .unwrap();
                assert!(parent_index < i);
            }
        }
    }

    #[test]
    fn test_max_depth_limits_tree() {
        let options = ChunkingOptions {
            size: 40,
            overlap: 0,
            max_depth: 1,
            ..ChunkingOptions::default()
        };
        let chunks = collect_chunks(&"word ".repeat(200), &options);

        assert!(chunks.iter().all(|c| c.depth == 0));
        assert!(chunks.iter().all(|c| c.leaf && c.root));
    }

    #[test]
    fn test_overlap_prepended_to_following_leaves() {
        let options = ChunkingOptions {
            size: 50,
            overlap: 12,
            semantic: false,
            ..ChunkingOptions::default()
        };
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let chunks = collect_chunks(text, &options);

        let leaves: Vec<_> = chunks.iter().filter(|c| c.leaf && !c.root).collect();
        assert!(leaves.len() >= 2);
        // The second leaf starts with the tail of the first one's span.
        let span_text = &text[leaves[1].text_pos.start..leaves[1].text_pos.end];
        assert!(leaves[1].text.ends_with(span_text));
        assert!(leaves[1].text.len() > span_text.len());
    }

    #[test]
    fn test_code_blocks_stay_intact() {
        let text = "Intro paragraph.\n\n```rust\nfn main() {}\n```\n\nOutro paragraph.";
        let chunks = collect_chunks(text, &ChunkingOptions::default());

        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert!(joined.contains("fn main() {}"));
    }

    #[test]
    fn test_split_to_size_offsets() {
        let text = "aaa bbb ccc ddd";
        let pieces = split_to_size(text, 7, SEPARATORS);

        for (offset, piece) in &pieces {
            assert_eq!(&text[*offset..*offset + piece.len()], piece);
        }
    }

    #[test]
    fn test_heading_level() {
        assert_eq!(heading_level("# Title"), Some(1));
        assert_eq!(heading_level("### Deep"), Some(3));
        assert_eq!(heading_level("#hashtag"), None);
        assert_eq!(heading_level("plain"), None);
    }
}
