//! Two-stage chunking pipeline: a markdown-structural pass followed by a character-budget
//! size-control pass.
//!
//! Stage 1 ([`markdown`]) walks the document and groups content into structural segments
//! (headings, prose paragraphs, code blocks, tables, lists, blockquotes), recording the heading
//! hierarchy each segment sits under. Stage 2 ([`budget`]) takes each structural segment and,
//! when it exceeds the configured character budget, splits it further with a sliding
//! character-limited overlap so adjacent chunks retain shared context. `ChunkStrategy::Baseline`
//! skips stage 1 and runs the whole document through stage 2 directly.

pub mod budget;
pub mod markdown;

use thiserror::Error;

use crate::config::ChunkStrategy;

/// Errors raised while chunking a document.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// `chunk_size` must be at least 1 character.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// The structural category a chunk was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    /// Ordinary paragraph text.
    Prose,
    /// A heading line, kept as its own chunk so it can anchor retrieval.
    Heading,
    /// A fenced or indented code block.
    CodeBlock,
    /// A markdown table.
    Table,
    /// A list (ordered or unordered).
    List,
    /// A blockquote.
    Blockquote,
}

/// A chunk produced by the pipeline, not yet assigned storage identifiers.
#[derive(Debug, Clone)]
pub struct ChunkDraft {
    /// Position of this chunk within the file's chunk sequence, starting at 0.
    pub index: usize,
    /// The chunk's text content.
    pub text: String,
    /// The structural category this chunk was drawn from.
    pub chunk_type: ChunkType,
    /// The heading titles enclosing this chunk, outermost first.
    pub header_hierarchy: Vec<String>,
    /// Fence info-string language, when `chunk_type == ChunkType::CodeBlock` and one was given.
    pub language: Option<String>,
}

/// Chunk a document's full text according to the given strategy and size controls.
///
/// `chunk_size` is a character budget per chunk; `overlap_ratio` (already clamped to
/// `[0.0, 0.3]` by configuration loading) controls how much of the previous chunk's tail is
/// carried into the next chunk during the size-control pass.
pub fn chunk_document(
    text: &str,
    chunk_size: usize,
    overlap_ratio: f32,
    strategy: ChunkStrategy,
) -> Result<Vec<ChunkDraft>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let overlap = ((chunk_size as f32) * overlap_ratio) as usize;

    let segments = match strategy {
        ChunkStrategy::Baseline => vec![markdown::Segment {
            text: text.to_string(),
            chunk_type: ChunkType::Prose,
            header_hierarchy: Vec::new(),
            language: None,
        }],
        ChunkStrategy::MarkdownIntelligent | ChunkStrategy::Auto => markdown::segment(text),
    };

    let mut drafts = Vec::new();
    for segment in segments {
        let pieces = budget::split_to_budget(&segment.text, chunk_size, overlap);
        for piece in pieces {
            drafts.push(ChunkDraft {
                index: drafts.len(),
                text: piece,
                chunk_type: segment.chunk_type,
                header_hierarchy: segment.header_hierarchy.clone(),
                language: segment.language.clone(),
            });
        }
    }

    Ok(drafts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_document_rejects_zero_chunk_size() {
        let err = chunk_document("hello", 0, 0.0, ChunkStrategy::Baseline).unwrap_err();
        assert!(matches!(err, ChunkingError::InvalidChunkSize));
    }

    #[test]
    fn chunk_document_returns_empty_for_blank_input() {
        let drafts = chunk_document("   \n\t  ", 100, 0.1, ChunkStrategy::MarkdownIntelligent).unwrap();
        assert!(drafts.is_empty());
    }

    #[test]
    fn chunk_document_baseline_ignores_structure() {
        let text = "# Title\n\nSome prose here that is reasonably short.";
        let drafts = chunk_document(text, 1000, 0.0, ChunkStrategy::Baseline).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].chunk_type, ChunkType::Prose);
        assert!(drafts[0].header_hierarchy.is_empty());
    }

    #[test]
    fn chunk_document_markdown_intelligent_splits_headings() {
        let text = "# Title\n\nIntro paragraph.\n\n## Section\n\nBody text for the section.";
        let drafts = chunk_document(text, 1000, 0.0, ChunkStrategy::MarkdownIntelligent).unwrap();
        assert!(drafts.iter().any(|d| d.chunk_type == ChunkType::Heading));
        assert!(
            drafts
                .iter()
                .any(|d| d.header_hierarchy == vec!["Title".to_string(), "Section".to_string()])
        );
    }

    #[test]
    fn chunk_document_assigns_sequential_indices() {
        let text = "a ".repeat(500);
        let drafts = chunk_document(&text, 50, 0.1, ChunkStrategy::Baseline).unwrap();
        for (i, draft) in drafts.iter().enumerate() {
            assert_eq!(draft.index, i);
        }
    }
}
