//! Structural segmentation stage: walk a markdown document and split it into top-level blocks
//! (headings, paragraphs, code blocks, tables, lists, blockquotes), tracking the heading
//! hierarchy each block sits under.
//!
//! Segments preserve the original source text verbatim (via `pulldown_cmark`'s byte-offset
//! events) rather than re-rendering markdown, so code blocks and tables survive unmodified into
//! the size-control pass.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

use super::ChunkType;

/// A structurally-identified block of the source document, not yet size-controlled.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Verbatim source text for this block.
    pub text: String,
    /// The structural category of this block.
    pub chunk_type: ChunkType,
    /// Heading titles enclosing this block, outermost first.
    pub header_hierarchy: Vec<String>,
    /// Fence info-string language, for `ChunkType::CodeBlock` segments with one (e.g. `"python"`).
    pub language: Option<String>,
}

/// Segment a markdown document into top-level structural blocks.
pub fn segment(source: &str) -> Vec<Segment> {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let parser = Parser::new_ext(source, options);

    let mut segments = Vec::new();
    let mut depth: i32 = 0;
    let mut block_start: usize = 0;
    let mut current_kind: Option<ChunkType> = None;
    let mut current_language: Option<String> = None;
    let mut header_stack: Vec<(u8, String)> = Vec::new();
    let mut capturing_heading_level: Option<u8> = None;
    let mut heading_title = String::new();

    for (event, range) in parser.into_offset_iter() {
        match &event {
            Event::Start(tag) => {
                if depth == 0 {
                    block_start = range.start;
                    current_kind = classify(tag);
                    current_language = code_block_language(tag);
                    if let Tag::Heading { level, .. } = tag {
                        capturing_heading_level = Some(heading_level_number(*level));
                        heading_title.clear();
                    }
                }
                depth += 1;
            }
            Event::End(tag_end) => {
                depth -= 1;
                if capturing_heading_level.is_some() {
                    // still inside a heading whose children just closed; nothing to do here
                }
                if depth == 0 {
                    let text = source[block_start..range.end].to_string();
                    if let Some(kind) = current_kind.take() {
                        let hierarchy: Vec<String> =
                            header_stack.iter().map(|(_, title)| title.clone()).collect();
                        segments.push(Segment {
                            text,
                            chunk_type: kind,
                            header_hierarchy: hierarchy,
                            language: current_language.take(),
                        });
                    }
                    if let (TagEnd::Heading(level), Some(captured_level)) =
                        (tag_end, capturing_heading_level.take())
                    {
                        let level_num = heading_level_number(*level);
                        debug_assert_eq!(level_num, captured_level);
                        header_stack.retain(|(l, _)| *l < level_num);
                        let title = heading_title.trim().to_string();
                        header_stack.push((level_num, title));
                    }
                }
            }
            Event::Text(text) | Event::Code(text) => {
                if capturing_heading_level.is_some() {
                    heading_title.push_str(text);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if capturing_heading_level.is_some() {
                    heading_title.push(' ');
                }
            }
            _ => {}
        }
    }

    segments
}

fn classify(tag: &Tag<'_>) -> Option<ChunkType> {
    match tag {
        Tag::Heading { .. } => Some(ChunkType::Heading),
        Tag::Paragraph => Some(ChunkType::Prose),
        Tag::CodeBlock(_) => Some(ChunkType::CodeBlock),
        Tag::Table(_) => Some(ChunkType::Table),
        Tag::List(_) => Some(ChunkType::List),
        Tag::BlockQuote(_) => Some(ChunkType::Blockquote),
        _ => None,
    }
}

fn code_block_language(tag: &Tag<'_>) -> Option<String> {
    match tag {
        Tag::CodeBlock(CodeBlockKind::Fenced(info)) => {
            let lang = info.split_whitespace().next().unwrap_or("");
            if lang.is_empty() { None } else { Some(lang.to_string()) }
        }
        _ => None,
    }
}

fn heading_level_number(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_headings_and_paragraphs() {
        let text = "# Title\n\nIntro paragraph.\n\n## Section\n\nBody text.";
        let segments = segment(text);

        let headings: Vec<_> = segments
            .iter()
            .filter(|s| s.chunk_type == ChunkType::Heading)
            .collect();
        assert_eq!(headings.len(), 2);

        let body = segments
            .iter()
            .find(|s| s.chunk_type == ChunkType::Prose && s.text.contains("Body text"))
            .expect("body segment");
        assert_eq!(body.header_hierarchy, vec!["Title".to_string(), "Section".to_string()]);
    }

    #[test]
    fn segments_code_blocks_verbatim() {
        let text = "# Doc\n\n```rust\nfn main() {}\n```\n";
        let segments = segment(text);
        let code = segments
            .iter()
            .find(|s| s.chunk_type == ChunkType::CodeBlock)
            .expect("code segment");
        assert!(code.text.contains("fn main()"));
        assert_eq!(code.language.as_deref(), Some("rust"));
    }

    #[test]
    fn code_block_without_info_string_has_no_language() {
        let text = "```\nplain fence\n```\n";
        let segments = segment(text);
        let code = segments
            .iter()
            .find(|s| s.chunk_type == ChunkType::CodeBlock)
            .expect("code segment");
        assert_eq!(code.language, None);
    }

    #[test]
    fn deeper_heading_pops_shallower_siblings() {
        let text = "# A\n\n## B\n\ntext under b\n\n# C\n\ntext under c";
        let segments = segment(text);
        let under_c = segments
            .iter()
            .find(|s| s.text.contains("text under c"))
            .expect("segment under c");
        assert_eq!(under_c.header_hierarchy, vec!["C".to_string()]);
    }

    #[test]
    fn empty_document_has_no_segments() {
        assert!(segment("").is_empty());
    }
}
