//! Size-control stage: split a structural segment into chunks that respect a character budget,
//! with a sliding overlap carried from the tail of the previous chunk.
//!
//! Adapted from token-budget chunk-overlap mechanics, with the token counter replaced by a plain
//! character count and the token-aware semantic splitter replaced by a greedy, whitespace-boundary
//! packer: words are appended to the current chunk until adding the next one would exceed the
//! budget, at which point a new chunk starts.

/// Split `text` into chunks of at most `chunk_size` characters, carrying up to `overlap`
/// characters from the tail of each chunk into the next one.
///
/// Returns an empty vector for blank input, and a single chunk when `text` already fits.
pub fn split_to_budget(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let base_chunks = greedy_pack(text, chunk_size);
    apply_overlap(base_chunks, chunk_size, overlap)
}

/// Greedily pack whitespace-separated words into chunks no longer than `chunk_size` characters.
///
/// A single word longer than `chunk_size` is kept whole as its own chunk rather than being cut
/// mid-word.
fn greedy_pack(text: &str, chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let projected_len = if current.is_empty() {
            word.len()
        } else {
            current.len() + 1 + word.len()
        };
        if !current.is_empty() && projected_len > chunk_size {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Apply a character-limited overlap between the tail of the previous chunk and the current one.
fn apply_overlap(chunks: Vec<String>, chunk_size: usize, overlap: usize) -> Vec<String> {
    if chunks.is_empty() {
        return chunks;
    }

    let effective_overlap = overlap.min(chunk_size.saturating_sub(1));
    if effective_overlap == 0 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut iter = chunks.into_iter();
    let mut previous = iter.next().expect("non-empty chunk list");
    overlapped.push(previous.clone());

    for current in iter {
        let combined = build_overlapped_chunk(&previous, &current, effective_overlap, chunk_size);
        overlapped.push(combined);
        previous = current;
    }

    overlapped
}

fn build_overlapped_chunk(previous: &str, current: &str, overlap: usize, chunk_size: usize) -> String {
    let tail = tail_with_char_limit(previous, overlap);
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);

    if !tail.is_empty() {
        combined.push_str(tail);
        if !ends_with_whitespace(tail) && !starts_with_whitespace(current) {
            combined.push(' ');
        }
    }

    combined.push_str(current);
    trim_to_char_budget(&combined, chunk_size)
}

/// Return the longest suffix of `text` that is at most `limit` characters, trimmed to a word
/// boundary where possible.
fn tail_with_char_limit(text: &str, limit: usize) -> &str {
    if limit == 0 || text.is_empty() {
        return "";
    }

    let char_count = text.chars().count();
    if char_count <= limit {
        return text.trim_start();
    }

    let skip = char_count - limit;
    let byte_offset = text
        .char_indices()
        .nth(skip)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len());

    let candidate = &text[byte_offset..];
    match candidate.find(char::is_whitespace) {
        Some(space_idx) => candidate[space_idx..].trim_start(),
        None => candidate,
    }
}

/// Trim `text` down to `budget` characters, preferring to cut at a word boundary.
fn trim_to_char_budget(text: &str, budget: usize) -> String {
    if budget == 0 {
        return String::new();
    }
    if text.chars().count() <= budget {
        return text.to_string();
    }

    let byte_offset = text
        .char_indices()
        .nth(budget)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len());

    let prefix = &text[..byte_offset];
    match prefix.rfind(char::is_whitespace) {
        Some(space_idx) if space_idx > 0 => prefix[..space_idx].trim_end().to_string(),
        _ => prefix.to_string(),
    }
}

fn starts_with_whitespace(text: &str) -> bool {
    text.chars().next().map(|c| c.is_whitespace()).unwrap_or(false)
}

fn ends_with_whitespace(text: &str) -> bool {
    text.chars().next_back().map(|c| c.is_whitespace()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_long_text_within_budget() {
        let text = "one two three four five six seven eight nine ten";
        let chunks = split_to_budget(text, 12, 0);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 12, "chunk exceeded budget: {chunk:?}");
        }
    }

    #[test]
    fn single_chunk_when_text_fits() {
        let chunks = split_to_budget("short text", 1000, 0);
        assert_eq!(chunks, vec!["short text".to_string()]);
    }

    #[test]
    fn blank_input_yields_no_chunks() {
        assert!(split_to_budget("   \n\t ", 100, 10).is_empty());
    }

    #[test]
    fn overlap_carries_tail_into_next_chunk() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let chunks = split_to_budget(text, 20, 8);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 20);
        }
        assert!(chunks[1].starts_with("gamma") || chunks[0].ends_with("gamma") || chunks[1].contains("gamma"));
    }

    #[test]
    fn oversized_single_word_is_kept_whole() {
        let word = "a".repeat(50);
        let chunks = split_to_budget(&word, 10, 0);
        assert_eq!(chunks, vec![word]);
    }
}
