pub mod pipeline;

pub use pipeline::ChunkPipeline;

/// A slice of page text. Offsets and lengths count chars, not bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    pub start_offset: usize,
    pub length: usize,
    pub content: String,
}

/// Split `text` into consecutive, non-overlapping segments of `chunk_size`
/// chars. Only the last segment may be shorter.
pub fn split_into_segments(text: &str, chunk_size: usize) -> Vec<TextSegment> {
    let chunk_size = chunk_size.max(1);
    let mut segments = Vec::new();
    let mut content = String::new();
    let mut start_offset = 0;
    let mut length = 0;

    for ch in text.chars() {
        content.push(ch);
        length += 1;
        if length == chunk_size {
            segments.push(TextSegment {
                start_offset,
                length,
                content: std::mem::take(&mut content),
            });
            start_offset += length;
            length = 0;
        }
    }

    if length > 0 {
        segments.push(TextSegment {
            start_offset,
            length,
            content,
        });
    }

    segments
}

/// The first `chunk_size` chars of `text`, used as a page's music script.
pub fn leading_segment(text: &str, chunk_size: usize) -> &str {
    match text.char_indices().nth(chunk_size) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// The chunks of one page and the index of the next one to dispatch.
#[derive(Debug, Default)]
pub struct ChunkCursor {
    chunks: Vec<TextSegment>,
    next_index: usize,
}

impl ChunkCursor {
    pub fn new(chunks: Vec<TextSegment>) -> Self {
        Self {
            chunks,
            next_index: 0,
        }
    }

    /// Hand out the current chunk and move past it.
    pub fn advance(&mut self) -> Option<&TextSegment> {
        let segment = self.chunks.get(self.next_index)?;
        self.next_index += 1;
        Some(segment)
    }

    pub fn is_exhausted(&self) -> bool {
        self.next_index >= self.chunks.len()
    }

    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(len: usize) -> String {
        "The quick brown fox jumps over the lazy dog. "
            .chars()
            .cycle()
            .take(len)
            .collect()
    }

    #[test]
    fn chunk_count_and_reassembly() {
        for len in [1, 499, 500, 501, 999, 1000, 1234, 2500] {
            let text = page(len);
            let segments = split_into_segments(&text, 500);

            assert_eq!(segments.len(), len.div_ceil(500), "len {len}");
            let (last, full) = segments.split_last().unwrap();
            assert!(full.iter().all(|s| s.length == 500 && s.content.chars().count() == 500));
            assert!(last.length <= 500 && last.length > 0);

            let rebuilt: String = segments.iter().map(|s| s.content.as_str()).collect();
            assert_eq!(rebuilt, text);
        }
    }

    #[test]
    fn offsets_are_contiguous() {
        let segments = split_into_segments(&page(1200), 500);
        let offsets: Vec<_> = segments.iter().map(|s| (s.start_offset, s.length)).collect();
        assert_eq!(offsets, vec![(0, 500), (500, 500), (1000, 200)]);
    }

    #[test]
    fn empty_text_has_no_segments() {
        assert!(split_into_segments("", 500).is_empty());
    }

    #[test]
    fn multibyte_text_splits_on_chars() {
        let text = "é".repeat(750);
        let segments = split_into_segments(&text, 500);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].length, 250);
        assert_eq!(segments[1].content, "é".repeat(250));
    }

    #[test]
    fn leading_segment_caps_length() {
        assert_eq!(leading_segment("short page", 500), "short page");
        let text = format!("{}{}", "ü".repeat(500), "tail");
        assert_eq!(leading_segment(&text, 500), "ü".repeat(500));
    }

    #[test]
    fn cursor_walks_then_stops() {
        let mut cursor = ChunkCursor::new(split_into_segments(&page(600), 500));
        assert_eq!(cursor.len(), 2);
        assert_eq!(cursor.advance().map(|s| s.start_offset), Some(0));
        assert_eq!(cursor.advance().map(|s| s.start_offset), Some(500));
        assert!(cursor.is_exhausted());
        assert!(cursor.advance().is_none());
        assert_eq!(cursor.next_index(), 2);
    }
}
