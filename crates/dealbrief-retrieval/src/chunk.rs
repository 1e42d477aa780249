//! Paragraph-first splitting of documents into overlapping chunks.
//!
//! Text is split on blank lines; paragraphs are packed greedily up to
//! `chunk_size` characters and the trailing paragraphs of one chunk (at most
//! `overlap` characters) are carried into the next. A single paragraph longer
//! than `chunk_size` is cut into fixed windows advancing by
//! `chunk_size - overlap`.

use dealbrief_core::SourceDocument;

/// Split every non-empty document into chunks that inherit its metadata.
#[must_use]
pub fn chunk_documents(
    docs: &[SourceDocument],
    chunk_size: usize,
    overlap: usize,
) -> Vec<SourceDocument> {
    docs.iter()
        .filter(|doc| !doc.content.trim().is_empty())
        .flat_map(|doc| {
            split_text(&doc.content, chunk_size, overlap)
                .into_iter()
                .map(|text| SourceDocument {
                    content: text,
                    meta: doc.meta.clone(),
                })
        })
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn windows(paragraph: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = paragraph.chars().collect();
    let step = size.saturating_sub(overlap).max(1);
    let mut out = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        out.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    out
}

pub(crate) fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let size = chunk_size.max(1);
    let pieces: Vec<String> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .flat_map(|p| {
            if char_len(p) > size {
                windows(p, size, overlap)
            } else {
                vec![p.to_string()]
            }
        })
        .collect();

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;

    for piece in &pieces {
        let piece_len = char_len(piece);
        let sep = if current.is_empty() { 0 } else { 2 };
        if !current.is_empty() && current_len + sep + piece_len > size {
            chunks.push(current.join("\n\n"));
            // Carry trailing paragraphs that fit in the overlap.
            while !current.is_empty()
                && (current_len > overlap || current_len + 2 + piece_len > size)
            {
                let dropped = current.remove(0);
                current_len = current_len.saturating_sub(char_len(dropped) + 2);
                if current.is_empty() {
                    current_len = 0;
                }
            }
        }
        current_len += if current.is_empty() { 0 } else { 2 } + piece_len;
        current.push(piece);
    }
    if !current.is_empty() {
        chunks.push(current.join("\n\n"));
    }
    chunks
}

#[cfg(test)]
mod tests {
    use dealbrief_core::DocumentKind;

    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_text("hello world", 100, 10), vec!["hello world"]);
    }

    #[test]
    fn paragraphs_are_packed_up_to_size() {
        let text = "aaaa\n\nbbbb\n\ncccc";
        let chunks = split_text(text, 10, 0);
        assert_eq!(chunks, vec!["aaaa\n\nbbbb", "cccc"]);
    }

    #[test]
    fn trailing_paragraph_is_carried_as_overlap() {
        let text = "aaaa\n\nbbbb\n\ncccc";
        let chunks = split_text(text, 10, 4);
        assert_eq!(chunks, vec!["aaaa\n\nbbbb", "bbbb\n\ncccc"]);
    }

    #[test]
    fn long_paragraph_is_windowed() {
        let text = "abcdefghij";
        let chunks = split_text(text, 4, 1);
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn no_chunk_exceeds_size() {
        let text = "one two three four five six seven eight nine ten\n\n".repeat(20);
        for chunk in split_text(&text, 64, 16) {
            assert!(chunk.chars().count() <= 64, "chunk too long: {chunk:?}");
        }
    }

    #[test]
    fn chunks_inherit_metadata_and_skip_empty_docs() {
        let docs = vec![
            SourceDocument::new("alpha\n\nbeta", "https://a.example", "A", DocumentKind::Webpage),
            SourceDocument::new("   ", "https://b.example", "B", DocumentKind::News),
        ];
        let chunks = chunk_documents(&docs, 5, 0);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.url() == "https://a.example"));
    }
}
