//! Recursive, overlap-aware text chunker.
//!
//! Splits document text into chunks of at most `chunk_size` characters.
//! Splitting prefers natural boundaries in this order: paragraph break,
//! line break, sentence end, space, and finally single characters. Small
//! pieces are merged greedily into windows; when a window is flushed, its
//! tail (up to `chunk_overlap` characters) is carried into the next one so
//! adjacent chunks share context.
//!
//! All lengths are counted in `char`s, never bytes, so multi-byte text is
//! never cut inside a code point.

use std::collections::VecDeque;

use crate::config::ChunkingConfig;

/// Boundaries tried in order. The empty separator means "split into chars".
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", " ", ""];

/// Split `text` into ordered, non-empty, whitespace-trimmed chunks.
///
/// Empty or whitespace-only input yields no chunks. Input that already fits
/// in `chunk_size` yields exactly one chunk, the trimmed input.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if char_len(trimmed) <= config.chunk_size() {
        return vec![trimmed.to_string()];
    }

    let splitter = Splitter {
        size: config.chunk_size(),
        overlap: config.chunk_overlap(),
    };
    splitter.split(text, SEPARATORS)
}

struct Splitter {
    size: usize,
    overlap: usize,
}

impl Splitter {
    fn split(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, finer) = pick_separator(text, separators);

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in split_keep_start(text, separator) {
            if char_len(piece) < self.size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }

            if finer.is_empty() {
                push_trimmed(&mut chunks, piece);
            } else {
                chunks.extend(self.split(piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }

        chunks
    }

    /// Greedily pack pieces into windows of at most `size` chars, keeping up
    /// to `overlap` chars of each flushed window at the start of the next.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > self.size && !window.is_empty() {
                push_trimmed(&mut chunks, &join(&window));

                while total > self.overlap || (total + len > self.size && total > 0) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }

            window.push_back((piece, len));
            total += len;
        }

        push_trimmed(&mut chunks, &join(&window));
        chunks
    }
}

/// First separator present in `text`, plus the finer separators after it.
fn pick_separator<'a>(text: &str, separators: &'a [&'a str]) -> (&'a str, &'a [&'a str]) {
    for (i, &sep) in separators.iter().enumerate() {
        if sep.is_empty() {
            return (sep, &[]);
        }
        if text.contains(sep) {
            return (sep, &separators[i + 1..]);
        }
    }
    ("", &[])
}

/// Split on `separator`, keeping each separator at the start of the piece
/// that follows it. Empty pieces are dropped.
fn split_keep_start<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn join(window: &VecDeque<(&str, usize)>) -> String {
    window.iter().map(|(piece, _)| *piece).collect()
}

fn push_trimmed(chunks: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig::new(size, overlap).unwrap()
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        assert!(chunk_text("", &cfg(100, 10)).is_empty());
        assert!(chunk_text("  \n\n\t ", &cfg(100, 10)).is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Small text", &cfg(1000, 200));
        assert_eq!(chunks, vec!["Small text".to_string()]);

        let chunks = chunk_text("  padded  \n", &cfg(1000, 200));
        assert_eq!(chunks, vec!["padded".to_string()]);
    }

    #[test]
    fn test_sentence_split_preserves_content() {
        let text = "This is a test document with multiple sentences.";
        let chunks = chunk_text(text, &cfg(10, 2));
        assert!(chunks.len() > 1);
        let total: usize = chunks.iter().map(|c| c.chars().count()).sum();
        assert!(total >= text.len() - 2);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }

    #[test]
    fn test_no_chunk_exceeds_size() {
        let text = (0..60)
            .map(|i| {
                format!(
                    "Paragraph {} talks about topic {}. It has two sentences!\nAnd a second line?",
                    i,
                    i * 7
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        for (size, overlap) in [(20, 0), (50, 10), (64, 63), (200, 40), (1, 0)] {
            let chunks = chunk_text(&text, &cfg(size, overlap));
            assert!(!chunks.is_empty());
            for c in &chunks {
                assert!(
                    c.chars().count() <= size,
                    "chunk of {} chars exceeds {}: {:?}",
                    c.chars().count(),
                    size,
                    c
                );
                assert!(!c.trim().is_empty());
            }
        }
    }

    #[test]
    fn test_paragraphs_preferred_over_spaces() {
        let text = "Alpha beta gamma.\n\nDelta epsilon zeta.\n\nEta theta iota.";
        let chunks = chunk_text(text, &cfg(20, 0));
        assert_eq!(
            chunks,
            vec![
                "Alpha beta gamma.".to_string(),
                "Delta epsilon zeta.".to_string(),
                "Eta theta iota.".to_string(),
            ]
        );
    }

    #[test]
    fn test_hard_cut_without_boundaries() {
        let text = "a".repeat(25);
        let chunks = chunk_text(&text, &cfg(10, 0));
        let lens: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(lens, vec![10, 10, 5]);
    }

    #[test]
    fn test_overlap_carries_tail() {
        let text = "abcdefghijklmnopqrstuvwxy";
        let chunks = chunk_text(text, &cfg(10, 3));
        assert_eq!(chunks[0], "abcdefghij");
        assert_eq!(chunks[1], "hijklmnopq");
        for pair in chunks.windows(2) {
            let tail: String = pair[0]
                .chars()
                .rev()
                .take(3)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            assert!(pair[1].starts_with(&tail));
        }
        assert!(chunks.last().unwrap().ends_with('y'));
    }

    #[test]
    fn test_word_overlap() {
        let text = "one two three four five six seven eight nine ten";
        let chunks = chunk_text(text, &cfg(15, 6));
        assert!(chunks.len() > 1);
        // Each chunk after the first starts with a word the previous one ended with.
        for pair in chunks.windows(2) {
            let first_word = pair[1].split(' ').next().unwrap();
            assert!(pair[0].ends_with(first_word), "{:?}", pair);
        }
    }

    #[test]
    fn test_multibyte_text_counts_chars() {
        let text = "é".repeat(25);
        let chunks = chunk_text(&text, &cfg(10, 2));
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks[0].chars().count(), 10);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta gamma delta.\n\nGamma epsilon. Zeta eta theta.\n\nDelta";
        let c1 = chunk_text(text, &cfg(12, 4));
        let c2 = chunk_text(text, &cfg(12, 4));
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_split_keep_start() {
        assert_eq!(
            split_keep_start("a\n\nb\n\nc", "\n\n"),
            vec!["a", "\n\nb", "\n\nc"]
        );
        assert_eq!(split_keep_start("\n\nb", "\n\n"), vec!["\n\nb"]);
        assert_eq!(split_keep_start("ab", ""), vec!["a", "b"]);
    }
}
