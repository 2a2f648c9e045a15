//! Text preparation for synthesis — whitespace cleanup and chunking.
//!
//! Pure functions, no I/O.

use regex::Regex;
use std::sync::LazyLock;

static RE_CONTROL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\p{Cc}").unwrap());
static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Default maximum chunk length (bytes) handed to the engine in one call.
pub const DEFAULT_MAX_CHUNK_LEN: usize = 200;

/// Normalize text before it reaches the engine.
///
/// Control characters become spaces, whitespace runs (including newlines)
/// collapse to a single space, and the result is trimmed.
pub fn prepare_text(text: &str) -> String {
    let c = RE_CONTROL.replace_all(text, " ");
    let c = RE_WHITESPACE.replace_all(&c, " ");
    c.trim().to_string()
}

/// Split prepared text into engine-sized chunks of at most `max_len` bytes.
///
/// Whole sentences are packed together while they fit; a sentence that is
/// longer than `max_len` on its own goes through [`split_text`].
pub fn chunk_text(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        if sentence.len() > max_len {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.extend(split_text(&sentence, max_len));
            continue;
        }

        if current.is_empty() {
            current = sentence;
        } else if current.len() + 1 + sentence.len() <= max_len {
            current.push(' ');
            current.push_str(&sentence);
        } else {
            chunks.push(std::mem::replace(&mut current, sentence));
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Split text into chunks of roughly `max_len` bytes.
///
/// Prefers sentence boundaries (`. `), then word boundaries, then hard-splits
/// on the nearest char boundary. Nothing but whitespace at the split points
/// is dropped.
pub fn split_text(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut result = Vec::new();
    let mut remaining = text;

    while remaining.len() > max_len {
        let limit = floor_char_boundary(remaining, max_len);
        let window = &remaining[..limit];

        let split_at = match window.rfind(". ") {
            Some(pos) if pos >= limit / 2 => pos + 1,
            _ => word_boundary_or_hard(window, limit),
        };

        let chunk = remaining[..split_at].trim_end();
        if !chunk.is_empty() {
            result.push(chunk.to_string());
        }
        remaining = remaining[split_at..].trim_start();
    }

    if !remaining.is_empty() {
        result.push(remaining.to_string());
    }

    result
}

/// Split text into sentences at `.`, `!` or `?` followed by whitespace.
///
/// Returns non-empty, trimmed strings.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let is_end = matches!(bytes[i], b'.' | b'!' | b'?')
            && i + 1 < bytes.len()
            && bytes[i + 1].is_ascii_whitespace();

        if is_end {
            push_trimmed(&mut sentences, &text[start..=i]);
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            start = i;
            continue;
        }
        i += 1;
    }

    if start < bytes.len() {
        push_trimmed(&mut sentences, &text[start..]);
    }
    sentences
}

fn push_trimmed(out: &mut Vec<String>, s: &str) {
    let s = s.trim();
    if !s.is_empty() {
        out.push(s.to_string());
    }
}

/// Find a word boundary, or fall back to a hard split.
fn word_boundary_or_hard(window: &str, limit: usize) -> usize {
    match window.rfind(' ') {
        Some(pos) if pos >= limit / 3 && pos > 0 => pos,
        _ => limit,
    }
}

/// Largest index `<= idx` that lies on a char boundary, never zero for
/// non-empty input so splitting always makes progress.
fn floor_char_boundary(s: &str, idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    let mut i = idx;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    if i == 0 {
        // max_len smaller than the first char: take that char whole.
        s.chars().next().map_or(0, char::len_utf8)
    } else {
        i
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── prepare_text ────────────────────────────────────────────────

    #[test]
    fn collapses_whitespace() {
        assert_eq!(prepare_text("hello    world"), "hello world");
        assert_eq!(prepare_text("line one\n\nline two"), "line one line two");
    }

    #[test]
    fn strips_control_characters() {
        assert_eq!(prepare_text("bell\u{7}here\u{0}"), "bell here");
    }

    #[test]
    fn trims_edges() {
        assert_eq!(prepare_text("  \t Hello World \n"), "Hello World");
    }

    #[test]
    fn whitespace_only_becomes_empty() {
        assert_eq!(prepare_text(" \n\t "), "");
    }

    // ── chunk_text ──────────────────────────────────────────────────

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("Hello World", 200), vec!["Hello World"]);
    }

    #[test]
    fn packs_sentences_up_to_limit() {
        let chunks = chunk_text("One. Two. Three. Four.", 10);
        assert_eq!(chunks, vec!["One. Two.", "Three.", "Four."]);
    }

    #[test]
    fn oversized_sentence_is_sub_split() {
        let long = "word ".repeat(30);
        let text = format!("Short. {}", long.trim());
        let chunks = chunk_text(&text, 40);
        assert_eq!(chunks[0], "Short.");
        assert!(chunks.len() > 2);
        for chunk in &chunks {
            assert!(chunk.len() <= 40, "chunk too long: {}", chunk.len());
        }
    }

    #[test]
    fn chunking_preserves_words() {
        let text = "The quick brown fox jumps over the lazy dog. Pack my box with five dozen liquor jugs. How vexingly quick daft zebras jump!";
        let rejoined = chunk_text(text, 50).join(" ");
        for word in text.split_whitespace() {
            assert!(rejoined.contains(word), "missing word: {word}");
        }
    }

    // ── split_text ──────────────────────────────────────────────────

    #[test]
    fn splits_at_sentence_boundary() {
        let text = "First sentence. Second sentence. Third sentence that is long enough to push past the limit.";
        let chunks = split_text(text, 40);
        assert!(chunks.len() >= 2);
        assert!(chunks[0].ends_with('.'));
    }

    #[test]
    fn hard_splits_long_word() {
        let text = "a".repeat(300);
        let chunks = split_text(&text, 100);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() == 100));
    }

    #[test]
    fn hard_split_respects_char_boundaries() {
        let text = "é".repeat(50); // 2 bytes each
        let chunks = split_text(&text, 7);
        assert!(chunks.iter().all(|c| c.len() <= 7));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn keeps_short_trailing_word() {
        let text = format!("{} I", "a".repeat(199));
        let chunks = chunk_text(&text, 200);
        assert_eq!(chunks.last().map(String::as_str), Some("I"));

        let chunks = split_text(&"a".repeat(201), 100);
        assert_eq!(chunks.iter().map(String::len).collect::<Vec<_>>(), vec![100, 100, 1]);
    }

    #[test]
    fn chunks_cover_every_character() {
        let inputs = [
            format!("{} I", "a".repeat(199)),
            format!("{}. {} x", "b".repeat(150), "c".repeat(260)),
            "word ".repeat(90) + "z",
            "é".repeat(101),
        ];
        for text in &inputs {
            for max_len in [7, 40, 100, 200] {
                let chunks = chunk_text(text, max_len);
                let expected: String = text.chars().filter(|c| !c.is_whitespace()).collect();
                let covered: String = chunks.concat().chars().filter(|c| !c.is_whitespace()).collect();
                assert_eq!(covered, expected, "max_len={max_len}");
            }
        }
    }

    // ── split_sentences ─────────────────────────────────────────────

    #[test]
    fn split_sentences_mixed_punctuation() {
        let s = split_sentences("Really? Yes! OK. Done");
        assert_eq!(s, vec!["Really?", "Yes!", "OK.", "Done"]);
    }

    #[test]
    fn split_sentences_keeps_decimals() {
        let s = split_sentences("Pi is 3.14 roughly. Fine");
        assert_eq!(s, vec!["Pi is 3.14 roughly.", "Fine"]);
    }

    #[test]
    fn split_sentences_empty() {
        assert!(split_sentences("").is_empty());
    }
}
