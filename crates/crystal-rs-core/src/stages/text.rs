//! Text helpers shared by the built-in stages.

use std::collections::HashSet;

const CODE_FENCE: &str = "```";
const MIN_CONTENT_WORD_LEN: usize = 3;

/// Rough token estimate: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// Piece of message text: prose or a fenced code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    Prose(&'a str),
    Code(&'a str),
}

/// Split text into prose runs and fenced code blocks (fences included).
///
/// An unterminated fence is treated as prose.
pub(crate) fn split_segments(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(CODE_FENCE) {
        let after_open = &rest[start + CODE_FENCE.len()..];
        let Some(close) = after_open.find(CODE_FENCE) else {
            break;
        };
        if start > 0 {
            segments.push(Segment::Prose(&rest[..start]));
        }
        let end = start + CODE_FENCE.len() + close + CODE_FENCE.len();
        segments.push(Segment::Code(&rest[start..end]));
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Prose(rest));
    }
    segments
}

/// Split prose into trimmed sentences.
///
/// Sentences end at `.`, `!` or `?` followed by whitespace (or the end of the
/// text) and at line breaks, so decimals like `1.5` stay intact.
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        let boundary = match ch {
            '\n' => Some(idx),
            '.' | '!' | '?' => chars
                .peek()
                .is_none_or(|(_, next)| next.is_whitespace())
                .then_some(idx + ch.len_utf8()),
            _ => None,
        };
        if let Some(end) = boundary {
            push_trimmed(&mut sentences, &text[start..end]);
            start = end;
        }
    }
    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn push_trimmed<'a>(out: &mut Vec<&'a str>, piece: &'a str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        out.push(piece);
    }
}

/// Lowercased alphanumeric words of at least three characters.
pub(crate) fn content_words(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| word.chars().count() >= MIN_CONTENT_WORD_LEN)
        .map(str::to_lowercase)
        .collect()
}

/// Distinct content words of every text.
pub(crate) fn vocabulary<'a>(texts: impl IntoIterator<Item = &'a str>) -> HashSet<String> {
    texts.into_iter().flat_map(content_words).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn segments_keep_fenced_blocks_whole() {
        let text = "Try this:\n```rust\nfn main() {}\n```\nThen run it. ```dangling";
        assert_eq!(
            split_segments(text),
            vec![
                Segment::Prose("Try this:\n"),
                Segment::Code("```rust\nfn main() {}\n```"),
                Segment::Prose("\nThen run it. ```dangling"),
            ]
        );
    }

    #[test]
    fn sentences_split_on_terminators_and_newlines() {
        assert_eq!(
            split_sentences("Version 1.5 shipped. Did it work?\nYes!  Great"),
            vec!["Version 1.5 shipped.", "Did it work?", "Yes!", "Great"]
        );
    }

    #[test]
    fn content_words_drop_short_tokens() {
        assert_eq!(
            content_words("It is a Tokio-based RUNTIME, v2"),
            vec!["tokio", "based", "runtime"]
        );
    }
}
