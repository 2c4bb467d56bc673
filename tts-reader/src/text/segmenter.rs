//! Sentence segmentation
//!
//! Splits text into bounded-length chunks at sentence boundaries so the first
//! chunk can be synthesized and played while the rest are still pending.

/// One unit of synthesis and playback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Position in synthesis/playback order (0-based, gap-free)
    pub index: usize,
    /// Chunk text, never empty
    pub text: String,
    /// Length in characters (Unicode scalar values)
    pub char_length: usize,
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Split text into trimmed, non-empty sentences.
///
/// A sentence ends at a run of `.`, `!` or `?` followed by whitespace or the
/// end of the text. Punctuation inside a token (`1.5`, `e.g`) does not end a
/// sentence. Trailing text without terminal punctuation forms the last one.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !is_terminal(c) {
            continue;
        }

        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if !is_terminal(next) {
                break;
            }
            end = j + next.len_utf8();
            chars.next();
        }

        let at_boundary = match chars.peek() {
            None => true,
            Some(&(_, next)) => next.is_whitespace(),
        };
        if at_boundary {
            sentences.push(&text[start..end]);
            start = end;
        }
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn close_chunk(chunks: &mut Vec<TextChunk>, text: String, char_length: usize) {
    chunks.push(TextChunk {
        index: chunks.len(),
        text,
        char_length,
    });
}

/// Split text into chunks of at most `max_chars` characters.
///
/// Sentences are packed greedily, joined by a single space. A sentence is
/// never split: one longer than `max_chars` becomes its own oversized chunk.
/// Empty or whitespace-only input yields no chunks.
pub fn segment(text: &str, max_chars: usize) -> Vec<TextChunk> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let mut chunks: Vec<TextChunk> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in split_sentences(text) {
        let len = sentence.chars().count();

        if current_len > 0 && current_len + 1 + len > max_chars {
            close_chunk(&mut chunks, std::mem::take(&mut current), current_len);
            current.push_str(sentence);
            current_len = len;
        } else if current_len == 0 {
            current.push_str(sentence);
            current_len = len;
        } else {
            current.push(' ');
            current.push_str(sentence);
            current_len += 1 + len;
        }
    }

    if current_len > 0 {
        close_chunk(&mut chunks, current, current_len);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(chunks: &[TextChunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn test_each_sentence_own_chunk_when_budget_small() {
        let chunks = segment("One. Two. Three.", 6);
        assert_eq!(texts(&chunks), vec!["One.", "Two.", "Three."]);
        assert_eq!(
            chunks.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_oversized_sentence_is_never_split() {
        let sentence = "A sentence that is fifty characters long total.";
        let chunks = segment(sentence, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, sentence);
        assert_eq!(chunks[0].char_length, sentence.chars().count());
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        assert!(segment("", 100).is_empty());
        assert!(segment("   \n\t  ", 100).is_empty());
    }

    #[test]
    fn test_greedy_packing() {
        let chunks = segment("Hi there. How are you? Fine!", 22);
        assert_eq!(texts(&chunks), vec!["Hi there. How are you?", "Fine!"]);
    }

    #[test]
    fn test_trailing_text_without_punctuation() {
        let chunks = segment("First sentence. and then some trailing words", 500);
        assert_eq!(
            texts(&chunks),
            vec!["First sentence. and then some trailing words"]
        );
        assert_eq!(
            split_sentences("First sentence. and then some trailing words"),
            vec!["First sentence.", "and then some trailing words"]
        );
    }

    #[test]
    fn test_inner_punctuation_does_not_split_or_drop_text() {
        let sentences = split_sentences("Version 1.5 is out. See e.g.the notes!");
        assert_eq!(sentences, vec!["Version 1.5 is out.", "See e.g.the notes!"]);
    }

    #[test]
    fn test_punctuation_runs_stay_with_sentence() {
        let sentences = split_sentences("Really?! Yes... ok");
        assert_eq!(sentences, vec!["Really?!", "Yes...", "ok"]);
    }

    #[test]
    fn test_newlines_are_boundaries() {
        let sentences = split_sentences("Line one.\nLine two.\n\nLine three.");
        assert_eq!(sentences, vec!["Line one.", "Line two.", "Line three."]);
    }

    #[test]
    fn test_char_length_counts_characters_not_bytes() {
        let chunks = segment("Über straße. Ça va?", 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].char_length, chunks[0].text.chars().count());
        assert_eq!(chunks[0].char_length, 19);
    }

    #[test]
    fn test_bound_and_order_hold_across_budgets() {
        let text = "The quick brown fox jumps. It lands softly! Does it run? \
                    Nobody knows. A much longer sentence follows here to exercise the oversized path. \
                    Short. End";
        let sentences = split_sentences(text);

        for max_chars in 1..120 {
            let chunks = segment(text, max_chars);

            for (i, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk.index, i, "indices must be gap-free");
                assert!(!chunk.text.is_empty());
                let single_sentence = sentences.contains(&chunk.text.as_str());
                assert!(
                    chunk.char_length <= max_chars || single_sentence,
                    "chunk {:?} exceeds {} and is not a single sentence",
                    chunk.text,
                    max_chars
                );
            }

            let rebuilt = chunks
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            assert_eq!(rebuilt, sentences.join(" "));
        }
    }
}
