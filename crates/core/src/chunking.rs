use crate::models::{Chunk, ChunkingOptions, StructuralUnit, UnitRef};
use std::borrow::Cow;

/// A chunk may close early once it holds more than this share of `max_tokens`.
const SOFT_FILL_RATIO: f64 = 0.7;
/// A following sentence longer than this is treated as the start of a new topic.
const LONG_SENTENCE_CHARS: usize = 100;
const LIST_MARKERS: [&str; 8] = ["•", "-", "1.", "2.", "3.", "a)", "b)", "c)"];

/// A sentence with its character span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sentence<'a> {
    pub text: &'a str,
    pub char_start: usize,
    pub char_end: usize,
}

impl Sentence<'_> {
    pub fn char_len(&self) -> usize {
        self.char_end - self.char_start
    }
}

#[derive(Debug, Clone, Copy)]
struct Word<'a> {
    text: &'a str,
    char_start: usize,
    char_end: usize,
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Splits after `.`, `!` or `?` when followed by whitespace. The whitespace
/// run between two sentences is dropped; abbreviations and decimals are not
/// special-cased.
pub fn split_sentences(text: &str) -> Vec<Sentence<'_>> {
    let mut sentences = Vec::new();
    // (byte offset, char offset) of the sentence being scanned
    let mut start = (0usize, 0usize);
    let mut chars = text.char_indices().enumerate().peekable();

    while let Some((char_index, (byte, ch))) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let followed_by_space = chars
            .peek()
            .is_some_and(|(_, (_, next))| next.is_whitespace());
        if !followed_by_space {
            continue;
        }

        push_trimmed(&mut sentences, &text[start.0..byte + ch.len_utf8()], start.1);

        let mut resume = (text.len(), char_index + 1);
        while let Some(&(next_index, (next_byte, next))) = chars.peek() {
            if !next.is_whitespace() {
                resume = (next_byte, next_index);
                break;
            }
            resume.1 = next_index + 1;
            chars.next();
        }
        start = resume;
    }

    if start.0 < text.len() {
        push_trimmed(&mut sentences, &text[start.0..], start.1);
    }

    sentences
}

fn push_trimmed<'a>(sentences: &mut Vec<Sentence<'a>>, raw: &'a str, char_start: usize) {
    let body = raw.trim();
    if body.is_empty() {
        return;
    }
    let leading = raw[..raw.len() - raw.trim_start().len()].chars().count();
    let char_start = char_start + leading;
    sentences.push(Sentence {
        text: body,
        char_start,
        char_end: char_start + body.chars().count(),
    });
}

fn words_of(sentence: Sentence<'_>) -> Vec<Word<'_>> {
    let mut words = Vec::new();
    let mut current: Option<(usize, usize)> = None;
    let mut char_pos = sentence.char_start;

    for (byte, ch) in sentence.text.char_indices() {
        if ch.is_whitespace() {
            if let Some((start_byte, start_char)) = current.take() {
                words.push(Word {
                    text: &sentence.text[start_byte..byte],
                    char_start: start_char,
                    char_end: char_pos,
                });
            }
        } else if current.is_none() {
            current = Some((byte, char_pos));
        }
        char_pos += 1;
    }

    if let Some((start_byte, start_char)) = current {
        words.push(Word {
            text: &sentence.text[start_byte..],
            char_start: start_char,
            char_end: char_pos,
        });
    }

    words
}

/// Sentences accumulated for the chunk under construction. `words` keeps the
/// source span of every buffered word, including the overlap seed.
#[derive(Default)]
struct ChunkBuffer<'a> {
    pieces: Vec<Cow<'a, str>>,
    words: Vec<Word<'a>>,
}

impl<'a> ChunkBuffer<'a> {
    fn push(&mut self, sentence: Sentence<'a>) {
        self.pieces.push(Cow::Borrowed(sentence.text));
        self.words.extend(words_of(sentence));
    }

    fn word_count(&self) -> usize {
        self.words.len()
    }

    fn emit(&self, units: &[StructuralUnit]) -> Option<Chunk> {
        let first = self.words.first()?;
        let last = self.words.last()?;
        Some(Chunk {
            text: self.pieces.join(" "),
            char_start: first.char_start,
            char_end: last.char_end,
            unit_refs: overlapping_refs(units, first.char_start, last.char_end),
        })
    }

    fn reseed(&mut self, overlap_tokens: usize) {
        if overlap_tokens > 0 && self.words.len() > overlap_tokens {
            let tail = self.words.split_off(self.words.len() - overlap_tokens);
            let seed = tail.iter().map(|word| word.text).collect::<Vec<_>>().join(" ");
            self.pieces = vec![Cow::Owned(seed)];
            self.words = tail;
        } else {
            self.pieces.clear();
            self.words.clear();
        }
    }
}

fn overlapping_refs(units: &[StructuralUnit], char_start: usize, char_end: usize) -> Vec<UnitRef> {
    let mut refs: Vec<UnitRef> = Vec::new();
    for unit in units.iter().filter(|unit| unit.overlaps(char_start, char_end)) {
        if !refs.contains(&unit.unit_ref) {
            refs.push(unit.unit_ref.clone());
        }
    }
    refs
}

fn starts_list_item(sentence: &str) -> bool {
    let trimmed = sentence.trim_start();
    LIST_MARKERS.iter().any(|marker| trimmed.starts_with(marker))
}

fn should_close(
    word_count: usize,
    sentence: &Sentence<'_>,
    next: Option<&Sentence<'_>>,
    options: &ChunkingOptions,
) -> bool {
    if word_count > options.max_tokens {
        return true;
    }
    let Some(next) = next else {
        return false;
    };
    if word_count as f64 <= options.max_tokens as f64 * SOFT_FILL_RATIO {
        return false;
    }

    starts_list_item(next.text)
        || sentence.text.ends_with(':')
        || next.char_len() > LONG_SENTENCE_CHARS
}

/// Groups sentences into overlapping chunks and tags each chunk with the
/// structural units it touches.
pub fn assemble_chunks(
    sentences: &[Sentence<'_>],
    units: &[StructuralUnit],
    options: &ChunkingOptions,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut buffer = ChunkBuffer::default();

    for (position, sentence) in sentences.iter().enumerate() {
        buffer.push(*sentence);

        if should_close(buffer.word_count(), sentence, sentences.get(position + 1), options) {
            chunks.extend(buffer.emit(units));
            buffer.reseed(options.overlap_tokens);
        }
    }

    chunks.extend(buffer.emit(units));

    chunks
}

pub fn chunk_text_with_units(
    text: &str,
    units: &[StructuralUnit],
    options: &ChunkingOptions,
) -> Vec<Chunk> {
    let sentences = split_sentences(text);
    assemble_chunks(&sentences, units, options)
}

/// Sentence packing with only the hard `max_tokens` limit: no overlap and no
/// positional metadata.
pub fn chunk_plain(text: &str, max_tokens: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut words = 0usize;

    for sentence in split_sentences(text) {
        current.push(sentence.text);
        words += sentence.text.split_whitespace().count();
        if words > max_tokens {
            chunks.push(current.join(" "));
            current.clear();
            words = 0;
        }
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_slice(text: &str, start: usize, end: usize) -> String {
        text.chars().skip(start).take(end - start).collect()
    }

    fn numbered_sentences(count: usize) -> String {
        (0..count)
            .map(|i| format!("s{i}w1 s{i}w2 s{i}w3 s{i}w4 s{i}w5."))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn options(max_tokens: usize, overlap_tokens: usize) -> ChunkingOptions {
        ChunkingOptions {
            max_tokens,
            overlap_tokens,
        }
    }

    fn page(number: u32, char_start: usize, char_end: usize) -> StructuralUnit {
        StructuralUnit {
            unit_ref: UnitRef::Page(number),
            char_start,
            char_end,
        }
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof   spacing";
        let normalized = normalize_whitespace(input);
        assert_eq!(normalized, "A lot of spacing");
    }

    #[test]
    fn sentences_carry_source_offsets() {
        let text = "Hello world.  Next one!\nLast one?";
        let sentences = split_sentences(text);

        let texts: Vec<_> = sentences.iter().map(|s| s.text).collect();
        assert_eq!(texts, vec!["Hello world.", "Next one!", "Last one?"]);
        for sentence in &sentences {
            assert_eq!(
                char_slice(text, sentence.char_start, sentence.char_end),
                sentence.text
            );
        }
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        let text = "Größe zählt. Ça va?";
        let sentences = split_sentences(text);

        assert_eq!(sentences.len(), 2);
        assert_eq!((sentences[0].char_start, sentences[0].char_end), (0, 12));
        assert_eq!((sentences[1].char_start, sentences[1].char_end), (13, 19));
    }

    #[test]
    fn punctuation_without_following_space_does_not_split() {
        let sentences = split_sentences("Version 1.5 shipped.Then v2.");
        assert_eq!(sentences.len(), 1);
    }

    #[test]
    fn empty_or_blank_text_yields_no_chunks() {
        assert!(chunk_text_with_units("", &[], &ChunkingOptions::default()).is_empty());
        assert!(chunk_text_with_units(" \n\t ", &[], &ChunkingOptions::default()).is_empty());
    }

    #[test]
    fn short_document_becomes_one_chunk_spanning_both_pages() {
        let text = "Policy A requires X. Policy B requires Y.";
        let units = vec![page(1, 0, 20), page(2, 20, 42)];

        let chunks = chunk_text_with_units(text, &units, &ChunkingOptions::default());

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].unit_refs, vec![UnitRef::Page(1), UnitRef::Page(2)]);
        assert_eq!((chunks[0].char_start, chunks[0].char_end), (0, 41));
    }

    #[test]
    fn missing_units_leave_refs_empty() {
        let chunks = chunk_text_with_units("One. Two.", &[], &ChunkingOptions::default());
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].unit_refs.is_empty());
    }

    #[test]
    fn hard_limit_closes_chunks_without_overlap() {
        let text = numbered_sentences(6);
        let chunks = chunk_text_with_units(&text, &[], &options(12, 0));

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.starts_with("s0w1"));
        assert!(chunks[0].text.ends_with("s2w5."));
        assert!(chunks[1].text.starts_with("s3w1"));
        assert_eq!(chunks[1].word_count(), 15);
    }

    #[test]
    fn overlap_seeds_next_chunk_with_trailing_words() {
        // every sentence is 25 chars followed by one space
        let text = numbered_sentences(6);
        let chunks = chunk_text_with_units(&text, &[], &options(12, 4));

        assert_eq!(chunks.len(), 3);
        assert!(chunks[1].text.starts_with("s2w2 s2w3 s2w4 s2w5. s3w1"));
        assert_eq!((chunks[1].char_start, chunks[1].char_end), (57, 129));
        assert!(chunks[2].text.starts_with("s4w2"));
        assert!(chunks[2].text.ends_with("s5w5."));
    }

    #[test]
    fn overlap_left_after_the_last_close_is_flushed() {
        let text = "a b c d e.";
        let units = vec![page(1, 0, 5), page(2, 5, 10)];
        let chunks = chunk_text_with_units(text, &units, &options(4, 2));

        let texts: Vec<_> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["a b c d e.", "d e."]);
        assert_eq!((chunks[0].char_start, chunks[0].char_end), (0, 10));
        assert_eq!(chunks[0].unit_refs, vec![UnitRef::Page(1), UnitRef::Page(2)]);
        assert_eq!((chunks[1].char_start, chunks[1].char_end), (6, 10));
        assert_eq!(char_slice(text, 6, 10), "d e.");
        assert_eq!(chunks[1].unit_refs, vec![UnitRef::Page(2)]);
    }

    #[test]
    fn tail_seed_follows_a_multi_chunk_document() {
        // the third sentence pushes the second chunk over the limit
        let text = numbered_sentences(3);
        let chunks = chunk_text_with_units(&text, &[], &options(4, 2));

        let texts: Vec<_> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "s0w1 s0w2 s0w3 s0w4 s0w5.",
                "s0w4 s0w5. s1w1 s1w2 s1w3 s1w4 s1w5.",
                "s1w4 s1w5. s2w1 s2w2 s2w3 s2w4 s2w5.",
                "s2w4 s2w5.",
            ]
        );
        assert_eq!((chunks[3].char_start, chunks[3].char_end), (67, 77));
    }

    #[test]
    fn short_closed_buffer_is_not_used_as_seed() {
        let text = numbered_sentences(2);
        let chunks = chunk_text_with_units(&text, &[], &options(4, 10));

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, "s1w1 s1w2 s1w3 s1w4 s1w5.");
    }

    #[test]
    fn list_marker_closes_a_mostly_full_chunk() {
        let text = "one two three four five six seven eight. - item one. - item two.";
        let chunks = chunk_text_with_units(text, &[], &options(10, 0));

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "one two three four five six seven eight.");
        assert_eq!(chunks[1].text, "- item one. - item two.");
    }

    #[test]
    fn long_following_sentence_closes_a_mostly_full_chunk() {
        let long = "word ".repeat(25).trim_end().to_string() + ".";
        let text = format!("one two three four five six seven eight. {long}");
        let chunks = chunk_text_with_units(&text, &[], &options(10, 0));

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].word_count(), 8);
    }

    #[test]
    fn soft_triggers_require_a_following_sentence() {
        let options = options(10, 0);
        let current = Sentence {
            text: "a b c d e f g h:",
            char_start: 0,
            char_end: 16,
        };
        let next = Sentence {
            text: "short.",
            char_start: 17,
            char_end: 23,
        };

        assert!(should_close(8, &current, Some(&next), &options));
        assert!(!should_close(8, &current, None, &options));
        assert!(!should_close(7, &current, Some(&next), &options));
        assert!(should_close(11, &current, None, &options));
    }

    #[test]
    fn chunks_reconstruct_the_text_once_overlap_is_removed() {
        let text = (0..40)
            .map(|i| {
                let words = 3 + i % 7;
                let body = (0..words).map(|w| format!("t{i}x{w}")).collect::<Vec<_>>();
                format!("{}.", body.join(" "))
            })
            .collect::<Vec<_>>()
            .join("\n");
        let overlap = 5;
        let chunks = chunk_text_with_units(&text, &[], &options(20, overlap));
        assert!(chunks.len() > 1);

        let mut rebuilt: Vec<&str> = chunks[0].text.split_whitespace().collect();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.text.split_whitespace().skip(overlap));
        }
        let original: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn non_final_chunks_are_at_least_mostly_full() {
        let text = numbered_sentences(30);
        let max_tokens = 20;
        let chunks = chunk_text_with_units(&text, &[], &options(max_tokens, 5));

        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.word_count() as f64 > max_tokens as f64 * 0.7);
        }
    }

    #[test]
    fn unit_refs_match_the_overlap_test_exactly() {
        let text = numbered_sentences(8);
        let units: Vec<_> = (0..8)
            .map(|i| page(i as u32 + 1, i * 26, i * 26 + 25))
            .collect();
        let chunks = chunk_text_with_units(&text, &units, &options(12, 3));

        for chunk in &chunks {
            assert!(chunk.char_start <= chunk.char_end);
            let expected: Vec<_> = units
                .iter()
                .filter(|unit| chunk.char_start < unit.char_end && chunk.char_end > unit.char_start)
                .map(|unit| unit.unit_ref.clone())
                .collect();
            assert_eq!(chunk.unit_refs, expected);
        }
    }

    #[test]
    fn plain_chunking_only_splits_on_the_hard_limit() {
        let text = numbered_sentences(5);
        let chunks = chunk_plain(&text, 12);

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].ends_with("s2w5."));
        assert_eq!(chunks[1], "s3w1 s3w2 s3w3 s3w4 s3w5. s4w1 s4w2 s4w3 s4w4 s4w5.");
    }
}
