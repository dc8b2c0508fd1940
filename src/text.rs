//! Sentence segmentation and chunk packing for long utterances.
//!
//! The synthesizer works best on short inputs, so an utterance is first cut
//! into sentence-like pieces and then greedily packed into chunks whose
//! combined sentence length stays within a character budget.
//!
//! Segmentation is a punctuation heuristic, not a linguistic splitter: after
//! normalization `.` is the only hard boundary. `!` and `?` only get a
//! trailing space, so `"How are you? I am fine."` stays one sentence.

/// Default character budget for one chunk.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 200;

/// An ordered group of sentences sent to the synthesizer in one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    sentences: Vec<String>,
}

impl Chunk {
    /// The sentences of this chunk, in utterance order.
    pub fn sentences(&self) -> &[String] {
        &self.sentences
    }

    /// Synthesizer input: the sentences joined by single spaces.
    pub fn text(&self) -> String {
        self.sentences.join(" ")
    }

    /// Characters counted against the packing budget. Joining spaces are not
    /// part of the budget.
    pub fn budget_chars(&self) -> usize {
        self.sentences.iter().map(|s| char_len(s)).sum()
    }
}

/// Split an utterance into sentences.
///
/// `...` becomes `…`, full-width `。` becomes `.`, and a space is inserted
/// after every `!` and `?`. The result is split on `.`, each piece trimmed,
/// empty pieces dropped and a `.` appended to every remaining piece.
pub fn split_sentences(text: &str) -> Vec<String> {
    let normalized = text
        .replace("...", "…")
        .replace('。', ".")
        .replace('!', "! ")
        .replace('?', "? ");

    normalized
        .split('.')
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(|piece| format!("{piece}."))
        .collect()
}

/// Pack sentences into chunks of at most `max_chars` budget characters.
///
/// A sentence that would overflow a non-empty chunk closes it and opens the
/// next one. A sentence that exactly fills the remaining budget stays. A single
/// sentence longer than the budget is never split; it becomes its own chunk.
pub fn pack_chunks<S: AsRef<str>>(sentences: &[S], max_chars: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut length = 0usize;

    for sentence in sentences {
        let sentence = sentence.as_ref();
        let sentence_len = char_len(sentence);

        if length + sentence_len > max_chars && !current.is_empty() {
            chunks.push(Chunk {
                sentences: std::mem::take(&mut current),
            });
            length = 0;
        }

        current.push(sentence.to_string());
        length += sentence_len;
    }

    if !current.is_empty() {
        chunks.push(Chunk { sentences: current });
    }

    chunks
}

/// Segment then pack an utterance.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<Chunk> {
    pack_chunks(&split_sentences(text), max_chars)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
