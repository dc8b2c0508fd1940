//! espeak-ng phonemization for Kokoro.
//!
//! Text is split into word runs and boundary punctuation. Word runs go through
//! `espeak-ng --ipa` in one batch; punctuation is kept as-is, since Kokoro's
//! vocabulary has tokens for it.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::model::KokoroError;
use crate::voices::Language;

/// Where to find espeak-ng. `None` fields fall back to the system install.
#[derive(Debug, Clone, Default)]
pub struct EspeakConfig {
    /// espeak-ng executable; defaults to `espeak-ng` on PATH.
    pub bin_path: Option<PathBuf>,
    /// Directory containing `espeak-ng-data`.
    pub data_path: Option<PathBuf>,
}

impl EspeakConfig {
    fn command(&self) -> Command {
        let mut cmd = match &self.bin_path {
            Some(bin) => Command::new(bin),
            None => Command::new("espeak-ng"),
        };
        if let Some(data) = &self.data_path {
            cmd.arg(format!("--path={}", data.display()));
        }
        cmd
    }
}

/// IPA transcription and the Kokoro token ids derived from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Phonemes {
    pub ipa: String,
    pub ids: Vec<i64>,
}

/// espeak-ng voice for a Kokoro voice name, by its language prefix.
pub fn voice_lang(voice: &str) -> &'static str {
    Language::from_voice(voice)
        .map(|lang| lang.espeak_code())
        .unwrap_or("en-us")
}

/// Phonemize `text` in espeak-ng language `lang`.
///
/// IPA characters missing from `vocab` are dropped from `ids` but kept in `ipa`.
pub fn phonemize(
    text: &str,
    lang: &str,
    vocab: &HashMap<char, i64>,
    espeak: &EspeakConfig,
) -> Result<Phonemes, KokoroError> {
    let parts = split_text_parts(text);
    let words: Vec<&str> = parts
        .iter()
        .filter_map(|part| match part {
            TextPart::Text(segment) => Some(segment.as_str()),
            TextPart::Punct(_) => None,
        })
        .collect();

    let transcribed = if words.is_empty() {
        Vec::new()
    } else {
        transcribe_batch(&words, lang, espeak)?
    };

    let mut ipa = String::new();
    let mut next_word = transcribed.iter();
    for part in &parts {
        match part {
            TextPart::Text(_) => {
                if let Some(word_ipa) = next_word.next() {
                    if !ipa.is_empty() && !ipa.ends_with(opens_group) {
                        ipa.push(' ');
                    }
                    ipa.push_str(word_ipa);
                }
            }
            TextPart::Punct(ch) => ipa.push(*ch),
        }
    }

    let ids = ipa
        .chars()
        .filter_map(|ch| vocab.get(&ch).copied())
        .collect();
    Ok(Phonemes { ipa, ids })
}

fn opens_group(ch: char) -> bool {
    matches!(ch, ' ' | '(' | '"' | '\u{201c}')
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TextPart {
    Text(String),
    Punct(char),
}

fn split_text_parts(text: &str) -> Vec<TextPart> {
    let mut parts = Vec::new();
    let mut current = String::new();

    for (idx, ch) in text.char_indices() {
        if let Some(punct) = boundary_punctuation(ch) {
            if !is_digit_separator(text, idx, ch) {
                flush_word_run(&mut parts, &mut current);
                parts.push(TextPart::Punct(punct));
                continue;
            }
        }

        if ch.is_whitespace() {
            if !current.is_empty() && !current.ends_with(' ') {
                current.push(' ');
            }
        } else {
            current.push(ch);
        }
    }

    flush_word_run(&mut parts, &mut current);
    parts
}

fn flush_word_run(parts: &mut Vec<TextPart>, current: &mut String) {
    let run = current.trim();
    if !run.is_empty() {
        parts.push(TextPart::Text(run.to_string()));
    }
    current.clear();
}

fn boundary_punctuation(ch: char) -> Option<char> {
    match ch {
        '.' | '!' | '?' | ',' | ';' | ':' | '—' | '…' | '"' | '(' | ')' | '\u{201c}'
        | '\u{201d}' => Some(ch),
        '\n' | '\r' => Some('.'),
        _ => None,
    }
}

/// `.` or `,` between two digits, as in `2.0` or `1,000`.
fn is_digit_separator(text: &str, idx: usize, ch: char) -> bool {
    if !matches!(ch, '.' | ',') {
        return false;
    }
    let prev = text[..idx].chars().next_back();
    let next = text[idx + ch.len_utf8()..].chars().next();
    matches!(
        (prev, next),
        (Some(left), Some(right)) if left.is_ascii_digit() && right.is_ascii_digit()
    )
}

/// One IPA line per word run. Falls back to one espeak call per run when the
/// batched output does not line up with the input.
fn transcribe_batch(
    words: &[&str],
    lang: &str,
    espeak: &EspeakConfig,
) -> Result<Vec<String>, KokoroError> {
    let output = run_espeak(&words.join("\n"), lang, espeak)?;
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() == words.len() {
        return Ok(lines.into_iter().map(clean_ipa).collect());
    }

    log::debug!(
        "espeak-ng returned {} lines for {} runs; transcribing one at a time",
        lines.len(),
        words.len()
    );
    words
        .iter()
        .map(|word| {
            let output = run_espeak(word, lang, espeak)?;
            Ok(clean_ipa(&output))
        })
        .collect()
}

/// Trim a transcription and drop espeak's `_` pause markers.
fn clean_ipa(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .replace('_', "")
}

fn run_espeak(input: &str, lang: &str, espeak: &EspeakConfig) -> Result<String, KokoroError> {
    let mut child = espeak
        .command()
        .args(["--ipa", "--stdin", "-q", "-v", lang])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                KokoroError::EspeakNotFound
            } else {
                KokoroError::Io(e)
            }
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        // espeak-ng under-processes a final line without a terminator.
        stdin.write_all(newline_terminated(input).as_bytes())?;
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(KokoroError::PhonemizerFailed(format!(
            "espeak-ng exited with code {:?}: {}",
            output.status.code(),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn newline_terminated(input: &str) -> Cow<'_, str> {
    if input.ends_with('\n') {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(format!("{input}\n"))
    }
}
