//! Voice style vectors from Kokoro's `voices-v1.0.bin` (a NumPy `.npz` archive).
//!
//! Each archive entry `<voice>.npy` is a float32 array of shape `[N, 1, 256]`
//! or `[N, 256]`; row `i` is the style to use for an input of `i` tokens.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use super::model::{KokoroError, STYLE_DIM};

pub type Style = [f32; STYLE_DIM];

const NPY_MAGIC: &[u8] = b"\x93NUMPY";

pub struct StyleStore {
    voices: HashMap<String, Vec<Style>>,
}

impl StyleStore {
    pub fn load(path: &Path) -> Result<Self, KokoroError> {
        Self::from_reader(File::open(path)?)
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self, KokoroError> {
        let mut archive = zip::ZipArchive::new(reader)
            .map_err(|e| KokoroError::VoiceParse(format!("not a zip archive: {e}")))?;

        let mut voices = HashMap::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| KokoroError::VoiceParse(format!("entry {i}: {e}")))?;
            if entry.is_dir() {
                continue;
            }

            let entry_name = entry.name().to_string();
            let Some(voice) = entry_name.strip_suffix(".npy").filter(|v| !v.is_empty()) else {
                log::debug!("Skipping non-voice entry {entry_name}");
                continue;
            };
            let voice = voice.to_string();

            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            voices.insert(voice, parse_npy(&data, &entry_name)?);
        }

        log::info!("Loaded {} voices", voices.len());
        Ok(Self { voices })
    }

    /// Style for `voice` at `index`, clamped to the last row.
    pub fn style(&self, voice: &str, index: usize) -> Result<&Style, KokoroError> {
        let styles = self
            .voices
            .get(voice)
            .filter(|rows| !rows.is_empty())
            .ok_or_else(|| KokoroError::VoiceNotFound(voice.to_string()))?;
        Ok(&styles[index.min(styles.len() - 1)])
    }

    pub fn contains(&self, voice: &str) -> bool {
        self.voices.contains_key(voice)
    }

    /// Voice names, sorted.
    pub fn list_voices(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.voices.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Decode a little-endian float32 `.npy` payload into style rows.
fn parse_npy(data: &[u8], name: &str) -> Result<Vec<Style>, KokoroError> {
    let invalid = |message: String| KokoroError::VoiceParse(format!("{name}: {message}"));

    if data.len() < 10 || !data.starts_with(NPY_MAGIC) {
        return Err(invalid("missing NumPy header".to_string()));
    }

    // v1 stores a u16 header length at offset 8, v2/v3 a u32.
    let (header_len, prefix) = match data[6] {
        1 => (u16::from_le_bytes([data[8], data[9]]) as usize, 10),
        2 | 3 if data.len() >= 12 => (
            u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize,
            12,
        ),
        version => return Err(invalid(format!("unsupported npy version {version}"))),
    };

    let payload = data
        .get(prefix + header_len..)
        .ok_or_else(|| invalid(format!("header of {header_len} bytes is truncated")))?;
    let header = String::from_utf8_lossy(&data[prefix..prefix + header_len]);
    if !header.contains("<f4") {
        return Err(invalid(format!("expected little-endian float32, header is {}", header.trim())));
    }

    let row_bytes = STYLE_DIM * 4;
    if payload.len() % row_bytes != 0 {
        return Err(invalid(format!(
            "{} data bytes is not a whole number of {STYLE_DIM}-float rows",
            payload.len()
        )));
    }

    Ok(payload
        .chunks_exact(row_bytes)
        .map(|row| {
            let mut style = [0f32; STYLE_DIM];
            for (value, bytes) in style.iter_mut().zip(row.chunks_exact(4)) {
                *value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
            style
        })
        .collect())
}
