use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Container/codec combinations the encoder can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Wav,
    Ogg,
    Aac,
    Opus,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 5] = [
        AudioFormat::Mp3,
        AudioFormat::Wav,
        AudioFormat::Ogg,
        AudioFormat::Aac,
        AudioFormat::Opus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Aac => "aac",
            AudioFormat::Opus => "opus",
        }
    }

    /// File extension, without the dot.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    /// MIME type sent with the encoded bytes.
    pub fn content_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Ogg => "audio/ogg",
            AudioFormat::Aac => "audio/aac",
            AudioFormat::Opus => "audio/opus",
        }
    }

    /// ffmpeg output options: muxer, codec and bitrate.
    pub(crate) fn ffmpeg_output_args(&self) -> &'static [&'static str] {
        match self {
            AudioFormat::Mp3 => &["-f", "mp3", "-c:a", "libmp3lame", "-b:a", "192k"],
            AudioFormat::Wav => &["-f", "wav", "-c:a", "pcm_s16le"],
            AudioFormat::Ogg => &["-f", "ogg", "-c:a", "libvorbis", "-b:a", "192k"],
            // ADTS framing keeps AAC streamable to a pipe; MP4 muxing needs a seekable output.
            AudioFormat::Aac => &["-f", "adts", "-c:a", "aac", "-b:a", "192k"],
            AudioFormat::Opus => &["-f", "opus", "-c:a", "libopus", "-b:a", "160k"],
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        AudioFormat::ALL
            .into_iter()
            .find(|format| format.as_str() == wanted)
            .ok_or_else(|| ValidationError::UnsupportedFormat(s.to_string()))
    }
}
