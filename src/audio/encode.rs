use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::AudioFormat;

#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(
        "ffmpeg not found. Install: Linux: `sudo apt-get install ffmpeg`, \
         macOS: `brew install ffmpeg`, Windows: https://ffmpeg.org/download.html"
    )]
    FfmpegNotFound,
    #[error("ffmpeg failed to produce {format}: {message}")]
    Ffmpeg {
        format: AudioFormat,
        message: String,
    },
}

/// Turns a mono PCM waveform into encoded bytes.
pub trait AudioEncoder: Send + Sync {
    fn encode(
        &self,
        samples: &[f32],
        sample_rate: u32,
        format: AudioFormat,
    ) -> Result<Vec<u8>, EncodeError>;
}

/// Encode mono samples as a 16-bit PCM WAV file in memory.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, EncodeError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buf = Vec::with_capacity(44 + samples.len() * 2);
    let mut writer = hound::WavWriter::new(Cursor::new(&mut buf), spec)?;
    for &sample in samples {
        writer.write_sample(to_pcm16(sample))?;
    }
    writer.finalize()?;
    Ok(buf)
}

fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// WAV is written directly; every other format is produced by piping a WAV
/// through an `ffmpeg` child process.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: PathBuf,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegEncoder {
    /// Use `ffmpeg` from PATH.
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
        }
    }

    /// Use an explicit ffmpeg binary, e.g. one bundled with the application.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn transcode(&self, wav: Vec<u8>, format: AudioFormat) -> Result<Vec<u8>, EncodeError> {
        let mut child = Command::new(&self.binary)
            .args(["-hide_banner", "-loglevel", "error", "-f", "wav", "-i", "pipe:0"])
            .args(format.ffmpeg_output_args())
            .arg("pipe:1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EncodeError::FfmpegNotFound
                } else {
                    EncodeError::Io(e)
                }
            })?;

        // Feed stdin from another thread so a full stdout pipe cannot stall us.
        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || -> std::io::Result<()> {
                stdin.write_all(&wav)?;
                stdin.flush()
            })
        });

        let output = child.wait_with_output()?;
        let write_result = match writer {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                Err(std::io::Error::other("ffmpeg stdin writer panicked"))
            }),
            None => Err(std::io::Error::other("ffmpeg stdin unavailable")),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EncodeError::Ffmpeg {
                format,
                message: format!("exited with code {:?}: {}", output.status.code(), stderr.trim()),
            });
        }
        write_result?;

        if output.stdout.is_empty() {
            return Err(EncodeError::Ffmpeg {
                format,
                message: "no output produced".to_string(),
            });
        }

        log::debug!("ffmpeg produced {} bytes of {format}", output.stdout.len());
        Ok(output.stdout)
    }
}

impl AudioEncoder for FfmpegEncoder {
    fn encode(
        &self,
        samples: &[f32],
        sample_rate: u32,
        format: AudioFormat,
    ) -> Result<Vec<u8>, EncodeError> {
        let wav = encode_wav(samples, sample_rate)?;
        match format {
            AudioFormat::Wav => Ok(wav),
            _ => self.transcode(wav, format),
        }
    }
}
