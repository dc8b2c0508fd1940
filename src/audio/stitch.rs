//! Joining per-chunk waveforms into one continuous waveform.

use serde::{Deserialize, Serialize};

/// Default crossfade length: 2000 samples, about 83 ms at 24 kHz.
pub const DEFAULT_CROSSFADE_SAMPLES: usize = 2000;

/// How adjacent segments are joined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum StitchMode {
    /// Join end to end, untouched.
    #[default]
    Concatenate,
    /// Blend the last `overlap` samples of each segment into the first
    /// `overlap` samples of the next with linear fades.
    Crossfade { overlap: usize },
}

impl StitchMode {
    /// Crossfade with the default overlap.
    pub fn crossfade() -> Self {
        StitchMode::Crossfade {
            overlap: DEFAULT_CROSSFADE_SAMPLES,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StitchError {
    #[error("segment {index} has {len} samples, fewer than the {overlap}-sample crossfade")]
    SegmentTooShort {
        index: usize,
        len: usize,
        overlap: usize,
    },
}

/// Stitch segments in order according to `mode`.
///
/// Crossfading folds left to right: `stitch(stitch(s1, s2), s3)`. With two or
/// more segments every segment must hold at least `overlap` samples.
pub fn stitch<S: AsRef<[f32]>>(segments: &[S], mode: StitchMode) -> Result<Vec<f32>, StitchError> {
    match mode {
        StitchMode::Concatenate => Ok(concatenate(segments)),
        StitchMode::Crossfade { overlap } => crossfade_all(segments, overlap),
    }
}

/// Join segments end to end.
pub fn concatenate<S: AsRef<[f32]>>(segments: &[S]) -> Vec<f32> {
    let total = segments.iter().map(|s| s.as_ref().len()).sum();
    let mut out = Vec::with_capacity(total);
    for segment in segments {
        out.extend_from_slice(segment.as_ref());
    }
    out
}

fn crossfade_all<S: AsRef<[f32]>>(segments: &[S], overlap: usize) -> Result<Vec<f32>, StitchError> {
    if segments.len() > 1 {
        for (index, segment) in segments.iter().enumerate() {
            let len = segment.as_ref().len();
            if len < overlap {
                return Err(StitchError::SegmentTooShort {
                    index,
                    len,
                    overlap,
                });
            }
        }
    }

    let mut iter = segments.iter();
    let Some(first) = iter.next() else {
        return Ok(Vec::new());
    };

    let total: usize = segments.iter().map(|s| s.as_ref().len()).sum();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(first.as_ref());
    for segment in iter {
        append_crossfade(&mut out, segment.as_ref(), overlap)?;
    }
    Ok(out)
}

/// Append `src` to `dst`, blending the last `overlap` samples of `dst` with the
/// first `overlap` samples of `src`.
///
/// `dst` loses `overlap` samples relative to plain concatenation.
pub fn append_crossfade(
    dst: &mut Vec<f32>,
    src: &[f32],
    overlap: usize,
) -> Result<(), StitchError> {
    if dst.len() < overlap {
        return Err(StitchError::SegmentTooShort {
            index: 0,
            len: dst.len(),
            overlap,
        });
    }
    if src.len() < overlap {
        return Err(StitchError::SegmentTooShort {
            index: 1,
            len: src.len(),
            overlap,
        });
    }

    let dst_start = dst.len() - overlap;
    let fades = linear_ramp(overlap, 1.0, 0.0).zip(linear_ramp(overlap, 0.0, 1.0));
    for (i, (fade_out, fade_in)) in fades.enumerate() {
        dst[dst_start + i] = dst[dst_start + i] * fade_out + src[i] * fade_in;
    }

    dst.extend_from_slice(&src[overlap..]);
    Ok(())
}

/// `len` evenly spaced values from `from` to `to`, both end points included.
pub fn linear_ramp(len: usize, from: f32, to: f32) -> impl Iterator<Item = f32> {
    let step = if len > 1 {
        (to - from) / (len - 1) as f32
    } else {
        0.0
    };
    (0..len).map(move |i| from + step * i as f32)
}
