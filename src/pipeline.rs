//! Text → chunks → segments → stitched waveform → encoded audio.
//!
//! Chunks of one utterance are synthesized strictly in order, one synthesis
//! call at a time. Two delivery modes exist per request: [`SpeechPipeline::render`]
//! stitches every segment and encodes once, [`SpeechPipeline::stream`] encodes
//! and hands over each segment as soon as it is ready.

use std::iter::{Enumerate, FusedIterator};
use std::sync::Arc;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::audio::{self, AudioEncoder, AudioFormat, StitchMode};
use crate::error::{Result, SpeechError, ValidationError};
use crate::text::{self, Chunk, DEFAULT_MAX_CHUNK_CHARS};
use crate::voices::{LanguageProfile, Synthesizer, VoiceRegistry};
use crate::SynthesisResult;

/// Tuning for chunking, stitching and delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default, setter(into))]
#[serde(default)]
pub struct PipelineConfig {
    /// Character budget per chunk.
    pub max_chunk_chars: usize,
    /// How segments are joined in buffered mode.
    pub stitch: StitchMode,
    /// Pause between streamed chunks, in milliseconds. 0 disables it.
    pub stream_pause_ms: u64,
    /// Format used when the requested one cannot be encoded.
    pub fallback_format: AudioFormat,
    /// Voice used when the caller does not pick one.
    pub default_voice: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            stitch: StitchMode::Concatenate,
            stream_pause_ms: 100,
            fallback_format: AudioFormat::Mp3,
            default_voice: "af_heart".to_string(),
        }
    }
}

/// Audio synthesized for one chunk.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Position of the chunk in the utterance.
    pub index: usize,
    /// Text that was spoken.
    pub text: String,
    pub phonemes: String,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Encoded audio ready for delivery.
#[derive(Debug, Clone)]
pub struct EncodedAudio {
    /// Format actually produced; differs from the request after a fallback.
    pub format: AudioFormat,
    pub bytes: Vec<u8>,
    pub phonemes: String,
    pub duration_secs: f64,
}

/// Lazily synthesizes the chunks of one utterance, in order.
///
/// Every call to `next` makes exactly one synthesis call. The stream ends after
/// the first failure. Dropping it stops all further synthesis.
pub struct SegmentStream {
    synthesizer: Arc<dyn Synthesizer>,
    voice: String,
    chunks: Enumerate<std::vec::IntoIter<Chunk>>,
    total: usize,
    failed: bool,
}

impl SegmentStream {
    /// Number of chunks in the utterance.
    pub fn total(&self) -> usize {
        self.total
    }
}

impl Iterator for SegmentStream {
    type Item = Result<Segment>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let (index, chunk) = self.chunks.next()?;
        let text = chunk.text();

        log::debug!(
            "Synthesizing chunk {}/{} ({} chars)",
            index + 1,
            self.total,
            chunk.budget_chars()
        );

        match self.synthesizer.synthesize(&text, &self.voice) {
            Ok(result) => Some(Ok(Segment {
                index,
                text,
                phonemes: result.phonemes,
                samples: result.samples,
                sample_rate: result.sample_rate,
            })),
            Err(e) => {
                self.failed = true;
                log::error!("Synthesis failed for chunk {index}: {e}");
                Some(Err(SpeechError::Synthesis {
                    chunk: index,
                    message: e.to_string(),
                }))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            (0, Some(0))
        } else {
            (0, self.chunks.size_hint().1)
        }
    }
}

impl FusedIterator for SegmentStream {}

/// Receives encoded chunks in streaming mode.
pub trait ChunkSink {
    /// Hand over one encoded chunk. Returns false when the consumer is gone.
    fn deliver(&mut self, bytes: Vec<u8>) -> bool;

    /// True once the consumer has gone away.
    fn is_closed(&self) -> bool {
        false
    }
}

pub struct SpeechPipeline {
    registry: Arc<VoiceRegistry>,
    encoder: Arc<dyn AudioEncoder>,
    config: PipelineConfig,
}

impl SpeechPipeline {
    pub fn new(
        registry: Arc<VoiceRegistry>,
        encoder: Arc<dyn AudioEncoder>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            encoder,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &VoiceRegistry {
        &self.registry
    }

    /// Reject bad requests before any synthesis work.
    pub fn validate(
        &self,
        text: &str,
        voice: &str,
    ) -> std::result::Result<&LanguageProfile, ValidationError> {
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyText);
        }
        self.registry.resolve(voice)
    }

    /// Chunks the utterance would be synthesized as.
    pub fn plan(&self, text: &str) -> Vec<Chunk> {
        text::chunk_text(text, self.config.max_chunk_chars)
    }

    /// Validate the request and return a lazy stream of its segments.
    pub fn segments(&self, text: &str, voice: &str) -> Result<SegmentStream> {
        let profile = self.validate(text, voice)?;
        let chunks = self.plan(text);
        if chunks.is_empty() {
            return Err(ValidationError::EmptyText.into());
        }

        log::info!(
            "Synthesizing {} chunk(s) with voice {voice} [{}]",
            chunks.len(),
            profile.language()
        );

        Ok(SegmentStream {
            synthesizer: Arc::clone(profile.synthesizer()),
            voice: voice.trim().to_string(),
            total: chunks.len(),
            chunks: chunks.into_iter().enumerate(),
            failed: false,
        })
    }

    /// Synthesize every chunk and stitch the segments into one waveform.
    pub fn synthesize(&self, text: &str, voice: &str) -> Result<SynthesisResult> {
        let segments = self
            .segments(text, voice)?
            .collect::<Result<Vec<Segment>>>()?;
        self.stitch(&segments)
    }

    /// Stitch segments with the configured [`StitchMode`].
    pub fn stitch(&self, segments: &[Segment]) -> Result<SynthesisResult> {
        let sample_rate = segments.first().map(|s| s.sample_rate).unwrap_or_default();
        if let Some(other) = segments.iter().find(|s| s.sample_rate != sample_rate) {
            return Err(SpeechError::SampleRateMismatch {
                expected: sample_rate,
                found: other.sample_rate,
            });
        }

        let waveforms: Vec<&[f32]> = segments.iter().map(|s| s.samples.as_slice()).collect();
        let samples = audio::stitch(&waveforms, self.config.stitch)?;
        let phonemes = segments
            .iter()
            .map(|s| s.phonemes.as_str())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Ok(SynthesisResult {
            samples,
            sample_rate,
            phonemes,
        })
    }

    /// Buffered mode: synthesize, stitch and encode once.
    pub fn render(&self, text: &str, voice: &str, format: AudioFormat) -> Result<EncodedAudio> {
        let audio = self.synthesize(text, voice)?;
        let bytes = self
            .encoder
            .encode(&audio.samples, audio.sample_rate, format)?;
        Ok(encoded(format, bytes, &audio))
    }

    /// Like [`render`](Self::render), but an encoding failure re-encodes the
    /// same waveform in the fallback format instead of failing.
    pub fn render_with_fallback(
        &self,
        text: &str,
        voice: &str,
        format: AudioFormat,
    ) -> Result<EncodedAudio> {
        let audio = self.synthesize(text, voice)?;
        self.encode_with_fallback(&audio, format)
    }

    fn encode_with_fallback(
        &self,
        audio: &SynthesisResult,
        format: AudioFormat,
    ) -> Result<EncodedAudio> {
        let fallback = self.config.fallback_format;
        match self.encoder.encode(&audio.samples, audio.sample_rate, format) {
            Ok(bytes) => Ok(encoded(format, bytes, audio)),
            Err(err) if format != fallback => {
                log::warn!("Encoding {format} failed ({err}); falling back to {fallback}");
                let bytes = self
                    .encoder
                    .encode(&audio.samples, audio.sample_rate, fallback)?;
                Ok(encoded(fallback, bytes, audio))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Streaming mode: encode each segment on its own and deliver it as soon
    /// as it is ready. Returns the number of chunks delivered.
    ///
    /// No crossfade is applied. Encoding failures end the stream; there is no
    /// format fallback mid-stream. Once the sink closes no further synthesis
    /// calls are made.
    pub fn stream<K: ChunkSink>(
        &self,
        mut segments: SegmentStream,
        format: AudioFormat,
        sink: &mut K,
    ) -> Result<usize> {
        let pause = Duration::from_millis(self.config.stream_pause_ms);
        let mut emitted = 0;

        loop {
            if sink.is_closed() {
                return Err(self.cancelled(emitted));
            }
            let Some(segment) = segments.next() else {
                break;
            };
            let segment = segment?;

            if emitted > 0 && !pause.is_zero() {
                std::thread::sleep(pause);
            }

            let bytes = self
                .encoder
                .encode(&segment.samples, segment.sample_rate, format)?;
            if !sink.deliver(bytes) {
                return Err(self.cancelled(emitted));
            }
            emitted += 1;
        }

        log::info!("Streamed {emitted} chunk(s) as {format}");
        Ok(emitted)
    }

    fn cancelled(&self, emitted: usize) -> SpeechError {
        log::info!("Consumer went away after {emitted} chunk(s); stopping synthesis");
        SpeechError::Cancelled { emitted }
    }
}

fn encoded(format: AudioFormat, bytes: Vec<u8>, audio: &SynthesisResult) -> EncodedAudio {
    EncodedAudio {
        format,
        bytes,
        phonemes: audio.phonemes.clone(),
        duration_secs: audio.duration_secs(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::audio::EncodeError;
    use crate::voices::Language;
    use crate::BoxError;

    /// Emits a fixed number of samples per character and records every call.
    #[derive(Default)]
    pub(crate) struct FakeSynthesizer {
        pub calls: Mutex<Vec<(String, String)>>,
        pub fail_on_call: Option<usize>,
        pub samples_per_char: usize,
    }

    impl FakeSynthesizer {
        pub fn new(samples_per_char: usize) -> Self {
            Self {
                samples_per_char,
                ..Default::default()
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    impl Synthesizer for FakeSynthesizer {
        fn synthesize(
            &self,
            text: &str,
            voice: &str,
        ) -> std::result::Result<SynthesisResult, BoxError> {
            let mut calls = self.calls.lock();
            calls.push((text.to_string(), voice.to_string()));
            if self.fail_on_call == Some(calls.len()) {
                return Err(format!("engine exploded on {text:?}").into());
            }
            let len = text.chars().count() * self.samples_per_char;
            Ok(SynthesisResult {
                samples: vec![0.5; len],
                sample_rate: 24_000,
                phonemes: format!("/{}/", text.len()),
            })
        }
    }

    /// Encodes a waveform as its sample count; can refuse chosen formats.
    #[derive(Default)]
    pub(crate) struct FakeEncoder {
        pub refuse: Vec<AudioFormat>,
        pub calls: AtomicUsize,
    }

    impl AudioEncoder for FakeEncoder {
        fn encode(
            &self,
            samples: &[f32],
            _sample_rate: u32,
            format: AudioFormat,
        ) -> std::result::Result<Vec<u8>, EncodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.refuse.contains(&format) {
                return Err(EncodeError::Ffmpeg {
                    format,
                    message: "codec missing".to_string(),
                });
            }
            Ok(format!("{format}:{}", samples.len()).into_bytes())
        }
    }

    pub(crate) fn pipeline_with(
        synth: Arc<FakeSynthesizer>,
        encoder: FakeEncoder,
        config: PipelineConfig,
    ) -> SpeechPipeline {
        let mut registry = VoiceRegistry::new();
        for code in ['a', 'b', 'f', 'h'] {
            registry.register(Language::from_code(code).unwrap(), synth.clone());
        }
        SpeechPipeline::new(Arc::new(registry), Arc::new(encoder), config)
    }

    fn quiet_config() -> PipelineConfig {
        PipelineConfigBuilder::default()
            .max_chunk_chars(20usize)
            .stream_pause_ms(0u64)
            .build()
            .unwrap()
    }

    #[derive(Default)]
    struct Recorder {
        chunks: Vec<Vec<u8>>,
        close_after: Option<usize>,
        accept_only: Option<usize>,
    }

    impl ChunkSink for Recorder {
        fn deliver(&mut self, bytes: Vec<u8>) -> bool {
            if self.accept_only.is_some_and(|n| self.chunks.len() >= n) {
                return false;
            }
            self.chunks.push(bytes);
            true
        }

        fn is_closed(&self) -> bool {
            self.close_after.is_some_and(|n| self.chunks.len() >= n)
        }
    }

    const TEXT: &str = "One two three. Four five six. Seven eight nine. Ten.";

    #[test]
    fn builder_defaults_match_default_config() {
        let built = PipelineConfigBuilder::default().build().unwrap();
        assert_eq!(built, PipelineConfig::default());
        assert_eq!(built.max_chunk_chars, 200);
        assert_eq!(built.default_voice, "af_heart");
    }

    #[test]
    fn synthesizes_chunks_in_order_and_concatenates() {
        let synth = Arc::new(FakeSynthesizer::new(10));
        let pipeline = pipeline_with(synth.clone(), FakeEncoder::default(), quiet_config());

        let audio = pipeline.synthesize(TEXT, "af_heart").unwrap();

        let calls = synth.calls.lock().clone();
        let texts: Vec<&str> = calls.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(
            texts,
            vec!["One two three.", "Four five six.", "Seven eight nine.", "Ten."]
        );
        assert!(calls.iter().all(|(_, v)| v == "af_heart"));

        let expected: usize = texts.iter().map(|t| t.chars().count() * 10).sum();
        assert_eq!(audio.samples.len(), expected);
        assert_eq!(audio.sample_rate, 24_000);
        assert_eq!(audio.phonemes, "/14/ /14/ /17/ /4/");
    }

    #[test]
    fn crossfade_mode_removes_overlap_between_segments() {
        let synth = Arc::new(FakeSynthesizer::new(1000));
        let mut config = quiet_config();
        config.stitch = StitchMode::Crossfade { overlap: 2000 };
        let pipeline = pipeline_with(synth, FakeEncoder::default(), config);

        let audio = pipeline.synthesize(TEXT, "af_heart").unwrap();
        assert_eq!(audio.samples.len(), (14 + 14 + 17 + 4) * 1000 - 3 * 2000);
    }

    #[test]
    fn crossfade_with_too_short_segment_fails_the_request() {
        let synth = Arc::new(FakeSynthesizer::new(100));
        let mut config = quiet_config();
        config.stitch = StitchMode::crossfade();
        let pipeline = pipeline_with(synth, FakeEncoder::default(), config);

        let err = pipeline.synthesize(TEXT, "af_heart").unwrap_err();
        assert!(matches!(err, SpeechError::Stitch(_)), "{err:?}");
    }

    #[test]
    fn unsupported_language_is_rejected_before_synthesis() {
        let synth = Arc::new(FakeSynthesizer::new(1));
        let pipeline = pipeline_with(synth.clone(), FakeEncoder::default(), quiet_config());

        let err = pipeline.render(TEXT, "zz_test", AudioFormat::Mp3).unwrap_err();
        assert!(matches!(
            err,
            SpeechError::Validation(ValidationError::UnsupportedLanguage('z'))
        ));
        assert_eq!(synth.call_count(), 0);
    }

    #[test]
    fn empty_text_is_rejected_before_synthesis() {
        let synth = Arc::new(FakeSynthesizer::new(1));
        let pipeline = pipeline_with(synth.clone(), FakeEncoder::default(), quiet_config());

        for text in ["", "   ", " . . "] {
            let err = pipeline.synthesize(text, "af_heart").unwrap_err();
            assert!(matches!(err, SpeechError::Validation(ValidationError::EmptyText)), "{text:?}");
        }
        assert_eq!(synth.call_count(), 0);
    }

    #[test]
    fn synthesis_failure_fails_whole_utterance_without_retry() {
        let synth = Arc::new(FakeSynthesizer {
            fail_on_call: Some(2),
            samples_per_char: 1,
            ..Default::default()
        });
        let pipeline = pipeline_with(synth.clone(), FakeEncoder::default(), quiet_config());

        let err = pipeline.render(TEXT, "af_heart", AudioFormat::Wav).unwrap_err();
        match err {
            SpeechError::Synthesis { chunk, message } => {
                assert_eq!(chunk, 1);
                assert!(message.contains("engine exploded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(synth.call_count(), 2);
    }

    #[test]
    fn segment_stream_is_lazy_and_fused() {
        let synth = Arc::new(FakeSynthesizer {
            fail_on_call: Some(1),
            samples_per_char: 1,
            ..Default::default()
        });
        let pipeline = pipeline_with(synth.clone(), FakeEncoder::default(), quiet_config());

        let mut stream = pipeline.segments(TEXT, "af_heart").unwrap();
        assert_eq!(stream.total(), 4);
        assert_eq!(synth.call_count(), 0);

        assert!(stream.next().unwrap().is_err());
        assert!(stream.next().is_none());
        assert_eq!(synth.call_count(), 1);
    }

    #[test]
    fn mismatched_sample_rates_are_rejected() {
        let synth = Arc::new(FakeSynthesizer::new(1));
        let pipeline = pipeline_with(synth, FakeEncoder::default(), quiet_config());
        let segment = |index, sample_rate| Segment {
            index,
            text: String::new(),
            phonemes: String::new(),
            samples: vec![0.0; 10],
            sample_rate,
        };

        let err = pipeline
            .stitch(&[segment(0, 24_000), segment(1, 22_050)])
            .unwrap_err();
        assert!(matches!(
            err,
            SpeechError::SampleRateMismatch {
                expected: 24_000,
                found: 22_050
            }
        ));
    }

    #[test]
    fn render_reports_requested_format() {
        let synth = Arc::new(FakeSynthesizer::new(2));
        let pipeline = pipeline_with(synth, FakeEncoder::default(), quiet_config());

        let audio = pipeline.render("Hi.", "bf_emma", AudioFormat::Ogg).unwrap();
        assert_eq!(audio.format, AudioFormat::Ogg);
        assert_eq!(audio.bytes, b"ogg:6");
    }

    #[test]
    fn render_fails_when_encoder_fails() {
        let synth = Arc::new(FakeSynthesizer::new(2));
        let encoder = FakeEncoder {
            refuse: vec![AudioFormat::Opus],
            ..Default::default()
        };
        let pipeline = pipeline_with(synth, encoder, quiet_config());

        let err = pipeline.render("Hi.", "af_heart", AudioFormat::Opus).unwrap_err();
        assert!(matches!(err, SpeechError::Encoding(_)));
    }

    #[test]
    fn fallback_reencodes_same_waveform_as_mp3() {
        let synth = Arc::new(FakeSynthesizer::new(2));
        let encoder = FakeEncoder {
            refuse: vec![AudioFormat::Opus],
            ..Default::default()
        };
        let pipeline = pipeline_with(synth.clone(), encoder, quiet_config());

        let audio = pipeline
            .render_with_fallback("Hi.", "af_heart", AudioFormat::Opus)
            .unwrap();
        assert_eq!(audio.format, AudioFormat::Mp3);
        assert_eq!(audio.bytes, b"mp3:6");
        assert_eq!(synth.call_count(), 1);
    }

    #[test]
    fn fallback_failure_is_still_an_error() {
        let synth = Arc::new(FakeSynthesizer::new(2));
        let encoder = FakeEncoder {
            refuse: vec![AudioFormat::Opus, AudioFormat::Mp3],
            ..Default::default()
        };
        let pipeline = pipeline_with(synth, encoder, quiet_config());

        let err = pipeline
            .render_with_fallback("Hi.", "af_heart", AudioFormat::Opus)
            .unwrap_err();
        assert!(matches!(err, SpeechError::Encoding(_)));
    }

    #[test]
    fn stream_encodes_each_chunk_in_order() {
        let synth = Arc::new(FakeSynthesizer::new(1));
        let pipeline = pipeline_with(synth, FakeEncoder::default(), quiet_config());

        let segments = pipeline.segments(TEXT, "af_heart").unwrap();
        let mut sink = Recorder::default();
        let emitted = pipeline.stream(segments, AudioFormat::Mp3, &mut sink).unwrap();

        assert_eq!(emitted, 4);
        let chunks: Vec<String> = sink
            .chunks
            .iter()
            .map(|c| String::from_utf8(c.clone()).unwrap())
            .collect();
        assert_eq!(chunks, vec!["mp3:14", "mp3:14", "mp3:17", "mp3:4"]);
    }

    #[test]
    fn closed_sink_stops_further_synthesis() {
        let synth = Arc::new(FakeSynthesizer::new(1));
        let pipeline = pipeline_with(synth.clone(), FakeEncoder::default(), quiet_config());

        let segments = pipeline.segments(TEXT, "af_heart").unwrap();
        let mut sink = Recorder {
            close_after: Some(1),
            ..Default::default()
        };
        let err = pipeline
            .stream(segments, AudioFormat::Mp3, &mut sink)
            .unwrap_err();

        assert!(matches!(err, SpeechError::Cancelled { emitted: 1 }));
        assert_eq!(synth.call_count(), 1);
    }

    #[test]
    fn rejected_delivery_stops_further_synthesis() {
        let synth = Arc::new(FakeSynthesizer::new(1));
        let pipeline = pipeline_with(synth.clone(), FakeEncoder::default(), quiet_config());

        let segments = pipeline.segments(TEXT, "af_heart").unwrap();
        let mut sink = Recorder {
            accept_only: Some(1),
            ..Default::default()
        };
        let err = pipeline
            .stream(segments, AudioFormat::Mp3, &mut sink)
            .unwrap_err();

        assert!(matches!(err, SpeechError::Cancelled { emitted: 1 }));
        assert_eq!(sink.chunks, vec![b"mp3:14".to_vec()]);
        // The refused chunk was synthesized, nothing after it.
        assert_eq!(synth.call_count(), 2);
    }

    #[test]
    fn stream_encoding_failure_has_no_fallback() {
        let synth = Arc::new(FakeSynthesizer::new(1));
        let encoder = FakeEncoder {
            refuse: vec![AudioFormat::Mp3],
            ..Default::default()
        };
        let pipeline = pipeline_with(synth, encoder, quiet_config());

        let segments = pipeline.segments(TEXT, "af_heart").unwrap();
        let mut sink = Recorder::default();
        let err = pipeline
            .stream(segments, AudioFormat::Mp3, &mut sink)
            .unwrap_err();
        assert!(matches!(err, SpeechError::Encoding(_)));
        assert!(sink.chunks.is_empty());
    }
}
