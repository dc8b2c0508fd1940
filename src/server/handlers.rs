use std::convert::Infallible;
use std::io;

use axum::{
    body::Body,
    extract::{Query, State},
    http::header,
    response::{Html, IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::error::ApiError;
use super::AppState;
use crate::audio::AudioFormat;
use crate::error::SpeechError;
use crate::pipeline::{ChunkSink, EncodedAudio};
use crate::voices::voice_catalog;

/// Piece size when streaming a finished file.
pub const FILE_CHUNK_SIZE: usize = 1024 * 1024;

/// Encoded chunks buffered ahead of a slow client.
const STREAM_BUFFER: usize = 4;

const CHAT_PAGE: &str = include_str!("chat.html");

#[derive(Debug, Deserialize)]
pub struct TtsQuery {
    #[serde(default)]
    pub text: String,
    pub voice: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    #[serde(default)]
    pub message: String,
}

impl TtsQuery {
    fn voice(&self, state: &AppState) -> String {
        self.voice
            .clone()
            .unwrap_or_else(|| state.pipeline.config().default_voice.clone())
    }

    fn format(&self) -> Result<AudioFormat, ApiError> {
        Ok(self
            .format
            .as_deref()
            .unwrap_or("mp3")
            .parse::<AudioFormat>()?)
    }
}

/// `GET /tts`: whole utterance as a downloadable file.
pub async fn tts(
    State(state): State<AppState>,
    Query(query): Query<TtsQuery>,
) -> Result<Response, ApiError> {
    let audio = render(&state, query).await?;
    Ok(attachment(audio.format, Body::from(audio.bytes)))
}

/// `GET /tts/stream`: one MP3 per chunk, sent as soon as it is encoded.
pub async fn tts_stream(
    State(state): State<AppState>,
    Query(query): Query<TtsQuery>,
) -> Result<Response, ApiError> {
    let voice = query.voice(&state);
    // Validation errors surface here, before any bytes are sent.
    let segments = state.pipeline.segments(&query.text, &voice)?;

    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let pipeline = state.pipeline.clone();
    tokio::task::spawn_blocking(move || {
        let mut sink = ChannelSink { tx };
        match pipeline.stream(segments, AudioFormat::Mp3, &mut sink) {
            Ok(_) | Err(SpeechError::Cancelled { .. }) => {}
            Err(err) => {
                log::error!("Streaming synthesis failed: {err}");
                let _ = sink.tx.blocking_send(Err(io::Error::other(err.to_string())));
            }
        }
    });

    let body = Body::from_stream(ReceiverStream::new(rx));
    Ok(attachment(AudioFormat::Mp3, body))
}

/// `GET /tts/stream-file`: full render, streamed back in fixed-size pieces.
pub async fn tts_stream_file(
    State(state): State<AppState>,
    Query(query): Query<TtsQuery>,
) -> Result<Response, ApiError> {
    let audio = render(&state, query).await?;
    let pieces = file_pieces(Bytes::from(audio.bytes), FILE_CHUNK_SIZE);
    let body = Body::from_stream(futures::stream::iter(
        pieces.into_iter().map(Ok::<_, Infallible>),
    ));
    Ok(attachment(audio.format, body))
}

/// `GET /voices`
pub async fn voices() -> Json<Value> {
    Json(json!({ "voices": voice_catalog() }))
}

/// `GET /chat`
pub async fn chat_page() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

/// `GET /chat/respond`
pub async fn chat_respond(
    State(state): State<AppState>,
    Query(query): Query<ChatQuery>,
) -> Result<Json<Value>, ApiError> {
    if query.message.trim().is_empty() {
        return Err(ApiError::bad_request("Message must not be empty"));
    }
    let text = state.chat.complete(&query.message).await?;
    Ok(Json(json!({ "text": text })))
}

async fn render(state: &AppState, query: TtsQuery) -> Result<EncodedAudio, ApiError> {
    let format = query.format()?;
    let voice = query.voice(state);
    let pipeline = state.pipeline.clone();

    let audio = tokio::task::spawn_blocking(move || pipeline.render(&query.text, &voice, format))
        .await
        .map_err(|e| ApiError::internal(format!("Synthesis task failed: {e}")))??;

    log::info!(
        "Rendered {:.2}s of {} ({} bytes)",
        audio.duration_secs,
        audio.format,
        audio.bytes.len()
    );
    Ok(audio)
}

fn attachment(format: AudioFormat, body: Body) -> Response {
    let disposition = format!("attachment; filename=\"audio.{}\"", format.extension());
    (
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}

pub(crate) fn file_pieces(bytes: Bytes, size: usize) -> Vec<Bytes> {
    (0..bytes.len())
        .step_by(size.max(1))
        .map(|start| bytes.slice(start..(start + size).min(bytes.len())))
        .collect()
}

struct ChannelSink {
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
}

impl ChunkSink for ChannelSink {
    fn deliver(&mut self, bytes: Vec<u8>) -> bool {
        self.tx.blocking_send(Ok(Bytes::from(bytes))).is_ok()
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
