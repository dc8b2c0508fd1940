//! HTTP API over the speech pipeline.
//!
//! | Route | Response |
//! |---|---|
//! | `GET /tts` | whole utterance as an attachment |
//! | `GET /tts/stream` | chunked MP3, one piece per text chunk |
//! | `GET /tts/stream-file` | whole utterance, sent in 1 MiB pieces |
//! | `GET /voices` | voice catalog |
//! | `GET /chat` | chat page that speaks replies |
//! | `GET /chat/respond` | chat reply as `{"text": ...}` |

mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};

pub use error::ApiError;

use crate::chat::ChatClient;
use crate::pipeline::SpeechPipeline;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SpeechPipeline>,
    pub chat: Arc<dyn ChatClient>,
}

impl AppState {
    pub fn new(pipeline: SpeechPipeline, chat: Arc<dyn ChatClient>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            chat,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/tts", get(handlers::tts))
        .route("/tts/stream", get(handlers::tts_stream))
        .route("/tts/stream-file", get(handlers::tts_stream_file))
        .route("/voices", get(handlers::voices))
        .route("/chat", get(handlers::chat_page))
        .route("/chat/respond", get(handlers::chat_respond))
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl+C or SIGTERM.
pub async fn serve(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Received Ctrl+C, shutting down"),
        _ = terminate => log::info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use bytes::Bytes;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::handlers::file_pieces;
    use super::*;
    use crate::chat::ChatError;
    use crate::pipeline::tests::{pipeline_with, FakeEncoder, FakeSynthesizer};
    use crate::pipeline::PipelineConfigBuilder;

    struct EchoChat;

    #[async_trait]
    impl ChatClient for EchoChat {
        async fn complete(&self, message: &str) -> Result<String, ChatError> {
            Ok(format!("echo: {message}"))
        }
    }

    struct BrokenChat;

    #[async_trait]
    impl ChatClient for BrokenChat {
        async fn complete(&self, _message: &str) -> Result<String, ChatError> {
            Err(ChatError::MissingApiKey)
        }
    }

    fn app_with(synth: Arc<FakeSynthesizer>, chat: Arc<dyn ChatClient>) -> Router {
        let config = PipelineConfigBuilder::default()
            .max_chunk_chars(20usize)
            .stream_pause_ms(0u64)
            .build()
            .unwrap();
        let pipeline = pipeline_with(synth, FakeEncoder::default(), config);
        create_router(AppState::new(pipeline, chat))
    }

    fn app(synth: Arc<FakeSynthesizer>) -> Router {
        app_with(synth, Arc::new(EchoChat))
    }

    async fn get(app: Router, uri: &str) -> Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn header_value<'a>(response: &'a Response, name: header::HeaderName) -> &'a str {
        response.headers()[name].to_str().unwrap()
    }

    #[tokio::test]
    async fn tts_returns_attachment_in_requested_format() {
        let synth = Arc::new(FakeSynthesizer::new(1));
        let response = get(
            app(synth.clone()),
            "/tts?text=Hello%20there.&voice=bf_emma&format=wav",
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_value(&response, header::CONTENT_TYPE), "audio/wav");
        assert_eq!(
            header_value(&response, header::CONTENT_DISPOSITION),
            "attachment; filename=\"audio.wav\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"wav:12");
        assert_eq!(synth.calls.lock()[0].1, "bf_emma");
    }

    #[tokio::test]
    async fn tts_defaults_to_mp3_and_default_voice() {
        let synth = Arc::new(FakeSynthesizer::new(1));
        let response = get(app(synth.clone()), "/tts?text=Hi.").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_value(&response, header::CONTENT_TYPE), "audio/mpeg");
        assert_eq!(synth.calls.lock()[0].1, "af_heart");
    }

    #[tokio::test]
    async fn unsupported_format_is_bad_request_without_synthesis() {
        let synth = Arc::new(FakeSynthesizer::new(1));
        let response = get(app(synth.clone()), "/tts?text=Hello.&format=xyz").await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["detail"], "Unsupported audio format: xyz");
        assert_eq!(synth.call_count(), 0);
    }

    #[tokio::test]
    async fn unknown_language_is_bad_request_without_synthesis() {
        let synth = Arc::new(FakeSynthesizer::new(1));
        for uri in [
            "/tts?text=Hello.&voice=zz_test",
            "/tts/stream?text=Hello.&voice=zz_test",
            "/tts/stream-file?text=Hello.&voice=zz_test",
        ] {
            let response = get(app(synth.clone()), uri).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            let body = body_json(response).await;
            assert!(body["detail"].as_str().unwrap().contains('z'));
        }
        assert_eq!(synth.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_text_is_bad_request() {
        let synth = Arc::new(FakeSynthesizer::new(1));
        let response = get(app(synth), "/tts?voice=af_heart").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn synthesis_failure_is_internal_error() {
        let synth = Arc::new(FakeSynthesizer {
            fail_on_call: Some(1),
            samples_per_char: 1,
            ..Default::default()
        });
        let response = get(app(synth), "/tts?text=Hello.").await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert!(body["detail"].as_str().unwrap().contains("engine exploded"));
    }

    #[tokio::test]
    async fn stream_sends_one_mp3_per_chunk() {
        let synth = Arc::new(FakeSynthesizer::new(1));
        let response = get(
            app(synth.clone()),
            "/tts/stream?text=One%20two%20three.%20Four%20five%20six.",
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_value(&response, header::CONTENT_TYPE), "audio/mpeg");
        assert_eq!(
            header_value(&response, header::CONTENT_DISPOSITION),
            "attachment; filename=\"audio.mp3\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"mp3:14mp3:14");
        assert_eq!(synth.call_count(), 2);
    }

    #[tokio::test]
    async fn stream_failure_aborts_body() {
        let synth = Arc::new(FakeSynthesizer {
            fail_on_call: Some(2),
            samples_per_char: 1,
            ..Default::default()
        });
        let response = get(
            app(synth.clone()),
            "/tts/stream?text=One%20two%20three.%20Four%20five%20six.%20Ten.",
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(to_bytes(response.into_body(), usize::MAX).await.is_err());
        assert_eq!(synth.call_count(), 2);
    }

    #[tokio::test]
    async fn stream_file_returns_whole_render() {
        let synth = Arc::new(FakeSynthesizer::new(1));
        let response = get(app(synth), "/tts/stream-file?text=Hi.&format=ogg").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_value(&response, header::CONTENT_TYPE), "audio/ogg");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ogg:3");
    }

    #[test]
    fn file_pieces_cover_the_whole_file() {
        let data = Bytes::from(vec![7u8; 2 * 1024 * 1024 + 10]);
        let pieces = file_pieces(data.clone(), 1024 * 1024);
        assert_eq!(
            pieces.iter().map(Bytes::len).collect::<Vec<_>>(),
            vec![1024 * 1024, 1024 * 1024, 10]
        );
        assert_eq!(pieces.concat(), data.to_vec());
        assert!(file_pieces(Bytes::new(), 1024).is_empty());
    }

    #[tokio::test]
    async fn voices_lists_catalog() {
        let response = get(app(Arc::new(FakeSynthesizer::new(1))), "/voices").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let voices = body["voices"].as_array().unwrap();
        assert_eq!(voices.len(), 14);
        assert_eq!(voices[0]["id"], "af_heart");
        assert_eq!(voices[0]["name"], "Heart (Default)");
    }

    #[tokio::test]
    async fn chat_page_is_html() {
        let response = get(app(Arc::new(FakeSynthesizer::new(1))), "/chat").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(header_value(&response, header::CONTENT_TYPE).starts_with("text/html"));
    }

    #[tokio::test]
    async fn chat_respond_returns_reply_text() {
        let response = get(
            app(Arc::new(FakeSynthesizer::new(1))),
            "/chat/respond?message=hello%20there",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["text"], "echo: hello there");
    }

    #[tokio::test]
    async fn chat_failure_is_internal_error() {
        let app = app_with(Arc::new(FakeSynthesizer::new(1)), Arc::new(BrokenChat));
        let response = get(app, "/chat/respond?message=hi").await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_json(response).await["detail"]
            .as_str()
            .unwrap()
            .contains("API key"));
    }
}
