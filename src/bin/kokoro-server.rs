use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use kokoro_speech::audio::FfmpegEncoder;
use kokoro_speech::chat::OpenAiChat;
use kokoro_speech::config::load_settings;
use kokoro_speech::engines::kokoro;
use kokoro_speech::pipeline::SpeechPipeline;
use kokoro_speech::server::{self, AppState};

/// Kokoro text-to-speech HTTP server.
#[derive(Parser, Debug)]
#[command(name = "kokoro-server", version)]
struct Args {
    /// Settings file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Interface to bind, overrides server.host
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on, overrides server.port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    let languages = settings.languages()?;
    let registry = kokoro::build_registry(&settings.models, &languages)
        .with_context(|| format!("loading Kokoro from {}", settings.models.dir.display()))?;
    log::info!("Serving languages: {:?}", registry.languages());

    let pipeline = SpeechPipeline::new(
        Arc::new(registry),
        Arc::new(FfmpegEncoder::new()),
        settings.pipeline.clone(),
    );
    let chat = OpenAiChat::new(settings.chat.clone())?;
    let state = AppState::new(pipeline, Arc::new(chat));

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("invalid server address")?;
    server::serve(state, addr).await?;
    Ok(())
}
