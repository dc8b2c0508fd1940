use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use kokoro_speech::audio::{AudioFormat, FfmpegEncoder, StitchMode};
use kokoro_speech::config::load_settings;
use kokoro_speech::engines::kokoro;
use kokoro_speech::pipeline::SpeechPipeline;
use kokoro_speech::voices::voice_catalog;

const DEMO_TEXT: &str = "Hello! This is Kokoro speaking. Long passages are split into \
    sentences, synthesized one chunk at a time, and stitched back together into a single \
    recording.";

/// Synthesize text with Kokoro and save it under the output directory.
#[derive(Parser, Debug)]
#[command(name = "kokoro-say", version)]
struct Args {
    /// Text to speak; prompts on stdin when omitted
    #[arg(short, long)]
    text: Option<String>,
    /// Voice identifier, e.g. af_heart or bf_emma
    #[arg(short, long)]
    voice: Option<String>,
    /// File name inside the output directory [default: output.<format>]
    #[arg(short, long)]
    output: Option<String>,
    /// mp3, wav, ogg, aac or opus
    #[arg(short, long, default_value = "wav")]
    format: String,
    /// Crossfade chunks over this many samples instead of concatenating
    #[arg(long)]
    crossfade: Option<usize>,
    /// Settings file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Print the voice catalog and exit
    #[arg(long)]
    list: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.list {
        for voice in voice_catalog() {
            println!("{:<12} {}", voice.id, voice.name);
        }
        return Ok(());
    }

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(overlap) = args.crossfade {
        settings.pipeline.stitch = StitchMode::Crossfade { overlap };
        settings.validate()?;
    }

    let format = match args.format.parse::<AudioFormat>() {
        Ok(format) => format,
        Err(err) => {
            let fallback = settings.pipeline.fallback_format;
            log::warn!("{err}; using {fallback}");
            fallback
        }
    };

    let text = match args.text {
        Some(text) => text,
        None => prompt_for_text()?,
    };
    let voice = args
        .voice
        .unwrap_or_else(|| settings.pipeline.default_voice.clone());

    let registry = kokoro::build_registry(&settings.models, &settings.languages()?)
        .with_context(|| format!("loading Kokoro from {}", settings.models.dir.display()))?;
    let pipeline = SpeechPipeline::new(
        Arc::new(registry),
        Arc::new(FfmpegEncoder::new()),
        settings.pipeline.clone(),
    );

    println!("Generating audio...");
    let audio = pipeline.render_with_fallback(&text, &voice, format)?;

    std::fs::create_dir_all(&settings.output_dir).with_context(|| {
        format!("creating output directory {}", settings.output_dir.display())
    })?;
    let path = settings
        .output_dir
        .join(output_file_name(args.output.as_deref(), audio.format));
    std::fs::write(&path, &audio.bytes).with_context(|| format!("writing {}", path.display()))?;

    println!("\nAudio saved to: {} ({:.1}s)", path.display(), audio.duration_secs);
    println!("\nPhonemes used:\n{}", audio.phonemes);
    Ok(())
}

fn prompt_for_text() -> io::Result<String> {
    print!("Enter text to synthesize (or press Enter for default): ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let text = line.trim();
    Ok(if text.is_empty() {
        DEMO_TEXT.to_string()
    } else {
        text.to_string()
    })
}

/// Extension follows the format actually written, including after a fallback.
fn output_file_name(requested: Option<&str>, format: AudioFormat) -> PathBuf {
    Path::new(requested.unwrap_or("output")).with_extension(format.extension())
}
