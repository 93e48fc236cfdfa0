use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use cosy_relay::{
    BackendKind, ChannelSink, CosyVoiceBackend, OutboundEvent, RelayConfig, StubBackend,
    SynthesisBackend, TtsRelay,
};

const USAGE: &str = "Usage: cosy-relay [--config <relay.yaml>] [--output <audio.pcm>]

Reads text from stdin, one chunk per line, and writes raw 16-bit mono PCM to
the output file (stdout by default).
  /flush     interrupt everything queued or playing
  text\\      a trailing backslash keeps the segment open";

struct CliOptions {
    config: Option<PathBuf>,
    output: Option<PathBuf>,
}

/// One line of stdin, interpreted.
#[derive(Debug, PartialEq, Eq)]
enum InputLine<'a> {
    Command(&'a str),
    Text { text: &'a str, end_of_segment: bool },
    Blank,
}

fn parse_line(line: &str) -> InputLine<'_> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.trim().is_empty() {
        return InputLine::Blank;
    }
    if let Some(command) = trimmed.trim().strip_prefix('/')
        && !command.is_empty()
    {
        return InputLine::Command(command);
    }
    match trimmed.strip_suffix('\\') {
        Some(text) => InputLine::Text {
            text,
            end_of_segment: false,
        },
        None => InputLine::Text {
            text: trimmed,
            end_of_segment: true,
        },
    }
}

fn parse_args() -> anyhow::Result<Option<CliOptions>> {
    let mut options = CliOptions {
        config: None,
        output: None,
    };
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config = Some(PathBuf::from(path));
            }
            "-o" | "--output" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow!("--output requires a file path"))?;
                options.output = Some(PathBuf::from(path));
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(None);
            }
            other => anyhow::bail!("Unknown option '{other}'.\n{USAGE}"),
        }
    }
    Ok(Some(options))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout may carry audio
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let Some(options) = parse_args()? else {
        return Ok(());
    };

    // Load configuration
    let config = match &options.config {
        Some(path) => RelayConfig::from_file(path),
        None => RelayConfig::from_env(),
    }
    .map_err(|e| anyhow!(e.to_string()))?;
    info!(?config, "Loaded relay configuration");

    match config.backend {
        BackendKind::CosyVoice => {
            let cosy_config = config.cosyvoice_config().map_err(|e| anyhow!(e))?;
            let backend = CosyVoiceBackend::new(cosy_config)?;
            run(&config, backend, options.output).await
        }
        BackendKind::Stub => run(&config, StubBackend::default(), options.output).await,
    }
}

async fn run<B: SynthesisBackend>(
    config: &RelayConfig,
    backend: B,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let writer: Box<dyn AsyncWrite + Unpin + Send> = match &output {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .map_err(|e| anyhow!("Failed to create {}: {e}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let (sink, events) = ChannelSink::channel();
    let sink = Arc::new(sink);
    let relay = TtsRelay::start(config.relay_config(), backend, sink.clone(), sink)?;
    let writer_task = tokio::spawn(write_audio(events, writer));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let interrupted = loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break false;
                };
                match parse_line(&line) {
                    InputLine::Command(name) => {
                        let result = relay.on_cmd(name);
                        debug!(?result, "Command handled");
                    }
                    InputLine::Text { text, end_of_segment } => {
                        relay.on_data(text, end_of_segment);
                    }
                    InputLine::Blank => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, discarding pending text");
                break true;
            }
        }
    };

    if interrupted {
        relay.stop().await?;
    } else {
        relay.finish().await?;
    }
    let stats = relay.stats();
    drop(relay);

    let written = writer_task
        .await
        .map_err(|e| anyhow!("Audio writer failed: {e}"))??;
    info!(
        bytes = written,
        inputs = stats.inputs_received,
        segments = stats.segments_completed,
        frames = stats.frames_emitted,
        dropped_frames = stats.frames_dropped,
        "Relay finished"
    );
    Ok(())
}

async fn write_audio(
    mut events: UnboundedReceiver<OutboundEvent>,
    mut writer: Box<dyn AsyncWrite + Unpin + Send>,
) -> std::io::Result<u64> {
    let mut written = 0u64;
    while let Some(event) = events.recv().await {
        match event {
            OutboundEvent::Frame(frame) => {
                writer.write_all(frame.payload()).await?;
                written += frame.payload().len() as u64;
            }
            OutboundEvent::Command(name) => debug!("Downstream command: {}", name),
        }
    }
    writer.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_end_their_segment() {
        assert_eq!(
            parse_line("Hello there."),
            InputLine::Text {
                text: "Hello there.",
                end_of_segment: true
            }
        );
    }

    #[test]
    fn trailing_backslash_keeps_segment_open() {
        assert_eq!(
            parse_line("Hello \\"),
            InputLine::Text {
                text: "Hello ",
                end_of_segment: false
            }
        );
    }

    #[test]
    fn slash_lines_are_commands() {
        assert_eq!(parse_line("/flush"), InputLine::Command("flush"));
        assert_eq!(parse_line("  /pause "), InputLine::Command("pause"));
        assert_eq!(
            parse_line("/"),
            InputLine::Text {
                text: "/",
                end_of_segment: true
            }
        );
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(parse_line(""), InputLine::Blank);
        assert_eq!(parse_line("   \r"), InputLine::Blank);
    }
}
