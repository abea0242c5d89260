use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use garden_walk::audio::{input_device_names, AudioOutput, AudioSource};
use garden_walk::proxy::{create_router, AppState, RelaySettings};
use garden_walk::session::{
    DefaultDevices, LifecycleEvent, LiveSession, Role, SessionConfig, SessionEvent,
};
use garden_walk::upstream::GeminiLiveConnector;
use garden_walk::walk::{PhotoFlow, PhotoTransition};
use garden_walk::Config;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Delay between the AI's sign-off and hanging up, so the goodbye can finish playing
const WRAP_UP_DELAY: Duration = Duration::from_secs(2);

const PHOTO_PROMPT: &str = "Here is the photo of my plant. What do you see?";

#[derive(Parser)]
#[command(name = "garden-walk")]
#[command(about = "Voice garden walk: relay server and terminal client")]
struct Cli {
    /// Config file path (extension optional)
    #[arg(short, long, default_value = "config/garden-walk")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay server
    Serve {
        /// Override the HTTP port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Take a garden walk against a running relay
    Walk {
        /// Relay websocket URL
        #[arg(short, long)]
        url: Option<String>,

        /// Microphone to capture from (host default if omitted)
        #[arg(long, conflicts_with_all = ["input", "silence"])]
        mic: Option<String>,

        /// WAV file to use in place of the microphone
        #[arg(short, long, conflicts_with = "silence")]
        input: Option<PathBuf>,

        /// Send silence instead of capturing
        #[arg(long)]
        silence: bool,

        /// Speaker to play AI speech on (host default if omitted)
        #[arg(long, conflicts_with_all = ["output", "mute"])]
        speaker: Option<String>,

        /// Record AI speech to this WAV file instead of playing it
        #[arg(short, long, conflicts_with = "mute")]
        output: Option<PathBuf>,

        /// Discard AI speech
        #[arg(long)]
        mute: bool,

        /// JPEG to send when the AI asks for a photo
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    /// List capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Garden Walk v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match cli.command {
        Command::Serve { port } => serve(cfg, port).await,
        Command::Walk {
            url,
            mic,
            input,
            silence,
            speaker,
            output,
            mute,
            photo,
        } => {
            let source = match (input, silence) {
                (Some(path), _) => AudioSource::File(path),
                (None, true) => AudioSource::Silence,
                (None, false) => AudioSource::Microphone(mic),
            };
            let output = match (output, mute) {
                (Some(path), _) => AudioOutput::Wav(path),
                (None, true) => AudioOutput::Discard,
                (None, false) => AudioOutput::Speaker(speaker),
            };
            walk(cfg, url, DefaultDevices { source, output }, photo).await
        }
        Command::Devices => {
            for name in input_device_names()? {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

async fn serve(cfg: Config, port: Option<u16>) -> Result<()> {
    let connector = Arc::new(GeminiLiveConnector::new(cfg.upstream.clone()));
    let state = AppState::new(
        connector,
        RelaySettings::from_config(&cfg.relay, &cfg.upstream),
        Duration::from_secs(cfg.relay.ping_interval_secs.max(1)),
    );
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, port.unwrap_or(cfg.service.http.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Relay listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    Ok(())
}

async fn walk(
    cfg: Config,
    url: Option<String>,
    devices: DefaultDevices,
    photo: Option<PathBuf>,
) -> Result<()> {
    let mut config = SessionConfig::from(&cfg.client);
    if let Some(url) = url {
        config.server_url = url;
    }

    let photo = match photo {
        Some(path) => Some(
            tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read photo {}", path.display()))?,
        ),
        None => None,
    };

    let mut session = LiveSession::new(config, Arc::new(devices));
    let mut events = session.connect().await?;

    println!("Connected. Type a message and press Enter to send it as text.");

    let mut flow = PhotoFlow::new();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let wrap_up = tokio::time::sleep(Duration::from_secs(86_400));
    tokio::pin!(wrap_up);
    let mut wrapping = false;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    SessionEvent::MessageCommitted(message) => {
                        println!("{}: {}", message.role.as_str().to_uppercase(), message.content);
                        let transition = flow.observe(message.role, &message.content);
                        handle_photo(&session, &mut flow, transition, photo.as_deref());
                    }
                    SessionEvent::StageAdvanced(stage) => {
                        println!("-- {} --", stage.label());
                    }
                    SessionEvent::Lifecycle(LifecycleEvent::ConversationComplete) => {
                        info!("Walk complete, hanging up shortly");
                        wrapping = true;
                        wrap_up.as_mut().reset(Instant::now() + WRAP_UP_DELAY);
                    }
                    SessionEvent::Lifecycle(LifecycleEvent::Error { message }) => {
                        error!("{}", message);
                    }
                    SessionEvent::Lifecycle(LifecycleEvent::SetupReady { session_id }) => {
                        info!("AI session ready ({:?})", session_id);
                    }
                    SessionEvent::StateChanged(state) => {
                        debug!("Session state: {}", state);
                        if state.is_terminal() {
                            break;
                        }
                    }
                    other => debug!("Session event: {:?}", other),
                }
            }
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match flow.observe(Role::User, line) {
                        Some(transition) => {
                            handle_photo(&session, &mut flow, Some(transition), photo.as_deref())
                        }
                        None => session.send_text(line),
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
            _ = &mut wrap_up, if wrapping => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    session.disconnect().await;

    let stats = session.stats().await;
    info!(
        "Session finished: {} frames sent, {} AI segments, {} messages, stage {}",
        stats.frames_sent, stats.audio_segments_received, stats.messages_committed, stats.stage
    );

    println!("\n=== Garden walk summary ===\n");
    println!("{}", session.summary().await);

    Ok(())
}

fn handle_photo(
    session: &LiveSession,
    flow: &mut PhotoFlow,
    transition: Option<PhotoTransition>,
    photo: Option<&[u8]>,
) {
    match transition {
        Some(PhotoTransition::Opened) => match photo {
            Some(_) => println!("The AI would like a photo. Send it? (yes / no)"),
            None => {
                info!("Photo requested but none was given with --photo");
                flow.cancel();
            }
        },
        Some(PhotoTransition::Accepted) => match photo {
            Some(image) => {
                session.send_image_bytes(image, PHOTO_PROMPT);
                flow.sent();
                println!("Photo sent.");
            }
            None => flow.cancel(),
        },
        Some(PhotoTransition::Declined) => println!("No photo then."),
        Some(PhotoTransition::Sent) | None => {}
    }

    // Microphone stays muted for as long as the side-flow is open
    session.set_capture_paused(flow.capture_paused());
}
