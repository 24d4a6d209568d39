//! Factory Assist CLI - terminal client for the factory support assistant.
//!
//! This is the entry point for the `fassist` binary.

mod app;
mod client;
mod commands;
mod config;
mod dashboard;
mod markdown;
mod reveal;
mod stream;
mod types;
mod ui;
mod voice;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::mpsc;

use app::{App, InputMode};
use client::BackendClient;
use commands::{KbCommand, LifecycleArgs, PendingCommand};
use config::{AppConfig, AssistantMode, RecorderConfig};
use stream::StreamEvent;

/// Factory Assist CLI - chat with the factory support assistant.
#[derive(Parser, Debug)]
#[command(name = "fassist")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend URL.
    #[arg(long, global = true, env = "FACTORY_ASSIST_URL")]
    url: Option<String>,

    /// Delay between revealed characters, in milliseconds.
    #[arg(long, global = true, env = "FACTORY_ASSIST_REVEAL_MS")]
    reveal_ms: Option<u64>,

    /// Microphone capture command; `{output}` is replaced by the capture file.
    #[arg(long, global = true, env = "FACTORY_ASSIST_RECORDER")]
    recorder: Option<String>,

    /// JSON file with settings; flags take precedence.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Assistant to talk to.
    #[arg(long, global = true, value_enum)]
    mode: Option<AssistantMode>,

    /// Enable debug logging.
    #[arg(long, global = true, default_value = "false")]
    debug: bool,

    /// Write logs to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chat with the assistant (default).
    Chat,
    /// Manage the knowledge base.
    #[command(subcommand)]
    Kb(KbCommand),
    /// Review questions the assistant could not answer.
    #[command(subcommand)]
    Pending(PendingCommand),
    /// Summarise a production log.
    Lifecycle(LifecycleArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    let client = BackendClient::new(&config.base_url);

    match args.command.unwrap_or(Command::Chat) {
        Command::Chat => {
            // The TUI owns the terminal; only log when asked to.
            if args.debug || args.log_file.is_some() {
                init_tracing(args.debug, args.log_file.as_deref())?;
            }
            run_tui(client, &config).await
        }
        Command::Kb(kb) => {
            init_tracing(args.debug, args.log_file.as_deref())?;
            commands::run_kb(&client, kb, &mut io::stdin().lock(), &mut io::stdout().lock()).await
        }
        Command::Pending(pending) => {
            init_tracing(args.debug, args.log_file.as_deref())?;
            commands::run_pending(&client, pending, &mut io::stdout().lock()).await
        }
        Command::Lifecycle(lifecycle) => {
            init_tracing(args.debug, args.log_file.as_deref())?;
            commands::run_lifecycle(&client, lifecycle, &mut io::stdout().lock()).await
        }
    }
}

/// Merge the optional config file with command-line flags.
fn load_config(args: &Args) -> anyhow::Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        }
        None => AppConfig::default(),
    };

    if let Some(url) = &args.url {
        config.base_url.clone_from(url);
    }
    if let Some(ms) = args.reveal_ms {
        config.reveal_interval_ms = ms;
    }
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(line) = &args.recorder {
        config.recorder = RecorderConfig::from_command_line(line, &config.recorder.extension)
            .context("--recorder must name a program")?;
    }
    Ok(config)
}

fn init_tracing(debug: bool, log_file: Option<&std::path::Path>) -> anyhow::Result<()> {
    let filter = if debug {
        "factory_assist_cli=debug,factory_assist_core=debug,warn"
    } else {
        "warn"
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => builder.with_writer(io::stderr).init(),
    }
    Ok(())
}

async fn run_tui(client: BackendClient, config: &AppConfig) -> anyhow::Result<()> {
    // Setup terminal with mouse capture enabled
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(config);
    tracing::info!(url = %client.base_url(), mode = ?config.mode, "Chat started");

    let result = run_event_loop(&mut terminal, &mut app, &client).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}

/// Channels the spawned tasks report back on.
struct Channels {
    stream_tx: mpsc::Sender<StreamEvent>,
    voice_tx: mpsc::Sender<Result<String, String>>,
}

/// How often terminal input is polled.
const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What woke the event loop.
#[derive(Debug)]
enum LoopEvent {
    /// Terminal input may be waiting.
    Input,
    Stream(StreamEvent),
    Reveal,
    Voice(Result<String, String>),
}

/// Ticker for input polling. Lives across loop passes so that busy arms
/// cannot keep pushing its deadline back.
fn input_ticker() -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(INPUT_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker
}

/// Wait for the next thing the loop has to handle.
async fn next_event(
    app: &mut App,
    input_tick: &mut tokio::time::Interval,
    stream_rx: &mut mpsc::Receiver<StreamEvent>,
    voice_rx: &mut mpsc::Receiver<Result<String, String>>,
) -> LoopEvent {
    tokio::select! {
        _ = input_tick.tick() => LoopEvent::Input,
        Some(event) = stream_rx.recv() => LoopEvent::Stream(event),
        () = app.reveal_due() => LoopEvent::Reveal,
        Some(result) = voice_rx.recv() => LoopEvent::Voice(result),
    }
}

/// Main event loop.
///
/// Stream fragments, reveal steps and transcription results each redraw
/// immediately; terminal input is polled on its own fixed tick.
async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    client: &BackendClient,
) -> anyhow::Result<()> {
    let (stream_tx, mut stream_rx) = mpsc::channel::<StreamEvent>(256);
    let (voice_tx, mut voice_rx) = mpsc::channel::<Result<String, String>>(4);
    let channels = Channels { stream_tx, voice_tx };
    let mut input_tick = input_ticker();

    loop {
        app.tick_animation();
        terminal.draw(|f| ui::render(f, app))?;

        match next_event(app, &mut input_tick, &mut stream_rx, &mut voice_rx).await {
            LoopEvent::Input => {
                while event::poll(Duration::from_millis(0)).unwrap_or(false) {
                    if let Ok(evt) = event::read() {
                        handle_input(app, evt, client, &channels);
                    }
                }
            }
            LoopEvent::Stream(event) => {
                app.handle_stream_event(event);
            }
            LoopEvent::Reveal => {
                app.reveal_tick();
            }
            LoopEvent::Voice(result) => app.handle_transcription(result),
        }

        if app.should_quit {
            break;
        }
    }

    app.cancel_streaming();
    Ok(())
}

/// Handle input events.
fn handle_input(app: &mut App, event: Event, client: &BackendClient, channels: &Channels) {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
            if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                app.should_quit = true;
                return;
            }
            match app.input_mode {
                InputMode::Normal => handle_normal_mode(app, key, client, channels),
                // Alerts block everything until dismissed.
                InputMode::Alert(_) => {
                    if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                        app.dismiss_alert();
                    }
                }
            }
        }
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::ScrollUp => app.scroll_chat_up(3),
            MouseEventKind::ScrollDown => app.scroll_chat_down(3),
            _ => {}
        },
        _ => {}
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent, client: &BackendClient, channels: &Channels) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
        KeyCode::Esc => {
            if !app.cancel_streaming() {
                app.error_message = None;
            }
        }
        KeyCode::Enter => {
            if let Some(turn) = app.submit_input() {
                stream::spawn_chat(
                    client.clone(),
                    turn.session,
                    turn.query,
                    turn.thread_id.to_string(),
                    turn.cancel,
                    channels.stream_tx.clone(),
                );
            }
        }
        KeyCode::Up if ctrl => app.select_prev_thread(),
        KeyCode::Down if ctrl => app.select_next_thread(),
        KeyCode::Up => app.scroll_chat_up(1),
        KeyCode::Down => app.scroll_chat_down(1),
        KeyCode::PageUp => app.scroll_chat_up(10),
        KeyCode::PageDown => app.scroll_chat_down(10),
        KeyCode::Char('n') if ctrl => {
            app.new_thread();
        }
        KeyCode::Char('r') if ctrl => {
            if let Some(recording) = app.toggle_recording() {
                let client = client.clone();
                let tx = channels.voice_tx.clone();
                tokio::spawn(async move {
                    let result = voice::transcribe(&client, recording)
                        .await
                        .map_err(|e| e.to_string());
                    if tx.send(result).await.is_err() {
                        tracing::debug!("Transcription finished after shutdown");
                    }
                });
            }
        }
        KeyCode::Char('a') if ctrl => app.move_cursor_start(),
        KeyCode::Char('e') if ctrl => app.move_cursor_end(),
        KeyCode::Char('u') if ctrl => app.clear_input(),
        KeyCode::Char('w') if ctrl => app.delete_word(),
        KeyCode::Char(_) if ctrl => {}
        KeyCode::Char(c) => app.insert_char(c),
        KeyCode::Backspace => app.delete_char(),
        KeyCode::Delete => app.delete_char_forward(),
        KeyCode::Left => app.move_cursor_left(),
        KeyCode::Right => app.move_cursor_right(),
        KeyCode::Home => app.move_cursor_start(),
        KeyCode::End => app.move_cursor_end(),
        _ => {}
    }
}
