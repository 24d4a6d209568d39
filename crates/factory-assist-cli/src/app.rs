//! Application state.
//!
//! [`App`] is the single owner of everything the chat view shows: threads,
//! the input line, the streaming turn in flight, the reveal timer, and voice
//! capture. The event loop in `main.rs` feeds it terminal keys, stream events,
//! reveal ticks and transcription results; `ui.rs` renders it.

use factory_assist_core::{
    ConversationThread, CoreError, IdSequence, Message, MessageHandle, RevealStep, Role,
    SessionId, StreamingSession, ThreadId, ThreadStore,
};
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, AssistantMode};
use crate::reveal::RevealScheduler;
use crate::stream::StreamEvent;
use crate::voice::{Recording, VoiceRecorder};

/// Notice appended to the answer when the backend cannot be reached.
pub const CONNECTION_FAILED_NOTICE: &str =
    "\n\n⚠️ Failed to reach the server, please check the backend.";

/// Input mode for special operations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InputMode {
    /// Normal operation mode.
    #[default]
    Normal,
    /// A blocking alert is shown until dismissed.
    Alert(String),
}

/// Microphone state.
#[derive(Debug, Default)]
pub enum VoiceState {
    /// Not recording.
    #[default]
    Idle,
    /// Capturing audio.
    Recording(Recording),
    /// Audio is being transcribed.
    Processing,
}

/// A request the event loop must start for a freshly sent message.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// Session that owns the answer.
    pub session: SessionId,
    /// Query as sent on the wire.
    pub query: String,
    /// Thread the backend keys its memory on.
    pub thread_id: ThreadId,
    /// Fires when the session is aborted.
    pub cancel: CancellationToken,
}

/// The session currently streaming, with the handle that stops its reader.
#[derive(Debug)]
struct ActiveTurn {
    session: StreamingSession,
    cancel: CancellationToken,
}

/// Application state.
#[derive(Debug)]
pub struct App {
    /// Assistant the view talks as.
    pub mode: AssistantMode,
    /// Backend URL, for display.
    backend_url: String,
    /// Visible characters of a thread title in the list.
    pub title_display_chars: usize,
    /// Threads and the active history.
    store: ThreadStore,
    /// Source of session IDs.
    ids: IdSequence,
    /// Current input buffer.
    pub input: String,
    /// Cursor position in input, in characters.
    pub cursor_position: usize,
    /// Current input mode.
    pub input_mode: InputMode,
    /// Chat scroll position (lines from the bottom).
    pub chat_scroll: usize,
    /// Status message to display.
    pub status_message: Option<String>,
    /// Error message to display.
    pub error_message: Option<String>,
    /// Whether the app should quit.
    pub should_quit: bool,
    /// Animation frame counter for loading indicators.
    pub animation_frame: usize,

    // =========================================================================
    // Streaming State
    // =========================================================================
    /// Turn in flight, if any.
    turn: Option<ActiveTurn>,
    /// Timer for the next reveal step.
    reveal: RevealScheduler,

    // =========================================================================
    // Voice State
    // =========================================================================
    recorder: VoiceRecorder,
    voice: VoiceState,
}

impl App {
    /// Create a new application with one empty thread.
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        Self {
            mode: config.mode,
            backend_url: config.base_url.clone(),
            title_display_chars: config.title_display_chars,
            store: ThreadStore::new(config.mode.default_title()),
            ids: IdSequence::new(),
            input: String::new(),
            cursor_position: 0,
            input_mode: InputMode::Normal,
            chat_scroll: 0,
            status_message: None,
            error_message: None,
            should_quit: false,
            animation_frame: 0,
            turn: None,
            reveal: RevealScheduler::new(config.reveal_interval()),
            recorder: VoiceRecorder::new(config.recorder.clone()),
            voice: VoiceState::Idle,
        }
    }

    /// Tick the animation frame (call on each render).
    pub fn tick_animation(&mut self) {
        self.animation_frame = self.animation_frame.wrapping_add(1);
    }

    /// Get current spinner character for loading animation.
    #[must_use]
    pub fn spinner_char(&self) -> &'static str {
        const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
        SPINNER[self.animation_frame % SPINNER.len()]
    }

    /// Get the backend URL for display.
    #[must_use]
    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }

    /// Set the status message (also clears any error).
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.error_message = None;
    }

    /// Set the error message.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    /// Show a blocking alert.
    pub fn alert(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%message, "Alert raised");
        self.input_mode = InputMode::Alert(message);
    }

    /// Dismiss the alert, if one is shown.
    pub fn dismiss_alert(&mut self) {
        self.input_mode = InputMode::Normal;
    }

    // =========================================================================
    // Threads
    // =========================================================================

    /// All threads, newest first.
    #[must_use]
    pub fn threads(&self) -> &[ConversationThread] {
        self.store.threads()
    }

    /// The active thread's ID.
    #[must_use]
    pub fn active_thread(&self) -> ThreadId {
        self.store.active_id()
    }

    /// Messages of the active thread.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    /// Start a fresh thread, abandoning any answer in flight.
    pub fn new_thread(&mut self) -> ThreadId {
        self.abort_turn();
        let id = self.store.create();
        self.chat_scroll = 0;
        self.set_status("New conversation");
        id
    }

    /// Make `id` the active thread, abandoning any answer in flight.
    ///
    /// # Errors
    ///
    /// Returns `ThreadNotFound` for an unknown thread; nothing changes then.
    pub fn switch_thread(&mut self, id: ThreadId) -> Result<(), CoreError> {
        if self.store.thread(id).is_none() {
            return Err(CoreError::ThreadNotFound(id));
        }
        if id == self.store.active_id() {
            return Ok(());
        }
        self.abort_turn();
        self.store.switch(id)?;
        self.chat_scroll = 0;
        Ok(())
    }

    /// Switch to the thread above the active one in the list.
    pub fn select_prev_thread(&mut self) {
        self.step_thread(-1);
    }

    /// Switch to the thread below the active one in the list.
    pub fn select_next_thread(&mut self) {
        self.step_thread(1);
    }

    fn step_thread(&mut self, delta: isize) {
        let threads = self.store.threads();
        let Some(current) = self.store.active_index() else {
            return;
        };
        let Some(target) = current
            .checked_add_signed(delta)
            .and_then(|i| threads.get(i))
            .map(|t| t.id)
        else {
            return;
        };
        if let Err(e) = self.switch_thread(target) {
            self.set_error(e.to_string());
        }
    }

    // =========================================================================
    // Streaming Turn
    // =========================================================================

    /// Whether an answer is in flight.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.turn.is_some()
    }

    /// Send the current input line.
    pub fn submit_input(&mut self) -> Option<TurnRequest> {
        let text = self.input.clone();
        let request = self.send(&text)?;
        self.clear_input();
        Some(request)
    }

    /// Start a new exchange with `text`.
    ///
    /// Whitespace-only input is ignored. Any answer still in flight is
    /// abandoned first. The caller spawns the returned request.
    pub fn send(&mut self, text: &str) -> Option<TurnRequest> {
        let query = text.trim();
        if query.is_empty() {
            return None;
        }

        self.abort_turn();
        self.store.push(Role::User, query);
        let handle = self.store.push(Role::Assistant, "");
        let session = self.ids.next_session();
        let cancel = CancellationToken::new();

        tracing::info!(%session, thread_id = %handle.thread_id, "Sending message");
        self.turn = Some(ActiveTurn {
            session: StreamingSession::new(session, handle, query),
            cancel: cancel.clone(),
        });
        self.chat_scroll = 0;
        self.set_status("Waiting for answer... (Esc to stop)");

        Some(TurnRequest {
            session,
            query: self.mode.wire_query(query),
            thread_id: handle.thread_id,
            cancel,
        })
    }

    /// Stop the answer in flight.
    ///
    /// Returns `true` if there was one.
    pub fn cancel_streaming(&mut self) -> bool {
        let cancelled = self.abort_turn();
        if cancelled {
            self.set_status("Stopped");
        }
        cancelled
    }

    /// Abort the current session, freezing its message at what was shown.
    fn abort_turn(&mut self) -> bool {
        let Some(mut turn) = self.turn.take() else {
            return false;
        };
        turn.cancel.cancel();
        self.reveal.cancel();

        let handle = turn.session.handle();
        if let Some(shown) = turn.session.abort() {
            tracing::info!(session = %turn.session.id(), kept = shown.len(), "Session aborted");
            self.write_message(handle, shown);
        }
        true
    }

    /// Apply an event from a stream reader.
    ///
    /// Events from any session other than the current one are dropped.
    /// Returns `true` if the UI should be redrawn.
    pub fn handle_stream_event(&mut self, event: StreamEvent) -> bool {
        let Some(turn) = self.turn.as_mut() else {
            tracing::debug!(session = %event.session(), "Dropping event with no active session");
            return false;
        };
        if turn.session.id() != event.session() {
            tracing::debug!(
                session = %event.session(),
                active = %turn.session.id(),
                "Dropping event from superseded session"
            );
            return false;
        }

        let applied = match event {
            StreamEvent::Fragment { text, .. } => turn.session.apply_fragment(&text),
            StreamEvent::Finished { .. } => turn.session.finish_stream(),
            StreamEvent::Failed { error, .. } => {
                tracing::warn!(session = %turn.session.id(), %error, "Answer stream failed");
                turn.session.fail_stream(CONNECTION_FAILED_NOTICE)
            }
        };
        if applied {
            self.reveal.schedule();
        }
        applied
    }

    /// Wait for the next reveal step to be due.
    pub async fn reveal_due(&mut self) {
        self.reveal.wait().await;
    }

    /// Run one reveal step.
    ///
    /// Returns `true` if the UI should be redrawn.
    pub fn reveal_tick(&mut self) -> bool {
        let Some(turn) = self.turn.as_mut() else {
            return false;
        };
        match turn.session.reveal_step() {
            RevealStep::Advanced => {
                self.reveal.schedule();
                true
            }
            RevealStep::ReadyToCommit => self.commit_turn(),
            // Resumes when the next fragment arrives.
            RevealStep::Waiting | RevealStep::Idle => false,
        }
    }

    /// Write the finished answer into its thread and retire the session.
    ///
    /// Returns `false` if the answer is not yet complete and fully shown.
    pub fn commit_turn(&mut self) -> bool {
        let Some(mut turn) = self.turn.take() else {
            return false;
        };
        let Some(text) = turn.session.commit() else {
            self.turn = Some(turn);
            return false;
        };
        self.reveal.cancel();

        let handle = turn.session.handle();
        tracing::info!(session = %turn.session.id(), chars = text.chars().count(), "Answer committed");
        self.write_message(handle, text);
        if self.store.set_title_if_default(handle.thread_id, turn.session.query()) {
            tracing::debug!(thread_id = %handle.thread_id, "Thread titled from first query");
        }
        self.set_status("Ready");
        true
    }

    fn write_message(&mut self, handle: MessageHandle, content: String) {
        if let Err(e) = self.store.set_content(handle, content) {
            tracing::warn!(error = %e, "In-progress message vanished");
        }
    }

    /// Text to render for `message`: the revealed prefix while it streams.
    #[must_use]
    pub fn displayed_content<'a>(&'a self, message: &'a Message) -> &'a str {
        match &self.turn {
            Some(turn)
                if turn.session.handle().message_id == message.id
                    && turn.session.handle().thread_id == self.store.active_id() =>
            {
                turn.session.displayed()
            }
            _ => &message.content,
        }
    }

    /// Whether `message` is the one currently streaming.
    #[must_use]
    pub fn is_in_progress(&self, message: &Message) -> bool {
        self.turn
            .as_ref()
            .is_some_and(|t| t.session.handle().message_id == message.id)
    }

    // =========================================================================
    // Voice Input
    // =========================================================================

    /// Current microphone state.
    #[must_use]
    pub const fn voice(&self) -> &VoiceState {
        &self.voice
    }

    /// Start or stop recording.
    ///
    /// Returns the finished recording when one was stopped; the caller
    /// uploads it and reports back through [`Self::handle_transcription`].
    pub fn toggle_recording(&mut self) -> Option<Recording> {
        match self.voice {
            VoiceState::Idle => {
                self.start_recording();
                None
            }
            VoiceState::Recording(_) => self.stop_recording(),
            VoiceState::Processing => None,
        }
    }

    /// Acquire the microphone. Failure raises an alert.
    pub fn start_recording(&mut self) -> bool {
        if !matches!(self.voice, VoiceState::Idle) {
            return false;
        }
        match self.recorder.start() {
            Ok(recording) => {
                self.voice = VoiceState::Recording(recording);
                self.set_status("Recording... (Ctrl+R to stop)");
                true
            }
            Err(e) => {
                self.alert(format!("Cannot access the microphone: {e}"));
                false
            }
        }
    }

    /// Stop capturing and hand the recording over for transcription.
    pub fn stop_recording(&mut self) -> Option<Recording> {
        match std::mem::replace(&mut self.voice, VoiceState::Processing) {
            VoiceState::Recording(recording) => {
                self.set_status("Recognising speech...");
                Some(recording)
            }
            other => {
                self.voice = other;
                None
            }
        }
    }

    /// Apply a transcription result.
    ///
    /// Success appends the text to the input; failure raises an alert and
    /// leaves the input as it was.
    pub fn handle_transcription(&mut self, result: Result<String, String>) {
        self.voice = VoiceState::Idle;
        match result {
            Ok(text) if text.is_empty() => self.set_status("No speech recognised"),
            Ok(text) => {
                self.input.push_str(&text);
                self.move_cursor_end();
                self.set_status("Speech recognised");
            }
            Err(e) => self.alert(format!("Voice recognition failed: {e}")),
        }
    }

    // =========================================================================
    // Chat Scrolling
    // =========================================================================

    /// Scroll chat up (view older messages).
    pub fn scroll_chat_up(&mut self, amount: usize) {
        self.chat_scroll = self.chat_scroll.saturating_add(amount);
    }

    /// Scroll chat down (view newer messages).
    pub fn scroll_chat_down(&mut self, amount: usize) {
        self.chat_scroll = self.chat_scroll.saturating_sub(amount);
    }

    // =========================================================================
    // Input Handling
    // =========================================================================

    fn byte_index(&self, char_pos: usize) -> usize {
        self.input
            .char_indices()
            .nth(char_pos)
            .map_or(self.input.len(), |(i, _)| i)
    }

    fn input_chars(&self) -> usize {
        self.input.chars().count()
    }

    /// Insert a character at the cursor position.
    pub fn insert_char(&mut self, c: char) {
        let at = self.byte_index(self.cursor_position);
        self.input.insert(at, c);
        self.cursor_position += 1;
    }

    /// Delete the character before the cursor.
    pub fn delete_char(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
            let at = self.byte_index(self.cursor_position);
            self.input.remove(at);
        }
    }

    /// Delete the character at the cursor.
    pub fn delete_char_forward(&mut self) {
        if self.cursor_position < self.input_chars() {
            let at = self.byte_index(self.cursor_position);
            self.input.remove(at);
        }
    }

    /// Delete the word before the cursor.
    pub fn delete_word(&mut self) {
        while self.cursor_position > 0 {
            self.delete_char();
            let prev = self.input.chars().nth(self.cursor_position.wrapping_sub(1));
            if self.cursor_position == 0 || prev == Some(' ') {
                break;
            }
        }
    }

    /// Move cursor left.
    pub fn move_cursor_left(&mut self) {
        self.cursor_position = self.cursor_position.saturating_sub(1);
    }

    /// Move cursor right.
    pub fn move_cursor_right(&mut self) {
        if self.cursor_position < self.input_chars() {
            self.cursor_position += 1;
        }
    }

    /// Move cursor to the start.
    pub fn move_cursor_start(&mut self) {
        self.cursor_position = 0;
    }

    /// Move cursor to the end.
    pub fn move_cursor_end(&mut self) {
        self.cursor_position = self.input_chars();
    }

    /// Clear the input.
    pub fn clear_input(&mut self) {
        self.input.clear();
        self.cursor_position = 0;
    }
}
