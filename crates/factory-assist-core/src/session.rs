//! Streaming session state.
//!
//! A [`StreamingSession`] tracks one request/response exchange: the source
//! buffer assembled from network fragments and the displayed prefix that the
//! reveal scheduler advances one character at a time.
//!
//! ```text
//! Requesting --fragment/finish--> Streaming --caught up + complete--> Committed
//!      \__________________________/ \
//!                 abort               abort --> Aborted
//! ```
//!
//! ## Invariants
//!
//! - `displayed_len <= source.len()`, and `displayed_len` sits on a char boundary.
//! - `source` is append-only until the session reaches a terminal state.
//! - Once Committed or Aborted, no operation mutates the session.

use crate::conversation::MessageHandle;
use crate::ids::SessionId;

/// Lifecycle of a streaming session. "Idle" is the absence of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Request sent, nothing received yet.
    Requesting,
    /// Receiving and/or revealing the answer.
    Streaming,
    /// Final text written into the thread history.
    Committed,
    /// Cancelled or superseded.
    Aborted,
}

impl SessionState {
    /// Whether the session has finished, one way or the other.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

/// Result of one reveal step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealStep {
    /// One more character became visible.
    Advanced,
    /// Everything received so far is visible; the stream is still open.
    Waiting,
    /// Everything is visible and the stream is done.
    ReadyToCommit,
    /// The session is terminal; nothing happened.
    Idle,
}

/// One request/response exchange.
#[derive(Debug)]
pub struct StreamingSession {
    id: SessionId,
    handle: MessageHandle,
    query: String,
    state: SessionState,
    source: String,
    displayed_len: usize,
    stream_complete: bool,
}

impl StreamingSession {
    /// Start a session writing into the assistant message behind `handle`.
    ///
    /// `query` is the user's text for this exchange, kept for titling.
    #[must_use]
    pub fn new(id: SessionId, handle: MessageHandle, query: impl Into<String>) -> Self {
        Self {
            id,
            handle,
            query: query.into(),
            state: SessionState::Requesting,
            source: String::new(),
            displayed_len: 0,
            stream_complete: false,
        }
    }

    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// The in-progress assistant message.
    #[must_use]
    pub const fn handle(&self) -> MessageHandle {
        self.handle
    }

    /// The user's query for this exchange.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Full text received so far.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The part of the source currently shown.
    #[must_use]
    pub fn displayed(&self) -> &str {
        &self.source[..self.displayed_len]
    }

    /// Whether the transport reported the end of the body.
    #[must_use]
    pub const fn is_stream_complete(&self) -> bool {
        self.stream_complete
    }

    /// Whether the displayed prefix covers the whole source.
    #[must_use]
    pub fn is_caught_up(&self) -> bool {
        self.displayed_len == self.source.len()
    }

    /// Append a decoded fragment.
    ///
    /// Returns `false` (and changes nothing) once the session is terminal.
    pub fn apply_fragment(&mut self, text: &str) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.source.push_str(text);
        self.state = SessionState::Streaming;
        true
    }

    /// Record that the body ended normally.
    ///
    /// Returns `false` once the session is terminal.
    pub fn finish_stream(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.stream_complete = true;
        self.state = SessionState::Streaming;
        true
    }

    /// Append a transport failure notice and treat the body as ended.
    ///
    /// The notice is revealed and committed like the rest of the answer.
    pub fn fail_stream(&mut self, notice: &str) -> bool {
        self.apply_fragment(notice) && self.finish_stream()
    }

    /// Advance the displayed prefix by one character.
    pub fn reveal_step(&mut self) -> RevealStep {
        if self.state.is_terminal() {
            return RevealStep::Idle;
        }
        match self.source[self.displayed_len..].chars().next() {
            Some(c) => {
                self.displayed_len += c.len_utf8();
                RevealStep::Advanced
            }
            None if self.stream_complete => RevealStep::ReadyToCommit,
            None => RevealStep::Waiting,
        }
    }

    /// Finalize the session, returning the text to store in the history.
    ///
    /// Only succeeds once the stream is complete and fully revealed; the
    /// transient buffers are cleared afterwards.
    pub fn commit(&mut self) -> Option<String> {
        if self.state != SessionState::Streaming || !self.stream_complete || !self.is_caught_up() {
            return None;
        }
        self.state = SessionState::Committed;
        self.displayed_len = 0;
        Some(std::mem::take(&mut self.source))
    }

    /// Abandon the session, returning what the viewer had seen so far.
    ///
    /// Returns `None` if the session was already terminal.
    pub fn abort(&mut self) -> Option<String> {
        if self.state.is_terminal() {
            return None;
        }
        self.state = SessionState::Aborted;
        self.source.truncate(self.displayed_len);
        self.displayed_len = 0;
        Some(std::mem::take(&mut self.source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Role, ThreadStore};

    fn session() -> StreamingSession {
        let mut store = ThreadStore::new("New chat");
        let handle = store.push(Role::Assistant, "");
        StreamingSession::new(SessionId::new(1), handle, "ping")
    }

    fn reveal_all(s: &mut StreamingSession) -> usize {
        let mut steps = 0;
        while s.reveal_step() == RevealStep::Advanced {
            steps += 1;
            assert!(s.displayed().len() <= s.source().len());
        }
        steps
    }

    #[test]
    fn fragments_concatenate_in_arrival_order() {
        let mut s = session();
        for part in ["p", "on", "g"] {
            assert!(s.apply_fragment(part));
        }
        assert_eq!(s.source(), "pong");
        assert_eq!(s.state(), SessionState::Streaming);
    }

    #[test]
    fn ping_pong_commits_full_text() {
        let mut s = session();
        s.apply_fragment("p");
        assert_eq!(s.reveal_step(), RevealStep::Advanced);
        assert_eq!(s.reveal_step(), RevealStep::Waiting);
        s.apply_fragment("on");
        s.apply_fragment("g");
        s.finish_stream();

        assert_eq!(reveal_all(&mut s), 3);
        assert_eq!(s.displayed(), "pong");
        assert_eq!(s.reveal_step(), RevealStep::ReadyToCommit);
        assert_eq!(s.commit().as_deref(), Some("pong"));
        assert_eq!(s.state(), SessionState::Committed);
    }

    #[test]
    fn reveal_moves_one_char_at_a_time_over_multibyte_text() {
        let mut s = session();
        s.apply_fragment("急停");
        assert_eq!(s.reveal_step(), RevealStep::Advanced);
        assert_eq!(s.displayed(), "急");
        assert_eq!(s.reveal_step(), RevealStep::Advanced);
        assert_eq!(s.displayed(), "急停");
    }

    #[test]
    fn commit_refused_until_caught_up_and_complete() {
        let mut s = session();
        s.apply_fragment("ab");
        s.finish_stream();
        assert_eq!(s.commit(), None);
        s.reveal_step();
        s.reveal_step();
        assert_eq!(s.commit().as_deref(), Some("ab"));
    }

    #[test]
    fn commit_refused_while_stream_open() {
        let mut s = session();
        s.apply_fragment("a");
        s.reveal_step();
        assert_eq!(s.commit(), None);
    }

    #[test]
    fn empty_response_commits_empty_text() {
        let mut s = session();
        s.finish_stream();
        assert_eq!(s.reveal_step(), RevealStep::ReadyToCommit);
        assert_eq!(s.commit().as_deref(), Some(""));
    }

    #[test]
    fn reveal_after_commit_is_a_no_op() {
        let mut s = session();
        s.apply_fragment("x");
        s.finish_stream();
        reveal_all(&mut s);
        s.commit();
        assert_eq!(s.reveal_step(), RevealStep::Idle);
        assert_eq!(s.reveal_step(), RevealStep::Idle);
        assert_eq!(s.commit(), None);
    }

    #[test]
    fn aborted_session_rejects_later_fragments() {
        let mut s = session();
        s.apply_fragment("par");
        s.reveal_step();
        assert_eq!(s.abort().as_deref(), Some("p"));
        assert!(!s.apply_fragment("tial"));
        assert!(!s.finish_stream());
        assert_eq!(s.source(), "");
        assert_eq!(s.reveal_step(), RevealStep::Idle);
        assert_eq!(s.abort(), None);
    }

    #[test]
    fn abort_before_any_fragment_leaves_empty_text() {
        let mut s = session();
        assert_eq!(s.abort().as_deref(), Some(""));
        assert_eq!(s.state(), SessionState::Aborted);
    }

    #[test]
    fn failure_notice_is_revealed_then_committed() {
        let mut s = session();
        s.apply_fragment("partial");
        assert!(s.fail_stream("\n\n⚠️ failed"));
        reveal_all(&mut s);
        assert_eq!(s.commit().as_deref(), Some("partial\n\n⚠️ failed"));
    }
}
