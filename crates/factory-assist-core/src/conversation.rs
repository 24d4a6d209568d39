//! Conversation threads and their message histories.
//!
//! A [`ThreadStore`] owns every thread plus the working message list of the
//! active one. The working list is written back into its thread whenever the
//! active thread changes, so each thread keeps an independent history.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::ids::{IdSequence, MessageId, ThreadId};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The person typing into the client.
    User,
    /// The backend assistant.
    Assistant,
}

impl Role {
    /// Label shown next to each message.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::User => "You",
            Self::Assistant => "Assistant",
        }
    }
}

/// One entry in a thread's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Stable identifier within the store.
    pub id: MessageId,
    /// Author of the message.
    pub role: Role,
    /// Markdown content.
    pub content: String,
}

impl Message {
    /// Check if this is a user message.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Points at the assistant message a streaming session writes into.
///
/// Resolved by ID, so the handle stays valid if messages are appended or the
/// owning thread stops being the active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle {
    /// Thread that owns the message.
    pub thread_id: ThreadId,
    /// The message itself.
    pub message_id: MessageId,
}

/// A persisted conversation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationThread {
    /// Identifier shared with the backend.
    pub id: ThreadId,
    /// Human-readable label, replaced by the first query of the thread.
    pub title: String,
    /// Committed history. Stale while the thread is active; see [`ThreadStore`].
    pub history: Vec<Message>,
}

impl ConversationThread {
    fn new(title: impl Into<String>) -> Self {
        Self {
            id: ThreadId::generate(),
            title: title.into(),
            history: Vec::new(),
        }
    }

    /// Title cut down to at most `max_chars` visible characters.
    ///
    /// Only the rendering is shortened; the stored title keeps the full text.
    #[must_use]
    pub fn display_title(&self, max_chars: usize) -> String {
        truncate_chars(&self.title, max_chars)
    }
}

/// Shorten `text` to `max_chars` characters, marking the cut with an ellipsis.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}

/// All threads of one assistant, with exactly one active at a time.
#[derive(Debug)]
pub struct ThreadStore {
    /// Newest first.
    threads: Vec<ConversationThread>,
    active: ThreadId,
    /// Working copy of the active thread's history.
    messages: Vec<Message>,
    default_title: String,
    ids: IdSequence,
}

impl ThreadStore {
    /// Create a store holding a single empty thread with the placeholder title.
    #[must_use]
    pub fn new(default_title: impl Into<String>) -> Self {
        let default_title = default_title.into();
        let first = ConversationThread::new(default_title.clone());
        let active = first.id;
        Self {
            threads: vec![first],
            active,
            messages: Vec::new(),
            default_title,
            ids: IdSequence::new(),
        }
    }

    /// Placeholder title given to fresh threads.
    #[must_use]
    pub fn default_title(&self) -> &str {
        &self.default_title
    }

    /// All threads, newest first.
    #[must_use]
    pub fn threads(&self) -> &[ConversationThread] {
        &self.threads
    }

    /// ID of the active thread.
    #[must_use]
    pub fn active_id(&self) -> ThreadId {
        self.active
    }

    /// The active thread's record (its `history` may lag behind [`Self::messages`]).
    #[must_use]
    pub fn active(&self) -> Option<&ConversationThread> {
        self.thread(self.active)
    }

    /// Look up a thread by ID.
    #[must_use]
    pub fn thread(&self, id: ThreadId) -> Option<&ConversationThread> {
        self.threads.iter().find(|t| t.id == id)
    }

    /// Position of the active thread in [`Self::threads`].
    #[must_use]
    pub fn active_index(&self) -> Option<usize> {
        self.threads.iter().position(|t| t.id == self.active)
    }

    /// Messages of the active thread.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Write the working message list back into the active thread.
    pub fn persist_active(&mut self) {
        let active = self.active;
        if let Some(thread) = self.threads.iter_mut().find(|t| t.id == active) {
            thread.history.clone_from(&self.messages);
        }
    }

    /// Start a new, empty thread and make it active.
    pub fn create(&mut self) -> ThreadId {
        self.persist_active();
        let thread = ConversationThread::new(self.default_title.clone());
        let id = thread.id;
        self.threads.insert(0, thread);
        self.active = id;
        self.messages.clear();
        tracing::debug!(thread_id = %id, "Created thread");
        id
    }

    /// Make `id` the active thread.
    ///
    /// # Errors
    ///
    /// Returns `ThreadNotFound` if no such thread exists; the active thread is
    /// left untouched in that case.
    pub fn switch(&mut self, id: ThreadId) -> Result<()> {
        let history = self
            .thread(id)
            .map(|t| t.history.clone())
            .ok_or(CoreError::ThreadNotFound(id))?;
        if id == self.active {
            return Ok(());
        }
        self.persist_active();
        self.active = id;
        self.messages = history;
        tracing::debug!(thread_id = %id, messages = self.messages.len(), "Switched thread");
        Ok(())
    }

    /// Append a message to the active thread.
    pub fn push(&mut self, role: Role, content: impl Into<String>) -> MessageHandle {
        let id = self.ids.next_message();
        self.messages.push(Message {
            id,
            role,
            content: content.into(),
        });
        MessageHandle {
            thread_id: self.active,
            message_id: id,
        }
    }

    /// Resolve a handle to its message, wherever the owning thread currently lives.
    ///
    /// # Errors
    ///
    /// Returns `ThreadNotFound` or `MessageNotFound` when the handle is stale.
    pub fn message(&self, handle: MessageHandle) -> Result<&Message> {
        let list = if handle.thread_id == self.active {
            &self.messages
        } else {
            &self
                .thread(handle.thread_id)
                .ok_or(CoreError::ThreadNotFound(handle.thread_id))?
                .history
        };
        list.iter()
            .find(|m| m.id == handle.message_id)
            .ok_or(CoreError::MessageNotFound(handle.message_id))
    }

    /// Replace the content of the message behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns `ThreadNotFound` or `MessageNotFound` when the handle is stale.
    pub fn set_content(&mut self, handle: MessageHandle, content: String) -> Result<()> {
        let list = if handle.thread_id == self.active {
            &mut self.messages
        } else {
            &mut self
                .threads
                .iter_mut()
                .find(|t| t.id == handle.thread_id)
                .ok_or(CoreError::ThreadNotFound(handle.thread_id))?
                .history
        };
        let message = list
            .iter_mut()
            .find(|m| m.id == handle.message_id)
            .ok_or(CoreError::MessageNotFound(handle.message_id))?;
        message.content = content;
        Ok(())
    }

    /// Replace the thread's title if it still carries the placeholder.
    ///
    /// Returns `true` when the title changed.
    pub fn set_title_if_default(&mut self, id: ThreadId, title: &str) -> bool {
        let default = self.default_title.as_str();
        match self.threads.iter_mut().find(|t| t.id == id) {
            Some(thread) if thread.title == default && !title.trim().is_empty() => {
                thread.title = title.to_string();
                true
            }
            _ => false,
        }
    }
}
