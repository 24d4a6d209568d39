//! Core types for factory-assist.
//!
//! This crate holds the state that the terminal client manipulates:
//!
//! - **Identifiers**: thread, message, and session IDs
//! - **Conversation model**: threads, messages, and handles to in-progress messages
//! - **Streaming sessions**: the source buffer / displayed prefix pair behind
//!   the typewriter reveal, with its commit and abort rules
//!
//! # Example
//!
//! ```
//! use factory_assist_core::{IdSequence, Role, RevealStep, StreamingSession, ThreadStore};
//!
//! let mut store = ThreadStore::new("New chat");
//! let mut ids = IdSequence::new();
//!
//! store.push(Role::User, "ping");
//! let handle = store.push(Role::Assistant, "");
//! let mut session = StreamingSession::new(ids.next_session(), handle, "ping");
//!
//! session.apply_fragment("pong");
//! session.finish_stream();
//! while session.reveal_step() == RevealStep::Advanced {}
//!
//! let text = session.commit().unwrap();
//! store.set_content(handle, text).unwrap();
//! assert_eq!(store.messages()[1].content, "pong");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod conversation;
pub mod error;
pub mod ids;
pub mod session;

pub use conversation::{
    truncate_chars, ConversationThread, Message, MessageHandle, Role, ThreadStore,
};
pub use error::{CoreError, Result};
pub use ids::{IdError, IdSequence, MessageId, SessionId, ThreadId};
pub use session::{RevealStep, SessionState, StreamingSession};
