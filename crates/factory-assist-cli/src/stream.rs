//! Streaming chat transport.
//!
//! Reads the chunked answer body of `POST /chat`, decodes it as UTF-8
//! incrementally, and forwards text fragments to the UI loop as
//! [`StreamEvent`]s tagged with the session they belong to.
//!
//! Reading stops silently when the session's [`CancellationToken`] fires;
//! dropping the response body closes the connection.

use std::fmt::Display;

use bytes::Bytes;
use factory_assist_core::SessionId;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::BackendClient;

/// Events from a chat stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Decoded text, in arrival order.
    Fragment {
        /// Session the text belongs to.
        session: SessionId,
        /// The text.
        text: String,
    },
    /// The body ended normally.
    Finished {
        /// Session that finished.
        session: SessionId,
    },
    /// The request or the body failed.
    Failed {
        /// Session that failed.
        session: SessionId,
        /// Error description, for the log.
        error: String,
    },
}

impl StreamEvent {
    /// Session the event belongs to.
    #[must_use]
    pub const fn session(&self) -> SessionId {
        match self {
            Self::Fragment { session, .. }
            | Self::Finished { session }
            | Self::Failed { session, .. } => *session,
        }
    }
}

/// Incremental UTF-8 decoder.
///
/// A code point split across chunks is held back until its remaining bytes
/// arrive. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Create an empty decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Decode the next chunk, returning every complete character it finishes.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut start = 0;
        while start < self.pending.len() {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(text) => {
                    out.push_str(text);
                    start = self.pending.len();
                }
                Err(e) => {
                    let valid = start + e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[start..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid + bad;
                        }
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            start = valid;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..start);
        out
    }

    /// Flush at end of input. A dangling partial sequence becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }
}

/// Forward a byte stream to `tx` as fragments until it ends, fails, or is cancelled.
///
/// Cancellation produces no event.
pub async fn read_stream<S, E>(
    session: SessionId,
    body: S,
    cancel: CancellationToken,
    tx: mpsc::Sender<StreamEvent>,
) where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = Utf8Decoder::new();

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(%session, "Stream cancelled");
                return;
            }
            item = body.next() => item,
        };

        let event = match next {
            Some(Ok(chunk)) => {
                let text = decoder.decode(&chunk);
                if text.is_empty() {
                    continue;
                }
                StreamEvent::Fragment { session, text }
            }
            Some(Err(e)) => {
                tracing::warn!(%session, error = %e, "Stream read failed");
                let _ = tx
                    .send(StreamEvent::Failed {
                        session,
                        error: e.to_string(),
                    })
                    .await;
                return;
            }
            None => {
                let tail = decoder.finish();
                if !tail.is_empty() {
                    let _ = tx.send(StreamEvent::Fragment { session, text: tail }).await;
                }
                tracing::debug!(%session, "Stream finished");
                let _ = tx.send(StreamEvent::Finished { session }).await;
                return;
            }
        };

        if tx.send(event).await.is_err() {
            return;
        }
    }
}

/// Spawn a task that sends `query` to the backend and streams the answer.
///
/// The task ends on its own once the body ends or `cancel` fires.
pub fn spawn_chat(
    client: BackendClient,
    session: SessionId,
    query: String,
    thread_id: String,
    cancel: CancellationToken,
    tx: mpsc::Sender<StreamEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(%session, "Request cancelled before response");
                return;
            }
            result = client.open_chat(&query, &thread_id) => result,
        };

        match opened {
            Ok(response) => read_stream(session, response.bytes_stream(), cancel, tx).await,
            Err(e) => {
                tracing::warn!(%session, error = %e, "Chat request failed");
                let _ = tx
                    .send(StreamEvent::Failed {
                        session,
                        error: e.to_string(),
                    })
                    .await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::io;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chunks(parts: Vec<&'static [u8]>) -> impl Stream<Item = Result<Bytes, io::Error>> {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p))))
    }

    fn collect(rx: &mut mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn decoder_passes_ascii_through() {
        let mut d = Utf8Decoder::new();
        assert_eq!(d.decode(b"pong"), "pong");
        assert_eq!(d.finish(), "");
    }

    #[test]
    fn decoder_holds_back_split_code_point() {
        // "急" is E6 80 A5
        let mut d = Utf8Decoder::new();
        assert_eq!(d.decode(&[b'a', 0xE6]), "a");
        assert_eq!(d.decode(&[0x80]), "");
        assert_eq!(d.decode(&[0xA5, b'b']), "急b");
        assert_eq!(d.finish(), "");
    }

    #[test]
    fn decoder_replaces_invalid_bytes() {
        let mut d = Utf8Decoder::new();
        assert_eq!(d.decode(&[b'a', 0xFF, b'b']), "a\u{FFFD}b");
    }

    #[test]
    fn decoder_flushes_dangling_partial_as_replacement() {
        let mut d = Utf8Decoder::new();
        assert_eq!(d.decode(&[0xE6, 0x80]), "");
        assert_eq!(d.finish(), "\u{FFFD}");
        assert_eq!(d.finish(), "");
    }

    #[tokio::test]
    async fn read_stream_emits_fragments_then_finished() {
        let (tx, mut rx) = mpsc::channel(16);
        let session = SessionId::new(7);
        let body = chunks(vec![b"p".as_slice(), b"on".as_slice(), &[0xE6, 0x80], &[0xA5]]);

        read_stream(session, body, CancellationToken::new(), tx).await;

        let events = collect(&mut rx);
        assert_eq!(
            events,
            vec![
                StreamEvent::Fragment { session, text: "p".into() },
                StreamEvent::Fragment { session, text: "on".into() },
                StreamEvent::Fragment { session, text: "急".into() },
                StreamEvent::Finished { session },
            ]
        );
    }

    #[tokio::test]
    async fn read_stream_reports_body_error() {
        let (tx, mut rx) = mpsc::channel(16);
        let session = SessionId::new(1);
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ]);

        read_stream(session, body, CancellationToken::new(), tx).await;

        let events = collect(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], StreamEvent::Failed { error, .. } if error.contains("reset")));
    }

    #[tokio::test]
    async fn cancelled_stream_is_silent() {
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let body = stream::pending::<Result<Bytes, io::Error>>();

        read_stream(SessionId::new(1), body, cancel, tx).await;

        assert!(collect(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn spawn_chat_streams_backend_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::channel(16);
        let session = SessionId::new(3);
        let client = BackendClient::new(server.uri());
        spawn_chat(
            client,
            session,
            "ping".into(),
            "t-1".into(),
            CancellationToken::new(),
            tx,
        )
        .await
        .unwrap();

        let mut text = String::new();
        let mut finished = false;
        for event in collect(&mut rx) {
            match event {
                StreamEvent::Fragment { text: t, .. } => text.push_str(&t),
                StreamEvent::Finished { .. } => finished = true,
                StreamEvent::Failed { error, .. } => panic!("unexpected failure: {error}"),
            }
        }
        assert_eq!(text, "pong");
        assert!(finished);
    }

    #[tokio::test]
    async fn spawn_chat_reports_unreachable_backend() {
        let (tx, mut rx) = mpsc::channel(16);
        let session = SessionId::new(4);
        let client = BackendClient::new("http://127.0.0.1:9");
        spawn_chat(
            client,
            session,
            "ping".into(),
            "t-1".into(),
            CancellationToken::new(),
            tx,
        )
        .await
        .unwrap();

        let events = collect(&mut rx);
        assert!(matches!(events.as_slice(), [StreamEvent::Failed { session: s, .. }] if *s == session));
    }
}
