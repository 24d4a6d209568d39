//! Request and response types for the assistant backend.
//!
//! These types mirror the JSON bodies of the backend's chat, voice,
//! knowledge-base, admin, and lifecycle endpoints.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

// =============================================================================
// Chat
// =============================================================================

/// Body of `POST /chat`. The response is a chunked Markdown text stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's query (with any mode prefix already applied).
    pub query: String,
    /// Conversation identifier the backend keys its memory on.
    pub thread_id: String,
}

// =============================================================================
// Voice
// =============================================================================

/// Response of `POST /voice`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcription {
    /// Recognised text; absent or empty when nothing was understood.
    #[serde(default)]
    pub text: String,
}

// =============================================================================
// Knowledge Base
// =============================================================================

/// One document in the knowledge base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeFile {
    /// File name as uploaded.
    pub name: String,
    /// Number of indexed chunks generated from it.
    #[serde(default)]
    pub chunks: u64,
}

/// Response of `POST /knowledge/upload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// Human-readable status from the backend.
    #[serde(default)]
    pub message: String,
    /// Stored file name.
    #[serde(default)]
    pub filename: String,
    /// Number of indexing chunks generated.
    pub chunks: u64,
}

// =============================================================================
// Pending Questions
// =============================================================================

/// A question the assistant could not answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnansweredQuestion {
    /// Original user query.
    pub query: String,
    /// Why it was recorded (e.g. no matching knowledge).
    #[serde(default)]
    pub reason: String,
    /// When it was asked, as sent by the backend.
    #[serde(default)]
    pub timestamp: String,
}

impl UnansweredQuestion {
    /// Timestamp formatted for display, or the raw value if it does not parse.
    #[must_use]
    pub fn display_timestamp(&self) -> String {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&self.timestamp) {
            return dt.format("%Y-%m-%d %H:%M").to_string();
        }
        for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(&self.timestamp, fmt) {
                return dt.format("%Y-%m-%d %H:%M").to_string();
            }
        }
        self.timestamp.clone()
    }
}

/// Response of `GET /admin/unanswered_questions`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnansweredList {
    /// Number of pending questions.
    #[serde(default)]
    pub count: u64,
    /// The questions themselves.
    #[serde(default)]
    pub questions: Vec<UnansweredQuestion>,
}

/// An answer for a pending question. At least one of text or file is required.
#[derive(Debug, Clone, Default)]
pub struct SolveRequest {
    /// The question being answered, verbatim.
    pub query: String,
    /// Free-text answer.
    pub answer_text: Option<String>,
    /// File name to store the text answer under; only sent with `answer_text`.
    pub custom_filename: Option<String>,
    /// Document holding the answer.
    pub file: Option<std::path::PathBuf>,
}

// =============================================================================
// Lifecycle Dashboard
// =============================================================================

/// One row of an uploaded production-log table, keyed by column header.
pub type LifecycleRecord = serde_json::Map<String, serde_json::Value>;

/// Response of `POST /api/upload_lifecycle`: either rows or an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifecycleResponse {
    /// Parsed rows.
    #[serde(default)]
    pub data: Option<Vec<LifecycleRecord>>,
    /// Parse failure reported by the backend.
    #[serde(default)]
    pub error: Option<String>,
}

// =============================================================================
// Error Response
// =============================================================================

/// Error body returned by the backend on non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Error detail.
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_request_serializes_expected_fields() {
        let req = ChatRequest {
            query: "ping".to_string(),
            thread_id: "t-1".to_string(),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v, json!({"query": "ping", "thread_id": "t-1"}));
    }

    #[test]
    fn unanswered_list_tolerates_missing_fields() {
        let list: UnansweredList =
            serde_json::from_value(json!({"questions": [{"query": "why?"}]})).unwrap();
        assert_eq!(list.count, 0);
        assert_eq!(list.questions[0].query, "why?");
        assert_eq!(list.questions[0].reason, "");
    }

    #[test]
    fn timestamp_formats_rfc3339_and_naive() {
        let mut q = UnansweredQuestion {
            query: "q".to_string(),
            reason: String::new(),
            timestamp: "2026-03-01T08:15:30+08:00".to_string(),
        };
        assert_eq!(q.display_timestamp(), "2026-03-01 08:15");

        q.timestamp = "2026-03-01 08:15:30.123456".to_string();
        assert_eq!(q.display_timestamp(), "2026-03-01 08:15");

        q.timestamp = "yesterday".to_string();
        assert_eq!(q.display_timestamp(), "yesterday");
    }

    #[test]
    fn lifecycle_response_error_variant() {
        let resp: LifecycleResponse =
            serde_json::from_value(json!({"error": "bad sheet"})).unwrap();
        assert!(resp.data.is_none());
        assert_eq!(resp.error.as_deref(), Some("bad sheet"));
    }

    #[test]
    fn knowledge_file_list_deserializes() {
        let files: Vec<KnowledgeFile> =
            serde_json::from_value(json!([{"name": "manual.pdf", "chunks": 42}])).unwrap();
        assert_eq!(files[0].chunks, 42);
    }
}
