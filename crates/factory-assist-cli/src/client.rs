//! HTTP client for the assistant backend.
//!
//! Wraps the chat stream, speech-to-text, knowledge-base, pending-question,
//! and lifecycle endpoints behind typed methods.

use std::path::Path;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};

use crate::types::{
    ApiErrorResponse, ChatRequest, KnowledgeFile, LifecycleRecord, LifecycleResponse,
    SolveRequest, Transcription, UnansweredList, UploadReceipt,
};

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Rejected before sending.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A local file could not be read.
    #[error("Failed to read {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Client for the assistant backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    /// Create a new backend client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the backend (e.g., "http://localhost:8000")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Handle API error responses.
    async fn handle_error(response: Response) -> ClientError {
        let status = response.status().as_u16();
        let message = match response.json::<ApiErrorResponse>().await {
            Ok(err) => err.detail,
            Err(_) => "Unknown error".to_string(),
        };
        ClientError::Api { status, message }
    }

    /// Fail on a non-2xx status, otherwise hand the response back.
    async fn check(response: Response) -> Result<Response, ClientError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::handle_error(response).await)
        }
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    // =========================================================================
    // Chat
    // =========================================================================

    /// Open a chat request; the returned response's body is the answer stream.
    pub async fn open_chat(&self, query: &str, thread_id: &str) -> Result<Response, ClientError> {
        let url = format!("{}/chat", self.base_url);
        let request = ChatRequest {
            query: query.to_string(),
            thread_id: thread_id.to_string(),
        };

        tracing::debug!(thread_id, "Opening chat stream");
        let response = self.client.post(&url).json(&request).send().await?;
        Self::check(response).await
    }

    /// Send recorded audio for speech-to-text.
    pub async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, ClientError> {
        let url = format!("{}/voice", self.base_url);
        let part = Part::bytes(audio).file_name(filename.to_string());
        let form = Form::new().part("file", part);

        let response = self.client.post(&url).multipart(form).send().await?;
        let body: Transcription = Self::parse(Self::check(response).await?).await?;
        Ok(body.text)
    }

    // =========================================================================
    // Pending Questions
    // =========================================================================

    /// List the questions the assistant could not answer.
    pub async fn unanswered_questions(&self) -> Result<UnansweredList, ClientError> {
        let url = format!("{}/admin/unanswered_questions", self.base_url);
        let response = self.client.get(&url).send().await?;
        Self::parse(Self::check(response).await?).await
    }

    /// Submit an answer for a pending question, feeding it into the knowledge base.
    pub async fn solve_question(&self, request: SolveRequest) -> Result<(), ClientError> {
        let answer_text = request.answer_text.filter(|t| !t.trim().is_empty());
        if answer_text.is_none() && request.file.is_none() {
            return Err(ClientError::InvalidInput(
                "an answer text or a file is required".to_string(),
            ));
        }

        let mut form = Form::new().text("query", request.query);
        if let Some(text) = answer_text {
            form = form.text("answer_text", text);
            if let Some(name) = request
                .custom_filename
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
            {
                form = form.text("custom_filename", name);
            }
        }
        if let Some(path) = request.file.as_deref() {
            form = form.part("file", file_part(path).await?);
        }

        let url = format!("{}/admin/solve_question", self.base_url);
        let response = self.client.post(&url).multipart(form).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    // =========================================================================
    // Knowledge Base
    // =========================================================================

    /// List documents in the knowledge base.
    pub async fn list_knowledge_files(&self) -> Result<Vec<KnowledgeFile>, ClientError> {
        let url = format!("{}/knowledge/files", self.base_url);
        let response = self.client.get(&url).send().await?;
        Self::parse(Self::check(response).await?).await
    }

    /// Upload a document for indexing.
    pub async fn upload_knowledge_file(&self, path: &Path) -> Result<UploadReceipt, ClientError> {
        let url = format!("{}/knowledge/upload", self.base_url);
        let form = Form::new().part("file", file_part(path).await?);

        let response = self.client.post(&url).multipart(form).send().await?;
        let receipt: UploadReceipt = Self::parse(Self::check(response).await?).await?;
        tracing::info!(filename = %receipt.filename, chunks = receipt.chunks, "Indexed document");
        Ok(receipt)
    }

    /// Delete a document and all knowledge derived from it.
    pub async fn delete_knowledge_file(&self, name: &str) -> Result<(), ClientError> {
        let url = self.segment_url(&["knowledge", "files", name])?;
        let response = self.client.delete(url).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    /// URL under which an uploaded document is served for preview.
    pub fn file_url(&self, name: &str) -> Result<Url, ClientError> {
        self.segment_url(&["files", name])
    }

    // =========================================================================
    // Lifecycle Dashboard
    // =========================================================================

    /// Upload a production-log table and get its rows back.
    pub async fn upload_lifecycle(&self, path: &Path) -> Result<Vec<LifecycleRecord>, ClientError> {
        let url = format!("{}/api/upload_lifecycle", self.base_url);
        let form = Form::new().part("file", file_part(path).await?);

        let response = self.client.post(&url).multipart(form).send().await?;
        let status = response.status().as_u16();
        let body: LifecycleResponse = Self::parse(response).await?;
        match (body.data, body.error) {
            (Some(rows), _) => Ok(rows),
            (None, message) => Err(ClientError::Api {
                status,
                message: message.unwrap_or_else(|| "file could not be parsed".to_string()),
            }),
        }
    }

    // =========================================================================
    // Utility
    // =========================================================================

    /// Build a URL from path segments, percent-encoding each one.
    fn segment_url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::InvalidInput(format!("bad base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidInput("base URL cannot hold a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Read a local file into a multipart part named after the file.
async fn file_part(path: &Path) -> Result<Part, ClientError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| ClientError::File {
        path: path.display().to_string(),
        source,
    })?;
    let name = path
        .file_name()
        .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());
    Ok(Part::bytes(bytes).file_name(name))
}
