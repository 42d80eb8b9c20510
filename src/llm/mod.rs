pub mod models;
pub mod providers;
pub mod schema;

use crate::config::LlmConfig;
use crate::llm::models::{parse_model_reply, GeneratedQuery};
use crate::sql::format::format_sql;
use async_trait::async_trait;
use std::error::Error;
use std::fmt;
use tracing::debug;

#[derive(Debug)]
pub enum LlmError {
    ConnectionError(String),
    ResponseError(String),
    ConfigError(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::ConnectionError(msg) => write!(f, "LLM connection error: {}", msg),
            LlmError::ResponseError(msg) => write!(f, "LLM response error: {}", msg),
            LlmError::ConfigError(msg) => write!(f, "LLM configuration error: {}", msg),
        }
    }
}

impl Error for LlmError {}

/// A backend that turns the fixed system prompt plus one user message into
/// the model's raw text reply. Transport and HTTP-level failures surface as
/// `LlmError`; whatever text comes back is the manager's problem to parse.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn request_reply(&self, question: &str) -> Result<String, LlmError>;
}

pub struct LlmManager {
    backend: Box<dyn ChatBackend + Send + Sync>,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let backend: Box<dyn ChatBackend + Send + Sync> = match config.backend.as_str() {
            "remote" => Box::new(providers::remote::RemoteLlmProvider::new(config)?),
            "ollama" => Box::new(providers::ollama::OllamaProvider::new(config)?),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )))
            }
        };

        Ok(Self { backend })
    }

    /// Wires in a caller-supplied backend. Used by tests to script replies.
    pub fn from_backend(backend: Box<dyn ChatBackend + Send + Sync>) -> Self {
        Self { backend }
    }

    /// Full generation contract: ask the backend, parse the JSON reply,
    /// canonicalize the SQL cosmetically. Malformed replies come back as an
    /// empty `GeneratedQuery`, never as an error.
    pub async fn generate(&self, question: &str) -> Result<GeneratedQuery, LlmError> {
        let raw = self.backend.request_reply(question).await?;
        debug!("Raw model reply: {}", raw);

        let mut generated = parse_model_reply(&raw);
        if !generated.is_empty() {
            generated.sql = format_sql(&generated.sql);
        }

        Ok(generated)
    }
}
