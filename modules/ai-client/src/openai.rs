use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::traits::{ChatAgent, EmbedAgent};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Client for any OpenAI-compatible API (chat completions + embeddings).
#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    base_url: String,
    chat_model: String,
    embedding_model: String,
    http: reqwest::Client,
}

impl OpenAi {
    pub fn new(api_key: &str, chat_model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: OPENAI_API_URL.to_string(),
            chat_model: chat_model.to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_embedding_model(mut self, model: &str) -> Self {
        self.embedding_model = model.to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn chat(&self, messages: Vec<Message>) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.chat_model, "chat request");

        let request = ChatRequest {
            model: self.chat_model.clone(),
            messages,
        };

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("chat API error ({status}): {error_text}"));
        }

        let chat_response: ChatResponse = response.json().await?;
        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("chat API returned no choices"))
    }

    async fn embeddings(&self, input: serde_json::Value) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        debug!(model = %self.embedding_model, "embedding request");

        let request = EmbeddingRequest {
            model: self.embedding_model.clone(),
            input,
        };

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("embedding API error ({status}): {error_text}"));
        }

        let mut embed_response: EmbeddingResponse = response.json().await?;
        // The API does not guarantee input order in all implementations.
        embed_response.data.sort_by_key(|d| d.index);
        Ok(embed_response.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl ChatAgent for OpenAi {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.chat(vec![
            Message {
                role: "system".to_string(),
                content: system.to_string(),
            },
            Message {
                role: "user".to_string(),
                content: user.to_string(),
            },
        ])
        .await
    }
}

#[async_trait]
impl EmbedAgent for OpenAi {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self
            .embeddings(serde_json::Value::String(text.to_string()))
            .await?;
        if vectors.is_empty() {
            return Err(anyhow!("embedding API returned no vectors"));
        }
        Ok(vectors.remove(0))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embeddings(serde_json::json!(texts)).await
    }
}

// --- wire types ---

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: serde_json::Value,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}
