use anyhow::Result;
use async_trait::async_trait;

/// A chat-completion model: one system prompt, one user message, one
/// text reply. The seam the pipeline mocks in tests.
#[async_trait]
pub trait ChatAgent: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// A text-embedding model.
#[async_trait]
pub trait EmbedAgent: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
}
