use anyhow::Result;
use async_trait::async_trait;

// =============================================================================
// ChatCompletion Trait
// =============================================================================

/// A single system + user prompt round trip returning the model's text.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn chat_completion(&self, system: &str, user: &str) -> Result<String>;
}
