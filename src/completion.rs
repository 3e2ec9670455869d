//! Client for the hosted chat-completion API.

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Persona and tool protocol sent as the system instruction on every call.
const SYSTEM_PROMPT: &str = "Vous êtes un assistant IA utile intégré dans l'éditeur. \
    Vous pouvez aider avec la programmation, le débogage et répondre aux questions techniques. \
    Pour consulter les fichiers du projet, répondez avec un appel d'outil au format JSON : \
    {\"tool\": \"read_file\", \"path\": \"...\"} ou {\"tool\": \"list_directory\", \"path\": \"...\"}.";

const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.7;

/// The seam between the relay and the completion service: one prompt in, one
/// reply out. Implementations must be safe to call concurrently from
/// independent connections.
pub trait CompletionBackend: Send + Sync {
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Serialize)]
struct CompletionMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<CompletionMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionResponseMessage,
}

#[derive(Deserialize)]
struct CompletionResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl CompletionClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    async fn chat(&self, prompt: &str) -> Result<String> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                CompletionMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                CompletionMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("completion API error {}: {}", status, text));
        }

        let completion: CompletionResponse = response.json().await?;
        Ok(completion
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default())
    }
}

impl CompletionBackend for CompletionClient {
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send {
        self.chat(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = CompletionRequest {
            model: "gpt-3.5-turbo".to_string(),
            messages: vec![CompletionMessage {
                role: "user".to_string(),
                content: "hello".to_string(),
            }],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["max_tokens"], 500);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = CompletionClient::new("https://api.openai.com/", "key", "gpt-3.5-turbo");
        assert_eq!(client.base_url, "https://api.openai.com");
    }
}
