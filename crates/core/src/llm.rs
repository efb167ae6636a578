//! Chat completion against a local Ollama server.

use crate::error::ModelError;
use crate::traits::ChatModel;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Renders the user turn sent with every question.
pub fn render_user_turn(context: &str, question: &str) -> String {
    format!(
        "Use the following question and context to generate a response:\n\
         Question: {question}\n\
         Context: {context}\n\
         Ensure your answer is based only on the data provided."
    )
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

pub struct OllamaChatModel {
    endpoint: String,
    model: String,
    temperature: f32,
    client: Client,
}

impl OllamaChatModel {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature,
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChatModel {
    async fn complete(
        &self,
        system_prompt: &str,
        context: &str,
        question: &str,
    ) -> Result<String, ModelError> {
        let user_turn = render_user_turn(context, question);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &user_turn,
                },
            ],
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.endpoint))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ModelError::BackendResponse {
                backend: "ollama".to_string(),
                details: format!("model {} is not available", self.model),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::BackendResponse {
                backend: "ollama".to_string(),
                details: format!("{status}: {body}"),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        Ok(parsed
            .message
            .map(|message| message.content)
            .unwrap_or_default())
    }
}
