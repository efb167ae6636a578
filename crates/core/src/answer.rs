use crate::error::AnswerError;
use crate::models::ScoredChunk;
use crate::traits::{ChatModel, VectorStore};
use tracing::{debug, warn};

pub const DEFAULT_TOP_K: usize = 20;

pub const FALLBACK_RESPONSE: &str =
    "I'm sorry, I couldn't find relevant information to answer your question based on the provided data.";

pub const ERROR_RESPONSE: &str = "I encountered an error. Please try again later.";

pub const SYSTEM_PROMPT: &str = "Your name is CHAT, a helpful assistant.
Always maintain professionalism and a concise tone in your responses.

Guidelines for your responses:
- Base your answers solely on the retrieved context. If the context does not provide enough information, say:
\"I couldn't find relevant information to answer your question based on the data provided.\"
- Do not fabricate information or provide answers beyond the context.
- Keep your responses short, direct, and relevant to the context.
- Avoid repeating information unnecessarily or introducing yourself repeatedly.
- Respond to normal conversation topics.

Your responsibility is to assist users by answering questions based strictly on the provided context.";

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub context: Vec<ScoredChunk>,
    pub used_fallback: bool,
}

impl Answer {
    fn fallback(context: Vec<ScoredChunk>) -> Self {
        Self {
            text: FALLBACK_RESPONSE.to_string(),
            context,
            used_fallback: true,
        }
    }
}

pub struct RetrievalAnswerer<S, C>
where
    S: VectorStore,
    C: ChatModel,
{
    store: S,
    model: C,
    top_k: usize,
}

impl<S, C> RetrievalAnswerer<S, C>
where
    S: VectorStore,
    C: ChatModel,
{
    pub fn new(store: S, model: C) -> Self {
        Self {
            store,
            model,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub async fn answer(&self, question: &str) -> Result<Answer, AnswerError> {
        let hits = self.store.query_similar(question, self.top_k).await?;
        if hits.is_empty() {
            debug!(question, "no chunks retrieved, using fallback");
            return Ok(Answer::fallback(hits));
        }

        let context = hits
            .iter()
            .map(|hit| hit.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let completion = self.model.complete(SYSTEM_PROMPT, &context, question).await?;
        let completion = completion.trim();
        if completion.is_empty() {
            return Ok(Answer::fallback(hits));
        }

        Ok(Answer {
            text: completion.to_string(),
            context: hits,
            used_fallback: false,
        })
    }

    /// Never fails: errors become [`ERROR_RESPONSE`].
    pub async fn respond(&self, question: &str) -> String {
        match self.answer(question).await {
            Ok(answer) => answer.text,
            Err(error) => {
                warn!(%error, "answering failed");
                ERROR_RESPONSE.to_string()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}

/// History of one console session. It is only kept for display and is not
/// sent back to retrieval or the model.
#[derive(Debug, Default)]
pub struct ChatSession {
    history: Vec<Exchange>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.history.push(Exchange {
            user: user.into(),
            assistant: assistant.into(),
        });
    }

    pub fn history(&self) -> &[Exchange] {
        &self.history
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Quit,
    Clear,
    Empty,
    Query(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        match trimmed.to_lowercase().as_str() {
            "" => ReplCommand::Empty,
            "q" | "quit" | "exit" => ReplCommand::Quit,
            "clear" | "reset" => ReplCommand::Clear,
            _ => ReplCommand::Query(trimmed.to_string()),
        }
    }
}
