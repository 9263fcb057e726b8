use super::{parse_draft, parse_summary, prompts, Drafter};
use crate::config::DrafterConfig;
use crate::contract::CurrentUser;
use crate::error::{Collaborator, Result, WorkflowError};
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use covenant_blocks::{DraftDocument, MarkerConfig};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

const MAX_TOKENS: u32 = 4000;
const SUMMARY_TEMPERATURE: f32 = 0.1;

/// Chat-completions client
#[derive(Debug, Clone)]
pub struct OpenAiDrafter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    markers: MarkerConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

/// Constrains the reply; drafts must be a single JSON object
#[derive(Serialize, Clone, Copy)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

const JSON_OBJECT: ResponseFormat = ResponseFormat {
    kind: "json_object",
};

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiDrafter {
    pub fn new(config: &DrafterConfig, markers: MarkerConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| WorkflowError::Config("missing drafter API key".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|err| WorkflowError::Config(format!("drafter http client: {err}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            markers,
        })
    }

    fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: Option<f32>,
        response_format: Option<ResponseFormat>,
    ) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature,
            response_format,
        };

        log::debug!("Drafter request to {} (model {})", self.endpoint, self.model);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    WorkflowError::Config(format!("drafter rejected credentials ({status})"))
                }
                _ => WorkflowError::transport(
                    Collaborator::Drafter,
                    format!("HTTP {status}: {}", truncate(&body, 300)),
                ),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| WorkflowError::MalformedDraft("drafter returned no content".to_string()))
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl Drafter for OpenAiDrafter {
    fn id(&self) -> &'static str {
        "openai"
    }

    async fn generate_document(&self, prompt: &str, author: &CurrentUser) -> Result<DraftDocument> {
        let system = prompts::generation_system(&self.markers, Self::today());
        let user = prompts::generation_user(prompt, author.display_name());
        parse_draft(&self.complete(&system, &user, None, Some(JSON_OBJECT)).await?)
    }

    async fn regenerate_block(
        &self,
        current: &DraftDocument,
        index: usize,
        instructions: &str,
    ) -> Result<DraftDocument> {
        let system =
            prompts::regenerate_block_system(&self.markers, Self::today(), current, index);
        parse_draft(&self.complete(&system, instructions, None, Some(JSON_OBJECT)).await?)
    }

    async fn regenerate_document(
        &self,
        current: &DraftDocument,
        instructions: &str,
    ) -> Result<DraftDocument> {
        let system = prompts::regenerate_document_system(&self.markers, Self::today(), current);
        parse_draft(&self.complete(&system, instructions, None, Some(JSON_OBJECT)).await?)
    }

    async fn summarize(&self, current: &DraftDocument) -> Result<Vec<String>> {
        let answer = self
            .complete(
                prompts::SUMMARY_SYSTEM,
                &prompts::summary_user(current),
                Some(SUMMARY_TEMPERATURE),
                None,
            )
            .await;
        match answer {
            Ok(raw) => Ok(parse_summary(&raw)),
            Err(WorkflowError::MalformedDraft(_)) => Ok(super::fallback_summary()),
            Err(err) => Err(err),
        }
    }
}
