//! Copilot actions backed by a text-generation service.
//!
//! Whether a real client exists is decided once, at startup, as an
//! [`AiCapability`]. The dispatcher never fails: a missing client yields a
//! simulated reply after a short delay and a failed request yields an
//! apology, both in place of the generated text.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::config::AppConfig;
use crate::error::AiError;
use crate::model::{Note, NotePatch};

pub const SIMULATED_REPLY: &str = "API Key not configured. This is a simulated response.";
pub const ERROR_REPLY: &str = "An error occurred while contacting the AI. Please try again.";

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TONE: &str = "neutral";
pub const DEFAULT_LANGUAGE: &str = "Urdu";

pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String, AiError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AiAction {
    Summarize,
    Rewrite {
        #[serde(default = "default_tone")]
        tone: String,
    },
    Expand,
    Translate {
        #[serde(default = "default_language")]
        language: String,
    },
    SuggestTitle,
}

fn default_tone() -> String {
    DEFAULT_TONE.to_string()
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

/// The note field a reply overwrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiField {
    Title,
    Content,
}

impl AiAction {
    pub fn prompt(&self, text: &str) -> String {
        match self {
            AiAction::Summarize => {
                format!("Summarize the following text concisely:\n\n---\n\n{text}")
            }
            AiAction::Rewrite { tone } => {
                format!("Rewrite the following text in a {tone} tone:\n\n---\n\n{text}")
            }
            AiAction::Expand => format!(
                "Expand on the following text, adding more detail and depth:\n\n---\n\n{text}"
            ),
            AiAction::Translate { language } => {
                format!("Translate the following text to {language}:\n\n---\n\n{text}")
            }
            AiAction::SuggestTitle => format!(
                "Suggest a concise and fitting title for the following note content. \
                 Return only the title text, nothing else.\n\n---\n\n{text}"
            ),
        }
    }

    pub fn field(&self) -> AiField {
        match self {
            AiAction::SuggestTitle => AiField::Title,
            _ => AiField::Content,
        }
    }

    fn accepts(&self, content: &str) -> bool {
        match self {
            AiAction::SuggestTitle => !content.trim().is_empty(),
            _ => !content.is_empty(),
        }
    }
}

/// One action against one note. The target id is captured up front so a
/// late reply can be matched against the note it was asked about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiRequest {
    pub note_id: String,
    pub action: AiAction,
    pub content: String,
}

impl AiRequest {
    /// `None` when the note has nothing to work on.
    pub fn for_note(note: &Note, action: AiAction) -> Option<Self> {
        if !action.accepts(&note.content) {
            debug!("skipping {action:?} on note {} with no content", note.id);
            return None;
        }
        Some(AiRequest {
            note_id: note.id.clone(),
            action,
            content: note.content.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiReply {
    pub note_id: String,
    pub action: AiAction,
    pub text: String,
}

impl AiReply {
    /// The change this reply makes to its note; `None` for an empty reply.
    pub fn patch(&self) -> Option<NotePatch> {
        match self.action.field() {
            AiField::Title => {
                let title = self.text.trim();
                (!title.is_empty()).then(|| NotePatch::title(title))
            }
            AiField::Content if self.text.is_empty() => None,
            AiField::Content => Some(NotePatch::content(&*self.text)),
        }
    }
}

#[derive(Debug, Clone)]
pub enum AiCapability<G> {
    Available(G),
    Unavailable(String),
}

impl AiCapability<GeminiClient> {
    pub fn from_config(config: &AppConfig) -> Self {
        let api_key = config.api_key.as_deref().unwrap_or_default();
        if api_key.trim().is_empty() {
            warn!("API key is not set, AI features will return simulated replies");
            return AiCapability::Unavailable("API key is not set".to_string());
        }
        match GeminiClient::new(
            api_key,
            &config.model,
            &config.api_base_url,
            Duration::from_secs(config.request_timeout_secs),
        ) {
            Ok(client) => AiCapability::Available(client),
            Err(e) => {
                error!("failed to set up the text generation client: {e}");
                AiCapability::Unavailable(e.to_string())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct AiDispatcher<G> {
    capability: AiCapability<G>,
    simulated_delay: Duration,
}

impl<G: TextGenerator> AiDispatcher<G> {
    pub fn new(capability: AiCapability<G>, simulated_delay: Duration) -> Self {
        AiDispatcher {
            capability,
            simulated_delay,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.capability, AiCapability::Available(_))
    }

    pub async fn generate(&self, prompt: &str) -> String {
        match &self.capability {
            AiCapability::Unavailable(reason) => {
                debug!("simulating a reply: {reason}");
                tokio::time::sleep(self.simulated_delay).await;
                SIMULATED_REPLY.to_string()
            }
            AiCapability::Available(generator) => match generator.generate(prompt).await {
                Ok(text) => text,
                Err(e) => {
                    error!("error calling the text generation service: {e}");
                    ERROR_REPLY.to_string()
                }
            },
        }
    }

    pub async fn run(&self, request: AiRequest) -> AiReply {
        let prompt = request.action.prompt(&request.content);
        let text = self.generate(&prompt).await;
        AiReply {
            note_id: request.note_id,
            action: request.action,
            text,
        }
    }
}

/// Client for the Generative Language `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect();
        (!text.is_empty()).then_some(text)
    }
}

impl GeminiClient {
    pub fn new(
        api_key: &str,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, AiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(GeminiClient::with_client(client, api_key, model, base_url))
    }

    pub fn with_client(
        client: reqwest::Client,
        api_key: &str,
        model: &str,
        base_url: &str,
    ) -> Self {
        GeminiClient {
            client,
            endpoint: format!(
                "{}/v1beta/models/{model}:generateContent",
                base_url.trim_end_matches('/'),
            ),
            api_key: api_key.to_owned(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, AiError> {
        let body = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };
        let response: GenerateResponse = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        response.text().ok_or(AiError::EmptyResponse)
    }
}
