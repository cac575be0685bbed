use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use campusnet_config::AdvisorConfig;

pub const DEFAULT_SESSION_TITLE: &str = "New conversation";
const MAX_TITLE_CHARS: usize = 60;

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("advisor API key is not configured")]
    ApiKeyMissing,
    #[error("advisor http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("advisor upstream returned status {status}")]
    Upstream { status: u16, body: String },
    #[error("invalid advisor response: {0}")]
    Response(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// What the advisor knows about the person asking.
#[derive(Debug, Clone, Default)]
pub struct AdvisorProfile {
    pub full_name: String,
    pub role: String,
    pub headline: Option<String>,
    pub department: Option<String>,
    pub program: Option<String>,
    pub graduation_year: Option<i64>,
    pub skills: Vec<String>,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Clone)]
pub struct AdvisorClient {
    http: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    history_limit: usize,
    referer: Option<String>,
    title: Option<String>,
}

impl AdvisorClient {
    pub fn new(config: &AdvisorConfig) -> Result<Self, AdvisorError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds.max(1)))
            .build()?;

        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty());

        debug!(
            model = %config.model,
            enabled = api_key.is_some(),
            "advisor client configured"
        );

        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            history_limit: config.history_limit,
            referer: config.referer.clone(),
            title: config.title.clone(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Ask the model for the next assistant turn.
    ///
    /// `history` holds the conversation so far, oldest first, ending with the
    /// user's new message. Only the last `history_limit` entries are sent,
    /// preceded by a system prompt built from `profile`.
    pub async fn advise(
        &self,
        profile: &AdvisorProfile,
        history: &[ChatMessage],
    ) -> Result<String, AdvisorError> {
        let start = history.len().saturating_sub(self.history_limit.max(1));
        let mut messages = Vec::with_capacity(history.len() - start + 1);
        messages.push(ChatMessage::new(ChatRole::System, system_prompt(profile)));
        messages.extend(history[start..].iter().cloned());

        self.complete(&messages).await
    }

    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AdvisorError> {
        let api_key = self.api_key.as_deref().ok_or(AdvisorError::ApiKeyMissing)?;
        let url = format!("{}/chat/completions", self.base_url);

        let mut request = self
            .http
            .post(url)
            .bearer_auth(api_key)
            .json(&CompletionRequest {
                model: &self.model,
                messages,
            });
        if let Some(referer) = &self.referer {
            request = request.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.title {
            request = request.header("X-Title", title);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "advisor upstream rejected completion request");
            return Err(AdvisorError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = response.json().await?;
        let reply = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| AdvisorError::Response("completion contained no content".into()))?;

        debug!(model = %self.model, chars = reply.len(), "advisor completion received");
        Ok(reply)
    }
}

pub fn system_prompt(profile: &AdvisorProfile) -> String {
    let mut prompt = String::from(
        "You are CampusNet Advisor, a career and academic advisor for a university community. \
         Give practical, encouraging and specific guidance on courses, internships, research, \
         job searching, networking and skill development. Keep answers concise and ask a \
         clarifying question when the request is ambiguous.",
    );

    let mut facts = Vec::new();
    if !profile.full_name.is_empty() {
        facts.push(format!("Name: {}", profile.full_name));
    }
    if !profile.role.is_empty() {
        facts.push(format!("Role: {}", profile.role));
    }
    if let Some(headline) = profile.headline.as_deref().filter(|v| !v.is_empty()) {
        facts.push(format!("Headline: {headline}"));
    }
    if let Some(department) = profile.department.as_deref().filter(|v| !v.is_empty()) {
        facts.push(format!("Department: {department}"));
    }
    if let Some(program) = profile.program.as_deref().filter(|v| !v.is_empty()) {
        facts.push(format!("Program: {program}"));
    }
    if let Some(year) = profile.graduation_year {
        facts.push(format!("Graduation year: {year}"));
    }
    if !profile.skills.is_empty() {
        facts.push(format!("Skills: {}", profile.skills.join(", ")));
    }

    if !facts.is_empty() {
        prompt.push_str("\n\nAbout the person you are advising:\n");
        for fact in facts {
            prompt.push_str("- ");
            prompt.push_str(&fact);
            prompt.push('\n');
        }
    }

    prompt
}

/// Session title taken from the first user message, cut on a word boundary.
pub fn title_from_message(message: &str) -> String {
    let collapsed = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return DEFAULT_SESSION_TITLE.to_string();
    }
    if collapsed.chars().count() <= MAX_TITLE_CHARS {
        return collapsed;
    }

    let cut: String = collapsed.chars().take(MAX_TITLE_CHARS).collect();
    let trimmed = match cut.rfind(' ') {
        Some(index) if index > MAX_TITLE_CHARS / 2 => &cut[..index],
        _ => cut.as_str(),
    };
    format!("{}…", trimmed.trim_end())
}
