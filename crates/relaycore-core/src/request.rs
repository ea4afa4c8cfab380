//! The inbound request shape and its chat message/content vocabulary.

use serde::{Deserialize, Serialize};

use crate::ids::{ProjectId, RequestId, TeamId, UserId};

/// Role of a single chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System-level instructions steering the assistant's behavior.
    System,
    /// A message from the end user.
    User,
    /// A prior response from the assistant, included for context.
    Assistant,
    /// The result of a tool invocation fed back to the model.
    Tool,
}

/// A single part of a multimodal message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// A plain text segment.
    Text {
        /// The text content.
        text: String,
    },
    /// A reference to an image, by URL.
    ImageUrl {
        /// The image location and optional inline detail hint.
        image_url: ImageUrl,
    },
}

/// An image reference inside a [`ContentPart::ImageUrl`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// The image's URL.
    pub url: String,
}

/// The body of a single chat message: either plain text or an ordered list
/// of multimodal parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text body — the common case.
    Text(String),
    /// Multimodal body composed of one or more parts.
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Flatten the content to its textual representation, concatenating the
    /// text segments of a multipart body and ignoring non-text parts.
    #[must_use]
    pub fn text_content(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// One message in an [`AIRequest`]'s ordered conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who is speaking.
    pub role: MessageRole,
    /// What they said.
    pub content: MessageContent,
}

impl ChatMessage {
    /// Build a system message.
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: MessageContent::Text(text.into()),
        }
    }

    /// Build a user message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Text(text.into()),
        }
    }

    /// Build an assistant message.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    /// The flattened text content of this message.
    #[must_use]
    pub fn text_content(&self) -> String {
        self.content.text_content()
    }
}

/// A caller's preference for how aggressively cost should be optimized at
/// the expense of model quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostPreference {
    /// Favor the cheapest adequate model.
    Aggressive,
    /// Balance cost and quality (the default when unspecified).
    Balanced,
    /// Favor the highest-quality model regardless of cost.
    QualityFirst,
}

/// A single inbound AI request arriving at the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIRequest {
    /// Unique id for this request; generated by the caller or the pipeline.
    pub id: RequestId,
    /// The user on whose behalf this request is made, if known.
    pub user_id: Option<UserId>,
    /// The team the request is attributed to, if known.
    pub team_id: Option<TeamId>,
    /// The project the request is attributed to, if known.
    pub project_id: Option<ProjectId>,
    /// A free-form tag identifying the calling system (e.g. "autmatrix").
    pub system_source: String,
    /// Ordered conversation history.
    pub messages: Vec<ChatMessage>,
    /// The model the caller asked for; may be substituted by the optimizer.
    pub requested_model: String,
    /// Maximum output tokens, if the caller specified a limit.
    pub max_tokens: Option<u32>,
    /// The routing profile id steering which rules apply.
    pub routing_profile_id: String,
    /// How aggressively to trade quality for cost.
    pub cost_preference: Option<CostPreference>,
    /// A flattened prompt string, retained for legacy rule fields that key
    /// off `prompt` directly rather than the structured message list.
    pub prompt: Option<String>,
}

impl AIRequest {
    /// The effective prompt text used by rule conditions and cost
    /// estimation: the explicit `prompt` field when present, otherwise the
    /// concatenated text of every message.
    #[must_use]
    pub fn effective_prompt(&self) -> String {
        if let Some(prompt) = &self.prompt {
            return prompt.clone();
        }
        self.messages
            .iter()
            .map(ChatMessage::text_content)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Total character length of the effective prompt, the basis for token
    /// estimation.
    #[must_use]
    pub fn prompt_char_len(&self) -> usize {
        self.effective_prompt().chars().count()
    }
}

/// Builder for [`AIRequest`], mirroring the gateway request builders this
/// workspace descends from: every required field is supplied up front and
/// `build` performs the validation a constructor would otherwise have to
/// repeat at every call site.
#[derive(Debug, Default)]
pub struct AIRequestBuilder {
    id: Option<RequestId>,
    user_id: Option<UserId>,
    team_id: Option<TeamId>,
    project_id: Option<ProjectId>,
    system_source: Option<String>,
    messages: Vec<ChatMessage>,
    requested_model: Option<String>,
    max_tokens: Option<u32>,
    routing_profile_id: Option<String>,
    cost_preference: Option<CostPreference>,
    prompt: Option<String>,
}

impl AIRequestBuilder {
    /// Start a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request id explicitly (a fresh one is generated if omitted).
    #[must_use]
    pub fn id(mut self, id: RequestId) -> Self {
        self.id = Some(id);
        self
    }

    /// Attribute the request to a user.
    #[must_use]
    pub fn user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Attribute the request to a team.
    #[must_use]
    pub fn team_id(mut self, team_id: TeamId) -> Self {
        self.team_id = Some(team_id);
        self
    }

    /// Attribute the request to a project.
    #[must_use]
    pub fn project_id(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Set which calling system originated this request.
    #[must_use]
    pub fn system_source(mut self, source: impl Into<String>) -> Self {
        self.system_source = Some(source.into());
        self
    }

    /// Append one message to the conversation.
    #[must_use]
    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Replace the whole conversation.
    #[must_use]
    pub fn messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    /// Set the requested model identifier.
    #[must_use]
    pub fn requested_model(mut self, model: impl Into<String>) -> Self {
        self.requested_model = Some(model.into());
        self
    }

    /// Cap output tokens.
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the routing profile id.
    #[must_use]
    pub fn routing_profile_id(mut self, profile_id: impl Into<String>) -> Self {
        self.routing_profile_id = Some(profile_id.into());
        self
    }

    /// Set the cost/quality preference.
    #[must_use]
    pub fn cost_preference(mut self, preference: CostPreference) -> Self {
        self.cost_preference = Some(preference);
        self
    }

    /// Set the legacy flattened prompt field.
    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Validate and build the request.
    ///
    /// # Errors
    /// Returns [`crate::error::RelayError::InvalidConfig`] if `system_source`,
    /// `requested_model`, or `routing_profile_id` are missing, or if the
    /// conversation and legacy `prompt` are both empty.
    pub fn build(self) -> Result<AIRequest, crate::error::RelayError> {
        let system_source = self
            .system_source
            .ok_or_else(|| crate::error::RelayError::invalid_config("system_source is required"))?;
        let requested_model = self.requested_model.ok_or_else(|| {
            crate::error::RelayError::invalid_config("requested_model is required")
        })?;
        let routing_profile_id = self.routing_profile_id.ok_or_else(|| {
            crate::error::RelayError::invalid_config("routing_profile_id is required")
        })?;
        if self.messages.is_empty() && self.prompt.is_none() {
            return Err(crate::error::RelayError::invalid_config(
                "request must carry at least one message or a prompt",
            ));
        }
        Ok(AIRequest {
            id: self.id.unwrap_or_default(),
            user_id: self.user_id,
            team_id: self.team_id,
            project_id: self.project_id,
            system_source,
            messages: self.messages,
            requested_model,
            max_tokens: self.max_tokens,
            routing_profile_id,
            cost_preference: self.cost_preference,
            prompt: self.prompt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_model_and_source() {
        let err = AIRequestBuilder::new()
            .message(ChatMessage::user("hi"))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidConfig");
    }

    #[test]
    fn builder_accepts_prompt_only() {
        let req = AIRequestBuilder::new()
            .system_source("autmatrix")
            .requested_model("gpt-4")
            .routing_profile_id("automotive")
            .prompt("hello there")
            .build()
            .unwrap();
        assert_eq!(req.effective_prompt(), "hello there");
    }

    #[test]
    fn effective_prompt_falls_back_to_messages() {
        let req = AIRequestBuilder::new()
            .system_source("autmatrix")
            .requested_model("gpt-4")
            .routing_profile_id("default")
            .message(ChatMessage::system("be terse"))
            .message(ChatMessage::user("hi"))
            .build()
            .unwrap();
        assert_eq!(req.effective_prompt(), "be terse\nhi");
    }

    #[test]
    fn multipart_text_content_concatenates_text_parts() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text { text: "a".into() },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: "https://example.com/x.png".into(),
                },
            },
            ContentPart::Text { text: "b".into() },
        ]);
        assert_eq!(content.text_content(), "ab");
    }
}
