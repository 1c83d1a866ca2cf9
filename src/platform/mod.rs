pub mod telegram;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use reqwest::Url;
use teloxide::types::{ChatId, ChatMemberStatus, Recipient, UserId};
use teloxide::RequestError;
use thiserror::Error;

/// A button that opens a URL when tapped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkButton {
    pub label: String,
    pub url: Url,
}

/// One outgoing chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub button: Option<LinkButton>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            button: None,
        }
    }

    pub fn with_button(mut self, label: impl Into<String>, url: Url) -> Self {
        self.button = Some(LinkButton {
            label: label.into(),
            url,
        });
        self
    }
}

#[derive(Debug, Error)]
pub enum PlatformError {
    /// The bot API answered but refused the call (unknown user, missing
    /// rights, inaccessible chat).
    #[error("request rejected: {0}")]
    Rejected(String),
    /// Network, timeout or decoding failure.
    #[error("request failed: {0}")]
    Transport(String),
}

impl From<RequestError> for PlatformError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Api(api) => PlatformError::Rejected(api.to_string()),
            other => PlatformError::Transport(other.to_string()),
        }
    }
}

/// The two bot API capabilities the gate depends on.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn member_status(
        &self,
        channel: Recipient,
        user_id: UserId,
    ) -> Result<ChatMemberStatus, PlatformError>;

    async fn send_reply(&self, chat_id: ChatId, reply: Reply) -> Result<(), PlatformError>;
}
