use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    ChatMemberStatus, InlineKeyboardButton, InlineKeyboardMarkup, Recipient,
};
use tracing::debug;

use crate::platform::{ChatPlatform, PlatformError, Reply};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// `ChatPlatform` backed by the Telegram Bot API
pub struct TelegramPlatform {
    bot: Bot,
}

impl TelegramPlatform {
    pub fn new(token: &str) -> Result<Self> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client for the bot API")?;
        Ok(Self {
            bot: Bot::with_client(token, client),
        })
    }
}

fn keyboard(reply: &Reply) -> Option<InlineKeyboardMarkup> {
    reply.button.as_ref().map(|button| {
        InlineKeyboardMarkup::new([[InlineKeyboardButton::url(
            button.label.clone(),
            button.url.clone(),
        )]])
    })
}

#[async_trait]
impl ChatPlatform for TelegramPlatform {
    async fn member_status(
        &self,
        channel: Recipient,
        user_id: UserId,
    ) -> Result<ChatMemberStatus, PlatformError> {
        let member = self.bot.get_chat_member(channel, user_id).await?;
        Ok(member.status())
    }

    async fn send_reply(&self, chat_id: ChatId, reply: Reply) -> Result<(), PlatformError> {
        let markup = keyboard(&reply);
        let request = self.bot.send_message(chat_id, reply.text);
        let sent = match markup {
            Some(markup) => request.reply_markup(markup).await?,
            None => request.await?,
        };
        debug!("Delivered message {} to chat {}", sent.id.0, chat_id.0);
        Ok(())
    }
}
