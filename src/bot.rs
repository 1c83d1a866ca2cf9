use std::future::Future;
use std::ops::ControlFlow;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use reqwest::Url;
use serde_json::error::Category;
use teloxide::dispatching::UpdateHandler;
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::{ChatId, UpdateKind, UserId};
use teloxide::utils::command::{BotCommands, ParseError};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::{Config, ConfigError};
use crate::membership::{self, MembershipStatus};
use crate::platform::telegram::TelegramPlatform;
use crate::platform::{ChatPlatform, PlatformError, Reply};

pub const JOIN_BUTTON_LABEL: &str = "Join the channel";
pub const MEMBER_WELCOME: &str = "✅ You are already a member of the channel. Welcome to the bot.";
const USER_HELP: &str = "User help:\n\
     This bot checks that you have joined the required channel.\n\
     Send /start to run the check.";

/// Everything a request needs: immutable settings, the bot API client and
/// the update handler tree.
pub struct BotContext {
    pub config: Config,
    pub platform: Arc<dyn ChatPlatform>,
    handler: UpdateHandler<anyhow::Error>,
}

impl BotContext {
    pub fn new(config: Config, platform: Arc<dyn ChatPlatform>) -> Self {
        Self {
            config,
            platform,
            handler: schema(),
        }
    }
}

/// Whether the bot could be built at startup. A disabled bot still lets the
/// HTTP server run so the webhook answers deterministically.
#[derive(Clone)]
pub enum BotState {
    Configured(Arc<BotContext>),
    Disabled,
}

impl BotState {
    pub fn from_env() -> Self {
        Self::from_config(Config::from_env())
    }

    pub fn from_config(config: Result<Config, ConfigError>) -> Self {
        let config = match config {
            Ok(config) => config,
            Err(e) => {
                error!("Bot disabled, configuration invalid: {}", e);
                return BotState::Disabled;
            }
        };

        match TelegramPlatform::new(&config.bot_token) {
            Ok(platform) => {
                info!("Configuration loaded successfully");
                info!("  Required channel: {}", config.required_channel);
                info!("  Admin ids: {:?}", config.admin_ids);
                BotState::Configured(Arc::new(BotContext::new(config, Arc::new(platform))))
            }
            Err(e) => {
                error!("Bot disabled, client construction failed: {:#}", e);
                BotState::Disabled
            }
        }
    }

    pub fn context(&self) -> Option<&Arc<BotContext>> {
        match self {
            BotState::Configured(ctx) => Some(ctx),
            BotState::Disabled => None,
        }
    }
}

fn deep_link(input: String) -> Result<(String,), ParseError> {
    Ok((input.trim().to_string(),))
}

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(
        description = "check your membership in the required channel",
        parse_with = deep_link
    )]
    Start(String),
    #[command(description = "show this help")]
    Help,
}

/// Parses a command message. The command name is matched case-insensitively.
/// `/cmd@name` is only accepted when `name` matches `bot_username`; without a
/// configured username any suffix is accepted.
pub fn parse_command(text: &str, bot_username: Option<&str>) -> Option<Command> {
    let text = text.trim_start();
    let (head, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    if !head.starts_with('/') {
        return None;
    }

    let mut head = head.to_lowercase();
    let bot_name = match bot_username {
        Some(name) => name.to_lowercase(),
        None => {
            if let Some(at) = head.find('@') {
                head.truncate(at);
            }
            String::new()
        }
    };

    let rest = rest.trim();
    let normalized = if rest.is_empty() {
        head
    } else {
        format!("{head} {rest}")
    };
    Command::parse(&normalized, &bot_name).ok()
}

/// A parsed command together with where it came from
#[derive(Debug, Clone)]
pub struct CommandEvent {
    pub chat_id: ChatId,
    pub sender: Option<UserId>,
    pub command: Command,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to send reply: {0}")]
    Send(#[from] PlatformError),
    #[error("invalid join link {link:?}: {reason}")]
    JoinLink { link: String, reason: String },
    #[error("command handler panicked: {0}")]
    Panic(String),
}

impl CommandError {
    pub fn kind(&self) -> &'static str {
        match self {
            CommandError::Send(_) => "SendError",
            CommandError::JoinLink { .. } => "JoinLinkError",
            CommandError::Panic(_) => "Panic",
        }
    }
}

pub fn admin_welcome(user_id: UserId) -> String {
    format!(
        "🚀 Welcome, admin. The bot is ready to work. (ID: {})",
        user_id.0
    )
}

pub fn failure_notice(kind: &str) -> String {
    format!("⚠️ Internal error, could not process the command ({kind}).")
}

fn admin_help() -> String {
    format!(
        "Admin help:\n{}\nAdmins are never asked to join the channel.",
        Command::descriptions()
    )
}

fn join_prompt(config: &Config) -> Result<Reply, CommandError> {
    let link = config.channel_link();
    let url = Url::parse(&link).map_err(|e| CommandError::JoinLink {
        link: link.clone(),
        reason: e.to_string(),
    })?;
    Ok(Reply::text(format!(
        "⚠️ To use this bot, please join the channel {} first.",
        config.required_channel
    ))
    .with_button(JOIN_BUTTON_LABEL, url))
}

/// Runs `work`; if it fails or panics, tells the chat so instead of leaving
/// the command unanswered.
pub async fn with_fallback_reply<F>(ctx: &BotContext, chat_id: ChatId, work: F)
where
    F: Future<Output = Result<(), CommandError>>,
{
    let outcome = match AssertUnwindSafe(work).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(CommandError::Panic(message))
        }
    };

    if let Err(e) = outcome {
        error!("Error processing command in chat {}: {}", chat_id.0, e);
        let notice = Reply::text(failure_notice(e.kind()));
        if let Err(e) = ctx.platform.send_reply(chat_id, notice).await {
            error!("Failed to send error reply to chat {}: {}", chat_id.0, e);
        }
    }
}

async fn start(ctx: &BotContext, chat_id: ChatId, user_id: UserId) -> Result<(), CommandError> {
    let reply = match membership::classify(ctx, user_id).await {
        MembershipStatus::Admin => Reply::text(admin_welcome(user_id)),
        MembershipStatus::Member => Reply::text(MEMBER_WELCOME),
        MembershipStatus::NonMember => join_prompt(&ctx.config)?,
    };
    ctx.platform.send_reply(chat_id, reply).await?;
    Ok(())
}

async fn help(ctx: &BotContext, chat_id: ChatId, user_id: UserId) -> Result<(), CommandError> {
    let text = if ctx.config.is_admin(user_id) {
        admin_help()
    } else {
        USER_HELP.to_string()
    };
    ctx.platform.send_reply(chat_id, Reply::text(text)).await?;
    Ok(())
}

/// Answers one command. Commands without a known sender are dropped.
pub async fn handle_command(ctx: &BotContext, event: CommandEvent) {
    let Some(user_id) = event.sender else {
        debug!("Ignoring {:?} in chat {}: no sender", event.command, event.chat_id.0);
        return;
    };

    info!(
        "Command {:?} from user {} in chat {}",
        event.command, user_id.0, event.chat_id.0
    );

    let chat_id = event.chat_id;
    with_fallback_reply(ctx, chat_id, async move {
        match event.command {
            Command::Start(_) => start(ctx, chat_id, user_id).await,
            Command::Help => help(ctx, chat_id, user_id).await,
        }
    })
    .await;
}

async fn command_endpoint(
    msg: Message,
    command: Command,
    ctx: Arc<BotContext>,
) -> anyhow::Result<()> {
    let event = CommandEvent {
        chat_id: msg.chat.id,
        sender: msg.from.as_ref().map(|user| user.id),
        command,
    };
    handle_command(&ctx, event).await;
    Ok(())
}

/// Update handler tree: command messages go to the command handler,
/// everything else falls through.
fn schema() -> UpdateHandler<anyhow::Error> {
    Update::filter_message()
        .filter_map(|msg: Message, ctx: Arc<BotContext>| {
            msg.text()
                .and_then(|text| parse_command(text, ctx.config.bot_username.as_deref()))
        })
        .endpoint(command_endpoint)
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("malformed JSON body: {0}")]
    MalformedJson(#[source] serde_json::Error),
    #[error("body is not a bot update: {0}")]
    InvalidUpdate(#[source] serde_json::Error),
    #[error("update {0} has an unrecognised payload")]
    Unrecognized(u32),
    #[error("update handler failed: {0:#}")]
    Handler(anyhow::Error),
}

/// Runs one decoded update through the handler tree. Updates no branch
/// accepts are ignored.
pub async fn dispatch(ctx: &Arc<BotContext>, update: Update) -> Result<(), DispatchError> {
    let update_id = update.id.0;
    match ctx
        .handler
        .dispatch(dptree::deps![update, Arc::clone(ctx)])
        .await
    {
        ControlFlow::Break(result) => result.map_err(DispatchError::Handler),
        ControlFlow::Continue(_) => {
            debug!("Ignoring update {}: no matching handler", update_id);
            Ok(())
        }
    }
}

/// Decodes a webhook body and dispatches it.
pub async fn process_update(ctx: &Arc<BotContext>, body: &[u8]) -> Result<(), DispatchError> {
    let update: Update = serde_json::from_slice(body).map_err(|e| match e.classify() {
        Category::Data => DispatchError::InvalidUpdate(e),
        Category::Io | Category::Syntax | Category::Eof => DispatchError::MalformedJson(e),
    })?;

    if let UpdateKind::Error(_) = update.kind {
        return Err(DispatchError::Unrecognized(update.id.0));
    }

    dispatch(ctx, update).await
}
