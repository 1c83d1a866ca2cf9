use teloxide::types::{ChatMemberStatus, UserId};
use tracing::{debug, error, warn};

use crate::bot::BotContext;
use crate::platform::PlatformError;

/// How the gate sees a user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    Admin,
    Member,
    NonMember,
}

/// Whether `status` counts as active membership of the channel.
pub fn is_active_role(status: ChatMemberStatus) -> bool {
    matches!(
        status,
        ChatMemberStatus::Owner | ChatMemberStatus::Administrator | ChatMemberStatus::Member
    )
}

/// Looks the user up in the required channel once. Any failure counts as
/// "not a member".
pub async fn is_member(ctx: &BotContext, user_id: UserId) -> bool {
    let channel = &ctx.config.required_channel;
    match ctx
        .platform
        .member_status(ctx.config.channel_recipient(), user_id)
        .await
    {
        Ok(status) => {
            debug!("User {} has status {:?} in {}", user_id.0, status, channel);
            is_active_role(status)
        }
        Err(PlatformError::Rejected(reason)) => {
            warn!(
                "Membership lookup for user {} in {} rejected: {}",
                user_id.0, channel, reason
            );
            false
        }
        Err(e) => {
            error!(
                "Error checking membership for user {} in {}: {}",
                user_id.0, channel, e
            );
            false
        }
    }
}

/// Admins are recognised without a platform call; everyone else is looked up.
pub async fn classify(ctx: &BotContext, user_id: UserId) -> MembershipStatus {
    if ctx.config.is_admin(user_id) {
        MembershipStatus::Admin
    } else if is_member(ctx, user_id).await {
        MembershipStatus::Member
    } else {
        MembershipStatus::NonMember
    }
}
