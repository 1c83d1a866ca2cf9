//! `POST /bot`: the endpoint the bot platform delivers updates to.
//!
//! Only two conditions produce a failure status: a disabled bot (500) and a
//! wrong secret (401). Processing errors are logged and still acknowledged
//! with 200, otherwise the platform keeps redelivering the same update.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use subtle::ConstantTimeEq;
use tracing::{error, warn};

use crate::bot::{self, BotState};

pub const WEBHOOK_PATH: &str = "/bot";
pub const SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

pub const MSG_OK: &str = "OK";
pub const MSG_DISABLED: &str = "Internal Bot Error";
pub const MSG_BAD_SECRET: &str = "Invalid API Secret";
pub const MSG_PROCESSING_ERROR: &str = "Error processing update";

#[derive(Debug, Serialize)]
pub struct WebhookReply {
    message: &'static str,
}

type WebhookResponse = (StatusCode, Json<WebhookReply>);

fn respond(status: StatusCode, message: &'static str) -> WebhookResponse {
    (status, Json(WebhookReply { message }))
}

fn secret_matches(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

pub fn router(state: BotState) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(handle_update))
        .with_state(state)
}

async fn handle_update(
    State(state): State<BotState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResponse {
    let Some(ctx) = state.context() else {
        error!("Webhook call refused: bot is disabled");
        return respond(StatusCode::INTERNAL_SERVER_ERROR, MSG_DISABLED);
    };

    let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    match provided {
        Some(value) if secret_matches(value, &ctx.config.api_secret) => {}
        Some(_) => {
            warn!("Webhook call refused: secret header does not match");
            return respond(StatusCode::UNAUTHORIZED, MSG_BAD_SECRET);
        }
        None => {
            warn!("Webhook call refused: secret header missing");
            return respond(StatusCode::UNAUTHORIZED, MSG_BAD_SECRET);
        }
    }

    match bot::process_update(ctx, &body).await {
        Ok(()) => respond(StatusCode::OK, MSG_OK),
        Err(e) => {
            error!("Error processing update: {}", e);
            respond(StatusCode::OK, MSG_PROCESSING_ERROR)
        }
    }
}
