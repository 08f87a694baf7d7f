use axum::{body::Bytes, extract::State};
use metrics::counter;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::AppState;
use crate::errors::{Error, Result};
use crate::notifications::{COPY_LINK_CALLBACK, extract_file_url};
use crate::telegram::types::CallbackQuery;

const LINK_NOT_FOUND: &str = "Link not found";

#[utoipa::path(
    post,
    path = "/webhook",
    tag = "telegram",
    summary = "Telegram webhook",
    description = "Receives updates from Telegram. Presses of the \"copy link\" button are answered \
                   with an alert holding the file URL; every other update is acknowledged and ignored.",
    request_body(content_type = "application/json", description = "Telegram Update object"),
    responses(
        (status = 200, description = "Update accepted", body = String),
        (status = 500, description = "Body is not a Telegram update", body = String)
    )
)]
#[instrument(skip_all)]
pub async fn telegram_webhook(State(state): State<AppState>, body: Bytes) -> Result<&'static str> {
    let update: Value = serde_json::from_slice(&body).map_err(|e| Error::InvalidWebhookPayload { message: e.to_string() })?;

    // Only a callback query we can act on is decoded; any other shape is acknowledged
    let Some(query) = update
        .get("callback_query")
        .and_then(|query| serde_json::from_value::<CallbackQuery>(query.clone()).ok())
    else {
        debug!(update_id = ?update.get("update_id"), "Ignoring update without usable callback query");
        return Ok("OK");
    };

    if query.data.as_deref() != Some(COPY_LINK_CALLBACK) {
        debug!(data = ?query.data, "Ignoring unknown callback data");
        return Ok("OK");
    }

    let url = query
        .message
        .as_ref()
        .and_then(|message| extract_file_url(message.text.as_deref()?, &message.entities));
    let answer = url.as_deref().unwrap_or(LINK_NOT_FOUND);

    info!(callback_query_id = %query.id, found = url.is_some(), "Answering copy link request");
    counter!("tgrelay_copy_link_requests_total", "found" => url.is_some().to_string()).increment(1);

    if let Err(e) = state.telegram.answer_callback_query(&query.id, answer, true).await {
        warn!(error = %e, callback_query_id = %query.id, "Failed to answer callback query");
    }

    Ok("OK")
}
