//! Chat routes: the app view, `/run`, translation and deletes.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use crabai_agent::{AskRequest, RequestContext};
use crabai_core::conversation::{ChatId, TurnId};
use crabai_core::error::{StoreError, ValidationError};
use crabai_core::provider::{AnswerPrompt, AnswerSource};
use crabai_store::ChatView;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::auth::{CurrentUser, wants_json};
use crate::{ApiError, SharedState, api_error};

fn store_failure(e: StoreError) -> ApiError {
    error!(error = %e, "Store operation failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
}

// --- App view ---

pub(crate) async fn app_handler(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> Result<Json<ChatView>, ApiError> {
    let view = state
        .coordinator
        .conversations()
        .chat_view(user.user_id, None)
        .await
        .map_err(store_failure)?;
    Ok(Json(view))
}

pub(crate) async fn app_chat_handler(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(chat_id): Path<i64>,
) -> Result<Json<ChatView>, ApiError> {
    let view = state
        .coordinator
        .conversations()
        .chat_view(user.user_id, Some(ChatId(chat_id)))
        .await
        .map_err(store_failure)?;
    Ok(Json(view))
}

pub(crate) async fn new_chat_handler(_user: CurrentUser) -> Redirect {
    Redirect::to("/app")
}

// --- Run ---

/// Query string of `/run`. Everything arrives as text from the page.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RunParams {
    query: Option<String>,
    chat_id: Option<String>,
    detailed: Option<String>,
    from_history: Option<String>,
    ajax: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RunResponse {
    query: String,
    result: String,
    ai_success: bool,
    history_id: Option<TurnId>,
    chat_id: Option<ChatId>,
}

fn flag(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "on" | "yes"
        )
    })
}

/// `"null"`, empty and unparsable ids all mean "no chat".
fn parse_chat_id(raw: Option<&str>) -> Option<ChatId> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty() && *s != "null")?;
    match raw.parse::<i64>() {
        Ok(id) => Some(ChatId(id)),
        Err(_) => {
            warn!(chat_id = %raw, "Ignoring malformed chat_id");
            None
        }
    }
}

pub(crate) async fn run_handler(
    State(state): State<SharedState>,
    user: CurrentUser,
    headers: HeaderMap,
    Query(params): Query<RunParams>,
) -> Result<Response, ApiError> {
    let ajax = flag(params.ajax.as_deref()) || wants_json(&headers);
    let request = AskRequest::new(params.query.unwrap_or_default())
        .in_chat(parse_chat_id(params.chat_id.as_deref()))
        .detailed(flag(params.detailed.as_deref()))
        .from_history(flag(params.from_history.as_deref()));

    let ctx = RequestContext::new(user.user_id);
    let reply = match state.coordinator.answer(&ctx, request).await {
        Ok(reply) => reply,
        Err(_) if !ajax => return Ok(Redirect::to("/app").into_response()),
        Err(e) => return Err(api_error(StatusCode::BAD_REQUEST, e.to_string())),
    };

    if !ajax {
        let target = match reply.chat_id {
            Some(id) => format!("/app/{id}"),
            None => "/app".to_string(),
        };
        return Ok(Redirect::to(&target).into_response());
    }

    Ok(Json(RunResponse {
        query: reply.query,
        result: reply.result,
        ai_success: reply.success,
        history_id: reply.turn_id,
        chat_id: reply.chat_id,
    })
    .into_response())
}

// --- Translation ---

#[derive(Debug, Deserialize)]
pub(crate) struct TranslateRequest {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct TranslateResponse {
    translation: String,
}

pub(crate) async fn translate_handler(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Json(payload): Json<TranslateRequest>,
) -> Result<Json<TranslateResponse>, ApiError> {
    if payload.text.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            ValidationError::EmptyText.to_string(),
        ));
    }

    let Some(translator) = &state.translator else {
        return Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Translation is not configured",
        ));
    };

    match translator.attempt(&AnswerPrompt::bare(payload.text)).await {
        Ok(translation) => Ok(Json(TranslateResponse { translation })),
        Err(e) => {
            warn!(provider = %translator.name(), error = %e, "Translation failed");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

// --- Deletes ---

pub(crate) async fn delete_history_handler(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<&'static str, ApiError> {
    state
        .coordinator
        .conversations()
        .delete_turn(user.user_id, TurnId(id))
        .await
        .map_err(store_failure)?;
    Ok("OK")
}

pub(crate) async fn delete_chat_handler(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<&'static str, ApiError> {
    state
        .coordinator
        .conversations()
        .delete_chat(user.user_id, ChatId(id))
        .await
        .map_err(store_failure)?;
    Ok("OK")
}

pub(crate) async fn delete_all_handler(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> Result<&'static str, ApiError> {
    let removed = state
        .coordinator
        .conversations()
        .delete_all_for_user(user.user_id)
        .await
        .map_err(store_failure)?;
    info!(user_id = %user.user_id, removed, "History cleared");
    Ok("OK")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_id_parsing() {
        assert_eq!(parse_chat_id(None), None);
        assert_eq!(parse_chat_id(Some("")), None);
        assert_eq!(parse_chat_id(Some("null")), None);
        assert_eq!(parse_chat_id(Some("abc")), None);
        assert_eq!(parse_chat_id(Some(" 42 ")), Some(ChatId(42)));
    }

    #[test]
    fn flag_parsing() {
        assert!(flag(Some("true")));
        assert!(flag(Some("TRUE")));
        assert!(flag(Some("1")));
        assert!(!flag(Some("false")));
        assert!(!flag(Some("")));
        assert!(!flag(None));
    }
}
