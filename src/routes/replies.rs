use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;

use crate::db::models::{Reply, ReplyId};
use crate::db::replies::{self, NewReply};
use crate::db::posts;
use crate::error::{AppError, AppResult};
use crate::extractors::{parse_id, JsonBody};
use crate::routes::required_text;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReplyRequest {
    pub content: Option<Value>,
    pub author: Option<Value>,
    pub parent_reply_id: Option<Value>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts/{id}/replies", post(create_reply))
        .route("/replies/{id}/upvote", post(upvote_reply))
}

/// `parentReplyId` may arrive as a number or a numeric string.
fn parse_parent_id(value: Option<&Value>) -> AppResult<Option<ReplyId>> {
    let invalid = || AppError::bad_request("INVALID_PARENT_REPLY_ID", "Invalid parent reply ID");
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(id) if id > 0 => Ok(Some(id)),
            _ => Err(invalid()),
        },
        Some(Value::String(s)) => parse_id(s, "INVALID_PARENT_REPLY_ID", "Invalid parent reply ID")
            .map(Some),
        Some(_) => Err(invalid()),
    }
}

async fn create_reply(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<CreateReplyRequest>,
) -> AppResult<Response> {
    let post_id = parse_id(&id, "INVALID_POST_ID", "Valid post ID is required")?;
    let content = required_text(req.content.as_ref()).ok_or_else(|| {
        AppError::bad_request(
            "MISSING_CONTENT",
            "Content is required and must not be empty",
        )
    })?;
    let author = required_text(req.author.as_ref()).ok_or_else(|| {
        AppError::bad_request("MISSING_AUTHOR", "Author is required and must not be empty")
    })?;
    let parent_reply_id = parse_parent_id(req.parent_reply_id.as_ref())?;

    let conn = state.db.get()?;
    if posts::get_post(&conn, post_id)?.is_none() {
        return Err(AppError::post_not_found());
    }

    if let Some(parent_id) = parent_reply_id {
        let parent = replies::get_reply(&conn, parent_id)?.ok_or_else(|| {
            AppError::not_found("PARENT_REPLY_NOT_FOUND", "Parent reply not found")
        })?;
        if parent.post_id != post_id {
            return Err(AppError::bad_request(
                "PARENT_REPLY_MISMATCH",
                "Parent reply does not belong to this post",
            ));
        }
    }

    let reply = replies::insert_reply(
        &conn,
        &NewReply {
            post_id,
            content: &content,
            author: &author,
            parent_reply_id,
        },
    )?;

    tracing::info!(reply_id = reply.id, post_id, "Reply created");
    Ok((StatusCode::CREATED, Json(reply)).into_response())
}

async fn upvote_reply(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Reply>> {
    let reply_id = parse_id(&id, "INVALID_ID", "Valid ID is required")?;
    let conn = state.db.get()?;
    let reply = replies::upvote_reply(&conn, reply_id)?
        .ok_or_else(|| AppError::not_found("REPLY_NOT_FOUND", "Reply not found"))?;
    Ok(Json(reply))
}
