use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::models::{Post, PostWithReplies, SortField, SortOrder};
use crate::db::posts::{self, NewPost};
use crate::db::{now_iso, replies};
use crate::error::{AppError, AppResult};
use crate::extractors::{parse_id, CurrentUser, JsonBody};
use crate::routes::required_text;
use crate::state::AppState;
use crate::thread::{ReplyTree, ThreadEntry};

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

// --- Requests ---

#[derive(Deserialize, Default)]
pub struct ListPostsQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub title: Option<Value>,
    pub content: Option<Value>,
    pub image_urls: Option<Value>,
}

#[derive(Debug, PartialEq)]
pub struct ListParams {
    pub limit: i64,
    pub offset: i64,
    pub sort: SortField,
    pub order: SortOrder,
}

#[derive(Serialize)]
struct PostThread<'a> {
    post: &'a Post,
    thread: Vec<ThreadEntry<'a>>,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/{id}", get(get_post))
        .route("/posts/{id}/thread", get(get_thread))
        .route("/posts/{id}/upvote", post(upvote_post))
}

// --- Validation ---

impl ListPostsQuery {
    pub fn validate(&self) -> AppResult<ListParams> {
        let limit = match self.limit.as_deref() {
            None => DEFAULT_LIMIT,
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(n) if n >= 1 => n.min(MAX_LIMIT),
                _ => {
                    return Err(AppError::bad_request(
                        "INVALID_LIMIT",
                        "Invalid limit parameter",
                    ))
                }
            },
        };

        let offset = match self.offset.as_deref() {
            None => 0,
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(n) if n >= 0 => n,
                _ => {
                    return Err(AppError::bad_request(
                        "INVALID_OFFSET",
                        "Invalid offset parameter",
                    ))
                }
            },
        };

        let sort = SortField::parse(self.sort.as_deref().unwrap_or("date")).ok_or_else(|| {
            AppError::bad_request(
                "INVALID_SORT",
                "Invalid sort parameter. Must be \"date\" or \"upvotes\"",
            )
        })?;

        let order = SortOrder::parse(self.order.as_deref().unwrap_or("desc")).ok_or_else(|| {
            AppError::bad_request(
                "INVALID_ORDER",
                "Invalid order parameter. Must be \"asc\" or \"desc\"",
            )
        })?;

        Ok(ListParams {
            limit,
            offset,
            sort,
            order,
        })
    }
}

fn parse_image_urls(value: Option<&Value>) -> AppResult<Option<Vec<String>>> {
    let invalid = || {
        AppError::bad_request(
            "INVALID_IMAGE_URLS",
            "imageUrls must be an array of non-empty strings",
        )
    };

    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => {
            let urls = items
                .iter()
                .map(|item| required_text(Some(item)).ok_or_else(invalid))
                .collect::<AppResult<Vec<_>>>()?;
            Ok(if urls.is_empty() { None } else { Some(urls) })
        }
        Some(_) => Err(invalid()),
    }
}

// --- Handlers ---

async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<ListPostsQuery>,
) -> AppResult<Json<Vec<Post>>> {
    let params = query.validate()?;
    let conn = state.db.get()?;
    let posts = posts::list_posts(
        &conn,
        params.sort,
        params.order,
        params.limit,
        params.offset,
    )?;
    Ok(Json(posts))
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(req): JsonBody<CreatePostRequest>,
) -> AppResult<Response> {
    let title = required_text(req.title.as_ref()).ok_or_else(|| {
        AppError::bad_request("MISSING_TITLE", "Title is required and must not be empty")
    })?;
    let content = required_text(req.content.as_ref()).ok_or_else(|| {
        AppError::bad_request(
            "MISSING_CONTENT",
            "Content is required and must not be empty",
        )
    })?;
    let image_urls = parse_image_urls(req.image_urls.as_ref())?;

    let post = {
        let conn = state.db.get()?;
        posts::insert_post(
            &conn,
            &NewPost {
                title: &title,
                content: &content,
                author: &user.name,
                user_id: Some(&user.id),
                image_urls: image_urls.as_deref(),
                upvotes: 0,
                created_at: now_iso(),
            },
        )?
    };

    tracing::info!(post_id = post.id, user_id = %user.id, "Post created");
    Ok((StatusCode::CREATED, Json(post)).into_response())
}

async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<PostWithReplies>> {
    let post_id = parse_id(&id, "INVALID_ID", "Valid ID is required")?;
    let conn = state.db.get()?;
    let post = posts::get_post(&conn, post_id)?.ok_or_else(AppError::post_not_found)?;
    let replies = replies::replies_for_post(&conn, post_id)?;
    Ok(Json(PostWithReplies { post, replies }))
}

async fn get_thread(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Response> {
    let post_id = parse_id(&id, "INVALID_ID", "Valid ID is required")?;
    let (post, replies) = {
        let conn = state.db.get()?;
        let post = posts::get_post(&conn, post_id)?.ok_or_else(AppError::post_not_found)?;
        (post, replies::replies_for_post(&conn, post_id)?)
    };

    let tree = ReplyTree::new(&replies);
    let body = PostThread {
        post: &post,
        thread: tree.build(),
    };
    Ok(Json(body).into_response())
}

async fn upvote_post(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Post>> {
    let post_id = parse_id(&id, "INVALID_ID", "Valid ID is required")?;
    let conn = state.db.get()?;
    let post = posts::upvote_post(&conn, post_id)?.ok_or_else(AppError::post_not_found)?;
    Ok(Json(post))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> ListPostsQuery {
        let mut q = ListPostsQuery::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "limit" => q.limit = v,
                "offset" => q.offset = v,
                "sort" => q.sort = v,
                "order" => q.order = v,
                _ => unreachable!(),
            }
        }
        q
    }

    #[test]
    fn defaults_are_date_desc_first_page() {
        assert_eq!(
            query(&[]).validate().unwrap(),
            ListParams {
                limit: DEFAULT_LIMIT,
                offset: 0,
                sort: SortField::Date,
                order: SortOrder::Desc,
            }
        );
    }

    #[test]
    fn limit_is_clamped_to_max() {
        let params = query(&[("limit", "500")]).validate().unwrap();
        assert_eq!(params.limit, MAX_LIMIT);
    }

    #[test]
    fn invalid_params_map_to_codes() {
        let cases = [
            (("limit", "0"), "INVALID_LIMIT"),
            (("limit", "ten"), "INVALID_LIMIT"),
            (("offset", "-1"), "INVALID_OFFSET"),
            (("sort", "title"), "INVALID_SORT"),
            (("order", "sideways"), "INVALID_ORDER"),
        ];
        for ((k, v), code) in cases {
            let err = query(&[(k, v)]).validate().unwrap_err();
            assert_eq!(err.code(), code, "{k}={v}");
        }
    }

    #[test]
    fn image_urls_validation() {
        use serde_json::json;
        assert_eq!(parse_image_urls(None).unwrap(), None);
        assert_eq!(parse_image_urls(Some(&json!([]))).unwrap(), None);
        assert_eq!(
            parse_image_urls(Some(&json!([" /uploads/a.png "]))).unwrap(),
            Some(vec!["/uploads/a.png".to_string()])
        );
        assert!(parse_image_urls(Some(&json!("/uploads/a.png"))).is_err());
        assert!(parse_image_urls(Some(&json!(["ok", 3]))).is_err());
        assert!(parse_image_urls(Some(&json!([""]))).is_err());
    }
}
