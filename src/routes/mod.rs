pub mod auth;
pub mod posts;
pub mod replies;
pub mod uploads;
pub mod users;

use axum::Router;
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let uploads_dir = ServeDir::new(state.config.uploads_path());

    let mut app = Router::new()
        .merge(auth::router())
        .merge(posts::router())
        .merge(replies::router())
        .merge(users::router())
        .merge(uploads::router(state.config.storage.max_upload_bytes))
        .nest_service("/uploads", uploads_dir)
        .layer(TraceLayer::new_for_http());

    if state.config.server.cors {
        app = app.layer(CorsLayer::permissive());
    }

    app.with_state(state)
}

/// A JSON string that is non-empty after trimming, returned trimmed.
/// Missing fields, `null`, and non-string values all yield `None`.
pub(crate) fn required_text(value: Option<&Value>) -> Option<String> {
    let text = value?.as_str()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
