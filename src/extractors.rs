use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::{header, HeaderMap};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::auth::session;
use crate::error::AppError;
use crate::state::AppState;

/// Represents the currently authenticated user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub name: String,
}

/// Extractor that requires authentication.
/// Accepts `Authorization: Bearer <token>` or the session cookie; returns 401 otherwise.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_session_token(&parts.headers, &state.config.auth.cookie_name)
            .ok_or_else(|| AppError::unauthorized("Unauthorized - please sign in"))?;

        let conn = state.db.get()?;
        let (id, name) = session::user_for_token(&conn, token)?
            .ok_or_else(|| AppError::unauthorized("Unauthorized - session is invalid or expired"))?;

        Ok(CurrentUser { id, name })
    }
}

/// Optional user extractor. Returns None instead of 401 when not authenticated.
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(AppError::Unauthorized { .. }) => Ok(MaybeUser(None)),
            Err(e) => Err(e),
        }
    }
}

/// `Json` with rejections rendered as the API's own `{error, code}` body.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(AppError::bad_request(
                "INVALID_JSON",
                rejection.body_text(),
            )),
        }
    }
}

/// Deserialize a raw request body the same way [`JsonBody`] would, for
/// handlers that must authorize before looking at the body.
pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::bad_request("INVALID_JSON", format!("Invalid JSON body: {e}")))
}

/// Parse a path identifier that must be a positive integer.
pub fn parse_id(raw: &str, code: &'static str, message: &str) -> Result<i64, AppError> {
    match raw.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(AppError::bad_request(code, message)),
    }
}

/// Session token from the bearer header, falling back to the session cookie.
pub fn extract_session_token<'a>(headers: &'a HeaderMap, cookie_name: &str) -> Option<&'a str> {
    bearer_token(headers).or_else(|| cookie_value(headers, cookie_name))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name && !val.is_empty() {
                Some(val)
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn headers_with(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut builder = Request::builder().uri("/");
        for (k, v) in pairs {
            builder = builder.header(*k, *v);
        }
        builder.body(()).unwrap().into_parts().0.headers
    }

    #[test]
    fn parse_json_maps_syntax_errors_to_invalid_json() {
        let value: serde_json::Value = parse_json(br#"{"name":"Ada"}"#).unwrap();
        assert_eq!(value["name"], "Ada");

        let err = parse_json::<serde_json::Value>(b"{not json").unwrap_err();
        assert_eq!(err.code(), "INVALID_JSON");
    }

    #[test]
    fn bearer_header_is_preferred() {
        let headers = headers_with(&[
            ("authorization", "Bearer abc123"),
            ("cookie", "agora_session=fromcookie"),
        ]);
        assert_eq!(extract_session_token(&headers, "agora_session"), Some("abc123"));
    }

    #[test]
    fn cookie_is_used_without_bearer() {
        let headers = headers_with(&[("cookie", "theme=dark; agora_session=tok; other=1")]);
        assert_eq!(extract_session_token(&headers, "agora_session"), Some("tok"));
    }

    #[test]
    fn missing_or_empty_credentials_yield_none() {
        assert_eq!(extract_session_token(&headers_with(&[]), "agora_session"), None);
        let headers = headers_with(&[("authorization", "Bearer "), ("cookie", "agora_session=")]);
        assert_eq!(extract_session_token(&headers, "agora_session"), None);
        let basic = headers_with(&[("authorization", "Basic dXNlcjpwYXNz")]);
        assert_eq!(extract_session_token(&basic, "agora_session"), None);
    }

    #[test]
    fn parse_id_requires_positive_integer() {
        assert_eq!(parse_id("12", "INVALID_ID", "bad").unwrap(), 12);
        for raw in ["0", "-3", "abc", "1.5", ""] {
            let err = parse_id(raw, "INVALID_ID", "bad").unwrap_err();
            assert_eq!(err.code(), "INVALID_ID");
        }
    }
}
