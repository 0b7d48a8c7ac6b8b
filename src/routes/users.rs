use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::db::models::UserProfile;
use crate::db::users::{self, ProfileUpdate};
use crate::error::{AppError, AppResult};
use crate::extractors::{parse_json, CurrentUser, MaybeUser};
use crate::state::AppState;

/// `None` means the field was absent; an explicit `null` arrives as
/// `Some(Value::Null)` and is rejected as the wrong type.
#[derive(Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default, deserialize_with = "present")]
    pub name: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub bio: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub image: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Profile as seen by other users. The email is only present for the owner.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub image: Option<String>,
    pub bio: Option<String>,
    pub created_at: String,
}

impl PublicProfile {
    fn from_profile(profile: UserProfile, show_email: bool) -> Self {
        Self {
            id: profile.id,
            name: profile.name,
            email: show_email.then_some(profile.email),
            image: profile.image,
            bio: profile.bio,
            created_at: profile.created_at,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(my_profile))
        .route("/users/{id}", get(get_user).patch(update_user))
}

impl UpdateUserRequest {
    pub fn validate(self) -> AppResult<ProfileUpdate> {
        let name = match optional_string(self.name, "INVALID_NAME_TYPE", "Name must be a string")? {
            Some(name) => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(AppError::bad_request("EMPTY_NAME", "Name cannot be empty"));
                }
                Some(name.to_string())
            }
            None => None,
        };
        let bio = optional_string(self.bio, "INVALID_BIO_TYPE", "Bio must be a string")?;
        let image = optional_string(self.image, "INVALID_IMAGE_TYPE", "Image must be a string")?;

        Ok(ProfileUpdate { name, bio, image })
    }
}

/// Absent means "leave unchanged"; anything present must be a string.
fn optional_string(
    value: Option<Value>,
    code: &'static str,
    message: &str,
) -> AppResult<Option<String>> {
    match value {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(AppError::bad_request(code, message)),
    }
}

async fn my_profile(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<UserProfile>> {
    let conn = state.db.get()?;
    let profile = users::get_profile(&conn, &user.id)?.ok_or_else(AppError::user_not_found)?;
    Ok(Json(profile))
}

async fn get_user(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<PublicProfile>> {
    let conn = state.db.get()?;
    let profile = users::get_profile(&conn, &id)?.ok_or_else(AppError::user_not_found)?;
    let is_owner = viewer.is_some_and(|v| v.id == profile.id);
    Ok(Json(PublicProfile::from_profile(profile, is_owner)))
}

async fn update_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    body: Bytes,
) -> AppResult<Json<UserProfile>> {
    if user.id != id {
        return Err(AppError::Forbidden(
            "You can only update your own profile".into(),
        ));
    }
    // Parsed only after the ownership check so non-owners always get 403.
    let req: UpdateUserRequest = parse_json(&body)?;
    let update = req.validate()?;

    let conn = state.db.get()?;
    let profile = users::update_profile(&conn, &id, &update)?.ok_or_else(AppError::user_not_found)?;
    tracing::info!(user_id = %id, "Profile updated");
    Ok(Json(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: Value) -> UpdateUserRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn missing_fields_are_untouched() {
        let update = request(json!({})).validate().unwrap();
        assert!(update.name.is_none() && update.bio.is_none() && update.image.is_none());
    }

    #[test]
    fn name_is_trimmed() {
        let update = request(json!({"name": "  Ada  ", "bio": ""})).validate().unwrap();
        assert_eq!(update.name.as_deref(), Some("Ada"));
        assert_eq!(update.bio.as_deref(), Some(""));
    }

    #[test]
    fn type_errors_map_to_codes() {
        let cases = [
            (json!({"name": 5}), "INVALID_NAME_TYPE"),
            (json!({"name": "   "}), "EMPTY_NAME"),
            (json!({"bio": ["x"]}), "INVALID_BIO_TYPE"),
            (json!({"image": false}), "INVALID_IMAGE_TYPE"),
            (json!({"name": null}), "INVALID_NAME_TYPE"),
            (json!({"bio": null}), "INVALID_BIO_TYPE"),
            (json!({"image": null}), "INVALID_IMAGE_TYPE"),
        ];
        for (body, code) in cases {
            let err = request(body.clone()).validate().unwrap_err();
            assert_eq!(err.code(), code, "{body}");
        }
    }

    #[test]
    fn public_profile_hides_email_from_others() {
        let profile = UserProfile {
            id: "u1".into(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            image: None,
            bio: None,
            created_at: "2026-01-01T00:00:00.000Z".into(),
        };
        let public = serde_json::to_value(PublicProfile::from_profile(profile.clone(), false)).unwrap();
        assert!(public.get("email").is_none());
        assert_eq!(public["createdAt"], "2026-01-01T00:00:00.000Z");

        let own = serde_json::to_value(PublicProfile::from_profile(profile, true)).unwrap();
        assert_eq!(own["email"], "ada@example.com");
    }
}
