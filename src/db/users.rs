use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::{UserCredentials, UserProfile};
use crate::db::now_iso;

const PROFILE_COLUMNS: &str = "id, name, email, image, bio, created_at";

fn row_to_profile(row: &Row) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        image: row.get(3)?,
        bio: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Partial profile update. `None` leaves the column untouched.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub image: Option<String>,
}

pub fn insert_user(
    conn: &Connection,
    name: &str,
    email: &str,
    password_hash: &str,
) -> rusqlite::Result<UserProfile> {
    let id = uuid::Uuid::now_v7().to_string();
    conn.query_row(
        &format!(
            "INSERT INTO users (id, name, email, password_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             RETURNING {PROFILE_COLUMNS}"
        ),
        params![id, name, email, password_hash, now_iso()],
        row_to_profile,
    )
}

pub fn email_taken(conn: &Connection, email: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE email = ?1",
        params![email],
        |row| row.get(0),
    )
}

pub fn get_profile(conn: &Connection, id: &str) -> rusqlite::Result<Option<UserProfile>> {
    conn.query_row(
        &format!("SELECT {PROFILE_COLUMNS} FROM users WHERE id = ?1"),
        params![id],
        row_to_profile,
    )
    .optional()
}

pub fn get_credentials_by_email(
    conn: &Connection,
    email: &str,
) -> rusqlite::Result<Option<UserCredentials>> {
    conn.query_row(
        &format!("SELECT {PROFILE_COLUMNS}, password_hash FROM users WHERE email = ?1"),
        params![email],
        |row| {
            Ok(UserCredentials {
                profile: row_to_profile(row)?,
                password_hash: row.get(6)?,
            })
        },
    )
    .optional()
}

pub fn update_profile(
    conn: &Connection,
    id: &str,
    update: &ProfileUpdate,
) -> rusqlite::Result<Option<UserProfile>> {
    conn.query_row(
        &format!(
            "UPDATE users SET
                name = COALESCE(?2, name),
                bio = COALESCE(?3, bio),
                image = COALESCE(?4, image),
                updated_at = ?5
             WHERE id = ?1
             RETURNING {PROFILE_COLUMNS}"
        ),
        params![id, update.name, update.bio, update.image, now_iso()],
        row_to_profile,
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[test]
    fn insert_and_fetch_profile() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let user = insert_user(&conn, "Alice", "alice@example.com", "hash").unwrap();
        assert!(uuid::Uuid::parse_str(&user.id).is_ok());

        let fetched = get_profile(&conn, &user.id).unwrap().unwrap();
        assert_eq!(fetched, user);
        assert!(email_taken(&conn, "alice@example.com").unwrap());
        assert!(!email_taken(&conn, "bob@example.com").unwrap());
    }

    #[test]
    fn duplicate_email_is_rejected_by_schema() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        insert_user(&conn, "Alice", "alice@example.com", "hash").unwrap();
        assert!(insert_user(&conn, "Imposter", "alice@example.com", "hash").is_err());
    }

    #[test]
    fn credentials_lookup_carries_hash() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        insert_user(&conn, "Alice", "alice@example.com", "secret-hash").unwrap();
        let creds = get_credentials_by_email(&conn, "alice@example.com")
            .unwrap()
            .unwrap();
        assert_eq!(creds.password_hash, "secret-hash");
        assert_eq!(creds.profile.name, "Alice");
        assert!(get_credentials_by_email(&conn, "nobody@example.com")
            .unwrap()
            .is_none());
    }

    #[test]
    fn partial_update_only_touches_given_fields() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let user = insert_user(&conn, "Alice", "alice@example.com", "hash").unwrap();

        let updated = update_profile(
            &conn,
            &user.id,
            &ProfileUpdate {
                bio: Some("hello".into()),
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();
        assert_eq!(updated.name, "Alice");
        assert_eq!(updated.bio.as_deref(), Some("hello"));
        assert_eq!(updated.image, None);

        let renamed = update_profile(
            &conn,
            &user.id,
            &ProfileUpdate {
                name: Some("Al".into()),
                image: Some("/uploads/a.png".into()),
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();
        assert_eq!(renamed.name, "Al");
        assert_eq!(renamed.bio.as_deref(), Some("hello"));
        assert_eq!(renamed.image.as_deref(), Some("/uploads/a.png"));
    }

    #[test]
    fn update_missing_user_is_none() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let result = update_profile(&conn, "ghost", &ProfileUpdate::default()).unwrap();
        assert!(result.is_none());
    }
}
