use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::{Post, PostId, SortField, SortOrder};
use crate::db::now_iso;

const POST_COLUMNS: &str =
    "id, title, content, author, user_id, upvotes, image_urls, created_at, updated_at";

pub struct NewPost<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub author: &'a str,
    pub user_id: Option<&'a str>,
    pub image_urls: Option<&'a [String]>,
    pub upvotes: i64,
    pub created_at: String,
}

fn row_to_post(row: &Row) -> rusqlite::Result<Post> {
    let image_urls: Option<String> = row.get(6)?;
    let image_urls = image_urls
        .map(|raw| serde_json::from_str::<Vec<String>>(&raw))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        author: row.get(3)?,
        user_id: row.get(4)?,
        upvotes: row.get(5)?,
        image_urls,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub fn insert_post(conn: &Connection, new: &NewPost) -> rusqlite::Result<Post> {
    let image_urls = new
        .image_urls
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

    conn.query_row(
        &format!(
            "INSERT INTO posts (title, content, author, user_id, upvotes, image_urls, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             RETURNING {POST_COLUMNS}"
        ),
        params![
            new.title,
            new.content,
            new.author,
            new.user_id,
            new.upvotes,
            image_urls,
            new.created_at
        ],
        row_to_post,
    )
}

pub fn list_posts(
    conn: &Connection,
    sort: SortField,
    order: SortOrder,
    limit: i64,
    offset: i64,
) -> rusqlite::Result<Vec<Post>> {
    // Both interpolated fragments come from closed enums, never from input.
    let sql = format!(
        "SELECT {POST_COLUMNS} FROM posts ORDER BY {col} {dir}, id {dir} LIMIT ?1 OFFSET ?2",
        col = sort.column(),
        dir = order.keyword(),
    );
    let mut stmt = conn.prepare(&sql)?;
    let posts = stmt
        .query_map(params![limit, offset], row_to_post)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

pub fn get_post(conn: &Connection, id: PostId) -> rusqlite::Result<Option<Post>> {
    conn.query_row(
        &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
        params![id],
        row_to_post,
    )
    .optional()
}

/// Increment the upvote counter and return the updated row in a single
/// statement, so concurrent upvotes cannot lose updates.
pub fn upvote_post(conn: &Connection, id: PostId) -> rusqlite::Result<Option<Post>> {
    conn.query_row(
        &format!(
            "UPDATE posts SET upvotes = upvotes + 1, updated_at = ?2
             WHERE id = ?1
             RETURNING {POST_COLUMNS}"
        ),
        params![id, now_iso()],
        row_to_post,
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn new_post<'a>(title: &'a str, upvotes: i64, created_at: &str) -> NewPost<'a> {
        NewPost {
            title,
            content: "body",
            author: "alice",
            user_id: None,
            image_urls: None,
            upvotes,
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn insert_assigns_monotonic_ids_and_zero_upvotes() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let a = insert_post(&conn, &new_post("a", 0, &now_iso())).unwrap();
        let b = insert_post(&conn, &new_post("b", 0, &now_iso())).unwrap();
        assert!(b.id > a.id);
        assert_eq!(a.upvotes, 0);
        assert_eq!(a.created_at, a.updated_at);
        assert_eq!(a.user_id, None);
    }

    #[test]
    fn image_urls_round_trip_through_json_column() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let urls = vec!["/uploads/a.png".to_string(), "/uploads/b.jpg".to_string()];
        let mut new = new_post("pics", 0, &now_iso());
        new.image_urls = Some(&urls);
        let post = insert_post(&conn, &new).unwrap();
        let fetched = get_post(&conn, post.id).unwrap().unwrap();
        assert_eq!(fetched.image_urls, Some(urls));
    }

    #[test]
    fn list_sorts_by_upvotes_ascending() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        for (title, upvotes) in [("x", 5), ("y", 1), ("z", 3)] {
            insert_post(&conn, &new_post(title, upvotes, &now_iso())).unwrap();
        }
        let posts = list_posts(&conn, SortField::Upvotes, SortOrder::Asc, 10, 0).unwrap();
        let votes: Vec<i64> = posts.iter().map(|p| p.upvotes).collect();
        assert_eq!(votes, vec![1, 3, 5]);
    }

    #[test]
    fn list_sorts_by_date_descending_with_offset() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        insert_post(&conn, &new_post("old", 0, "2025-01-01T00:00:00.000Z")).unwrap();
        insert_post(&conn, &new_post("mid", 0, "2025-02-01T00:00:00.000Z")).unwrap();
        insert_post(&conn, &new_post("new", 0, "2025-03-01T00:00:00.000Z")).unwrap();

        let page = list_posts(&conn, SortField::Date, SortOrder::Desc, 2, 1).unwrap();
        let titles: Vec<&str> = page.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["mid", "old"]);
    }

    #[test]
    fn get_missing_post_is_none() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        assert!(get_post(&conn, 42).unwrap().is_none());
    }

    #[test]
    fn upvote_increments_and_touches_updated_at() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let post = insert_post(&conn, &new_post("p", 7, "2025-01-01T00:00:00.000Z")).unwrap();
        let updated = upvote_post(&conn, post.id).unwrap().unwrap();
        assert_eq!(updated.upvotes, 8);
        assert_ne!(updated.updated_at, post.updated_at);
        assert_eq!(updated.created_at, post.created_at);
    }

    #[test]
    fn upvote_missing_post_is_none() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        assert!(upvote_post(&conn, 9).unwrap().is_none());
    }

    #[test]
    fn concurrent_upvotes_do_not_lose_updates() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = crate::db::create_pool(&tmp.path().join("race.db")).unwrap();
        crate::db::run_migrations(&pool).unwrap();
        let post_id = {
            let conn = pool.get().unwrap();
            insert_post(&conn, &new_post("hot", 10, &now_iso())).unwrap().id
        };

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    let conn = pool.get().unwrap();
                    for _ in 0..5 {
                        upvote_post(&conn, post_id).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let conn = pool.get().unwrap();
        let post = get_post(&conn, post_id).unwrap().unwrap();
        assert_eq!(post.upvotes, 10 + 8 * 5);
    }
}
