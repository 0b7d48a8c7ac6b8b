use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::{PostId, Reply, ReplyId};
use crate::db::now_iso;

const REPLY_COLUMNS: &str =
    "id, post_id, content, author, upvotes, parent_reply_id, created_at, updated_at";

pub struct NewReply<'a> {
    pub post_id: PostId,
    pub content: &'a str,
    pub author: &'a str,
    pub parent_reply_id: Option<ReplyId>,
}

fn row_to_reply(row: &Row) -> rusqlite::Result<Reply> {
    Ok(Reply {
        id: row.get(0)?,
        post_id: row.get(1)?,
        content: row.get(2)?,
        author: row.get(3)?,
        upvotes: row.get(4)?,
        parent_reply_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub fn insert_reply(conn: &Connection, new: &NewReply) -> rusqlite::Result<Reply> {
    conn.query_row(
        &format!(
            "INSERT INTO replies (post_id, content, author, upvotes, parent_reply_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?5, ?5)
             RETURNING {REPLY_COLUMNS}"
        ),
        params![
            new.post_id,
            new.content,
            new.author,
            new.parent_reply_id,
            now_iso()
        ],
        row_to_reply,
    )
}

/// All replies of a post in creation order.
pub fn replies_for_post(conn: &Connection, post_id: PostId) -> rusqlite::Result<Vec<Reply>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REPLY_COLUMNS} FROM replies
         WHERE post_id = ?1
         ORDER BY created_at ASC, id ASC"
    ))?;
    let replies = stmt
        .query_map(params![post_id], row_to_reply)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(replies)
}

pub fn get_reply(conn: &Connection, id: ReplyId) -> rusqlite::Result<Option<Reply>> {
    conn.query_row(
        &format!("SELECT {REPLY_COLUMNS} FROM replies WHERE id = ?1"),
        params![id],
        row_to_reply,
    )
    .optional()
}

pub fn upvote_reply(conn: &Connection, id: ReplyId) -> rusqlite::Result<Option<Reply>> {
    conn.query_row(
        &format!(
            "UPDATE replies SET upvotes = upvotes + 1, updated_at = ?2
             WHERE id = ?1
             RETURNING {REPLY_COLUMNS}"
        ),
        params![id, now_iso()],
        row_to_reply,
    )
    .optional()
}
