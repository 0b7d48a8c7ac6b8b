use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::Connection;

use crate::db::models::Post;
use crate::db::posts::{self, NewPost};

struct SamplePost {
    title: &'static str,
    author: &'static str,
    content: &'static str,
    upvotes: i64,
    days_ago: i64,
}

const SAMPLE_POSTS: &[SamplePost] = &[
    SamplePost {
        title: "Welcome to the Forum!",
        author: "Admin",
        content: "Welcome everyone! Please read our community guidelines: Be respectful, \
                  stay on topic, and help each other learn. We're excited to build this \
                  community together!",
        upvotes: 45,
        days_ago: 7,
    },
    SamplePost {
        title: "What's your favorite framework?",
        author: "DevUser",
        content: "I've been exploring different web frameworks lately. Currently loving \
                  React and Next.js for the great developer experience. What are you all \
                  using for your projects?",
        upvotes: 28,
        days_ago: 5,
    },
    SamplePost {
        title: "Tips for beginners",
        author: "ExpertCoder",
        content: "Starting your coding journey? Here are my top tips: 1) Build projects, \
                  not just tutorials. 2) Read documentation. 3) Don't be afraid to ask \
                  questions. 4) Consistency beats intensity. Keep coding!",
        upvotes: 50,
        days_ago: 3,
    },
    SamplePost {
        title: "Project showcase thread",
        author: "Creator",
        content: "Share what you've been working on! Whether it's a small script or a full \
                  application, we'd love to see it. Drop your GitHub links and tell us about \
                  your projects.",
        upvotes: 12,
        days_ago: 1,
    },
];

/// Insert the sample posts, back-dated relative to `now`, in one transaction.
pub fn seed_posts(conn: &mut Connection, now: DateTime<Utc>) -> rusqlite::Result<Vec<Post>> {
    let tx = conn.transaction()?;
    let mut inserted = Vec::with_capacity(SAMPLE_POSTS.len());
    for sample in SAMPLE_POSTS {
        let created_at = (now - Duration::days(sample.days_ago))
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        inserted.push(posts::insert_post(
            &tx,
            &NewPost {
                title: sample.title,
                content: sample.content,
                author: sample.author,
                user_id: None,
                image_urls: None,
                upvotes: sample.upvotes,
                created_at,
            },
        )?);
    }
    tx.commit()?;
    Ok(inserted)
}
