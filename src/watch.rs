use std::time::Duration;

use serde_json::Value;

use crate::db::models::{Post, PostWithReplies};
use crate::poll::{HttpFetcher, Poller};
use crate::thread::{render_text, ReplyTree};

/// Poll `url` until interrupted, printing a summary whenever the document changes.
pub async fn watch(url: String, interval: Duration, fetch_timeout: Duration) -> anyhow::Result<()> {
    let fetcher = HttpFetcher::new(url);
    tracing::info!(url = fetcher.url(), interval_ms = interval.as_millis() as u64, "Watching");

    let mut poller = Poller::new(fetcher, interval, |value| {
        println!("{}", render_update(&value));
    })
    .with_fetch_timeout(fetch_timeout);
    poller.set_enabled(true);

    tokio::signal::ctrl_c().await?;
    poller.set_enabled(false);
    tracing::info!("Stopped watching");
    Ok(())
}

/// Human-readable view of a polled document. Post detail responses render
/// their reply thread, post lists render one line per post, anything else
/// is pretty-printed.
pub fn render_update(value: &Value) -> String {
    if let Ok(detail) = serde_json::from_value::<PostWithReplies>(value.clone()) {
        let tree = ReplyTree::new(&detail.replies);
        let mut out = format!(
            "== {} by {} [{} upvotes, {} replies] ==\n",
            detail.post.title,
            detail.post.author,
            detail.post.upvotes,
            detail.replies.len()
        );
        out.push_str(&render_text(&tree.build()));
        return out;
    }

    if let Ok(posts) = serde_json::from_value::<Vec<Post>>(value.clone()) {
        return posts
            .iter()
            .map(|p| format!("#{} {} by {} [{} upvotes]\n", p.id, p.title, p.author, p.upvotes))
            .collect();
    }

    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
