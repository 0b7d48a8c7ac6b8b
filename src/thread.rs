//! Threaded reply reconstruction.
//!
//! Replies are stored flat, each with an optional `parent_reply_id`. This
//! module turns one post's replies into a forest for display. It is pure:
//! no I/O, and the input slice is never modified.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use chrono::DateTime;
use serde::Serialize;

use crate::db::models::{Reply, ReplyId};

/// Nesting beyond this depth keeps its logical placement but gets no
/// further visual indentation.
pub const MAX_INDENT_DEPTH: usize = 5;

/// What to do with replies whose parent is not in the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrphanPolicy {
    /// Exclude them from every subtree.
    #[default]
    Drop,
    /// Show them as top-level replies.
    PromoteToTopLevel,
}

/// One reply in display order, with its nesting level.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadEntry<'a> {
    pub reply: &'a Reply,
    pub depth: usize,
    /// Visual indentation level, `depth` capped at [`MAX_INDENT_DEPTH`].
    pub indent: usize,
}

pub struct ReplyTree<'a> {
    roots: Vec<&'a Reply>,
    children: HashMap<ReplyId, Vec<&'a Reply>>,
    orphans: Vec<&'a Reply>,
}

/// Sort key: parseable timestamps first in chronological order, anything
/// unparseable after them. Ties are left to the stable sort.
fn created_key(reply: &Reply) -> (bool, i64) {
    match DateTime::parse_from_rfc3339(&reply.created_at) {
        Ok(ts) => (false, ts.timestamp_millis()),
        Err(_) => (true, 0),
    }
}

fn sort_chronologically(replies: &mut [&Reply]) {
    // `sort_by_key` is stable, which keeps fetch order for equal timestamps.
    replies.sort_by_key(|r| created_key(r));
}

impl<'a> ReplyTree<'a> {
    pub fn new(replies: &'a [Reply]) -> Self {
        Self::with_policy(replies, OrphanPolicy::default())
    }

    pub fn with_policy(replies: &'a [Reply], policy: OrphanPolicy) -> Self {
        let known: HashSet<ReplyId> = replies.iter().map(|r| r.id).collect();

        let mut roots = Vec::new();
        let mut orphans = Vec::new();
        let mut children: HashMap<ReplyId, Vec<&'a Reply>> = HashMap::new();

        for reply in replies {
            match reply.parent_reply_id {
                None => roots.push(reply),
                Some(parent) if known.contains(&parent) => {
                    children.entry(parent).or_default().push(reply)
                }
                Some(_) => {
                    orphans.push(reply);
                    if policy == OrphanPolicy::PromoteToTopLevel {
                        roots.push(reply);
                    }
                }
            }
        }

        sort_chronologically(&mut roots);
        sort_chronologically(&mut orphans);
        for list in children.values_mut() {
            sort_chronologically(list);
        }

        Self {
            roots,
            children,
            orphans,
        }
    }

    /// Direct children of `parent` (`None` = top level), oldest first.
    pub fn children_of(&self, parent: Option<ReplyId>) -> Vec<&'a Reply> {
        match parent {
            None => self.roots.clone(),
            Some(id) => self.children.get(&id).cloned().unwrap_or_default(),
        }
    }

    /// Replies whose declared parent is absent from the collection.
    pub fn orphans(&self) -> &[&'a Reply] {
        &self.orphans
    }

    /// Flatten the forest into pre-order: each reply is followed by its
    /// subtree, siblings oldest first.
    ///
    /// Walks with an explicit stack, so arbitrarily deep reply chains cost
    /// heap rather than call frames. Only nodes reachable from a root are
    /// visited, so a corrupted parent cycle is left out rather than looping
    /// forever.
    pub fn build(&self) -> Vec<ThreadEntry<'a>> {
        let mut out = Vec::new();
        // Pushed newest first so the oldest sibling is popped first.
        let mut stack: Vec<(&'a Reply, usize)> = self.roots.iter().rev().map(|r| (*r, 0)).collect();

        while let Some((reply, depth)) = stack.pop() {
            out.push(ThreadEntry {
                reply,
                depth,
                indent: depth.min(MAX_INDENT_DEPTH),
            });
            if let Some(kids) = self.children.get(&reply.id) {
                stack.extend(kids.iter().rev().map(|k| (*k, depth + 1)));
            }
        }
        out
    }
}

/// Render a thread as indented plain text, two spaces per indent level.
pub fn render_text(entries: &[ThreadEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let pad = "  ".repeat(entry.indent);
        let reply = entry.reply;
        let _ = writeln!(
            out,
            "{pad}- {} [{} upvotes] #{}: {}",
            reply.author, reply.upvotes, reply.id, reply.content
        );
    }
    out
}
