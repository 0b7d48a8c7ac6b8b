use serde::{Deserialize, Serialize};

pub type PostId = i64;
pub type ReplyId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub content: String,
    pub author: String,
    pub user_id: Option<String>,
    pub upvotes: i64,
    pub image_urls: Option<Vec<String>>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: ReplyId,
    pub post_id: PostId,
    pub content: String,
    pub author: String,
    pub upvotes: i64,
    pub parent_reply_id: Option<ReplyId>,
    pub created_at: String,
    pub updated_at: String,
}

/// Publicly visible user fields. Never carries the password hash or the
/// internal `updated_at` timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
    pub bio: Option<String>,
    pub created_at: String,
}

/// Credentials row used only by sign-in.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub profile: UserProfile,
    pub password_hash: String,
}

/// `GET /posts/{id}` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostWithReplies {
    pub post: Post,
    pub replies: Vec<Reply>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Date,
    Upvotes,
}

impl SortField {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "date" => Some(Self::Date),
            "upvotes" => Some(Self::Upvotes),
            _ => None,
        }
    }

    pub(crate) fn column(self) -> &'static str {
        match self {
            Self::Date => "created_at",
            Self::Upvotes => "upvotes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    pub(crate) fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}
