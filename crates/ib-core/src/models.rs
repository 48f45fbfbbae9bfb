//! # Domain Models
//!
//! These structs represent the core entities of Idea Board.
//! Identifiers are opaque strings handed out by the remote document store,
//! wrapped in newtypes so an idea id can never be passed where a user id is
//! expected.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Maximum comment length, counted in characters after trimming.
pub const MAX_COMMENT_CHARS: usize = 500;
/// Bio length bounds, counted in characters after trimming.
pub const MIN_BIO_CHARS: usize = 10;
pub const MAX_BIO_CHARS: usize = 500;

/// Author id recorded on content created without a session.
pub const ANONYMOUS_AUTHOR_ID: &str = "anonymous";
pub const ANONYMOUS_AUTHOR_NAME: &str = "Anonymous";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Document id of an idea in the remote store.
    IdeaId
);
string_id!(
    /// Identity-provider user id, also used as the author id.
    UserId
);
string_id!(
    /// Comment document id. Optimistic comments carry a local temporary id.
    CommentId
);

/// The fixed set of idea categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Technology,
    Business,
    Creative,
    Health,
    Education,
    Entertainment,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Technology,
        Category::Business,
        Category::Creative,
        Category::Health,
        Category::Education,
        Category::Entertainment,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Technology => "technology",
            Category::Business => "business",
            Category::Creative => "creative",
            Category::Health => "health",
            Category::Education => "education",
            Category::Entertainment => "entertainment",
            Category::Other => "other",
        }
    }

    /// Stored documents may carry no category or a retired one; both read as `Other`.
    pub fn from_stored(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AppError::Validation(format!("unknown category '{s}'")))
    }
}

/// Author reference embedded in ideas, comments, votes and bios.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: UserId,
    pub name: String,
}

impl Author {
    pub fn anonymous() -> Self {
        Self {
            id: UserId::from(ANONYMOUS_AUTHOR_ID),
            name: ANONYMOUS_AUTHOR_NAME.to_string(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.id.as_str() == ANONYMOUS_AUTHOR_ID
    }
}

/// A published idea as read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Idea {
    pub id: IdeaId,
    pub title: String,
    pub slug: String,
    pub category: Category,
    /// Plain-text description shown on cards and the detail view
    pub body: String,
    /// Optional markdown notes, rendered by the presentation layer
    pub notes: Option<String>,
    pub author: Author,
    pub published_at: DateTime<Utc>,
    /// upvotes minus downvotes; may be negative
    pub vote_tally: i64,
    pub comments_count: u32,
}

/// The editable part of an idea, used for both create and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IdeaDraft {
    pub title: String,
    pub body: String,
    pub category: Category,
    pub notes: Option<String>,
}

impl IdeaDraft {
    /// Trims the fields and rejects drafts missing a title or description.
    pub fn validated(self) -> Result<Self> {
        let title = self.title.trim().to_string();
        let body = self.body.trim().to_string();
        if title.is_empty() || body.is_empty() {
            return Err(AppError::Validation(
                "Title and description are required".into(),
            ));
        }
        let notes = self
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        Ok(Self {
            title,
            body,
            category: self.category,
            notes,
        })
    }

    pub fn slug(&self) -> String {
        slugify(&self.title)
    }
}

/// URL slug for a title: lowercase ASCII word characters and dashes, with
/// every whitespace run collapsed into a single dash.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut in_whitespace = false;
    for ch in title.to_lowercase().chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                slug.push('-');
            }
            in_whitespace = true;
        } else if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
            slug.push(ch);
            in_whitespace = false;
        }
    }
    slug
}

/// Direction of a single user's vote on an idea.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Upvote,
    Downvote,
}

impl VoteDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteDirection::Upvote => "upvote",
            VoteDirection::Downvote => "downvote",
        }
    }

    /// What a vote state adds to the idea's tally.
    pub fn contribution(vote: Option<VoteDirection>) -> i64 {
        match vote {
            Some(VoteDirection::Upvote) => 1,
            Some(VoteDirection::Downvote) => -1,
            None => 0,
        }
    }

    /// Tally change when a user's vote moves from `from` to `to`.
    pub fn delta(from: Option<VoteDirection>, to: Option<VoteDirection>) -> i64 {
        Self::contribution(to) - Self::contribution(from)
    }
}

impl fmt::Display for VoteDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteDirection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upvote" | "up" => Ok(VoteDirection::Upvote),
            "downvote" | "down" => Ok(VoteDirection::Downvote),
            other => Err(AppError::Validation(format!("unknown vote direction '{other}'"))),
        }
    }
}

/// A comment on an idea. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub idea_id: IdeaId,
    pub text: String,
    pub author: Author,
    pub created_at: DateTime<Utc>,
}

/// Ordering by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CommentOrder {
    /// Oldest first, used to rebuild full history
    OldestFirst,
    /// Newest first, used by the live feed
    #[default]
    NewestFirst,
}

/// Trims comment text and enforces the 1–500 character bound.
pub fn validate_comment_text(text: &str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Comment text is required".into()));
    }
    if trimmed.chars().count() > MAX_COMMENT_CHARS {
        return Err(AppError::Validation(format!(
            "Comment must be at most {MAX_COMMENT_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// An author's profile text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bio {
    pub id: String,
    pub text: String,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn validate_bio_text(text: &str) -> Result<String> {
    let trimmed = text.trim();
    let len = trimmed.chars().count();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Bio is required".into()));
    }
    if !(MIN_BIO_CHARS..=MAX_BIO_CHARS).contains(&len) {
        return Err(AppError::Validation(format!(
            "Bio must be between {MIN_BIO_CHARS} and {MAX_BIO_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Raw claims returned by the identity provider after sign-in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// A signed-in user, validated once at the identity boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub name: String,
}

impl AuthenticatedUser {
    pub fn new(id: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Builds a user from provider claims. The id is mandatory; a missing
    /// display name falls back to the e-mail local part.
    pub fn from_claims(claims: IdentityClaims) -> Result<Self> {
        let id = claims
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && id != ANONYMOUS_AUTHOR_ID)
            .ok_or_else(|| AppError::Unauthorized("identity provider returned no user id".into()))?;

        let name = claims
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .or_else(|| {
                claims
                    .email
                    .as_deref()
                    .and_then(|e| e.split('@').next())
                    .map(str::trim)
                    .filter(|local| !local.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "Anonymous User".to_string());

        Ok(Self {
            id: UserId::new(id),
            name,
        })
    }

    pub fn as_author(&self) -> Author {
        Author {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}
