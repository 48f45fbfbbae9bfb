//! Wire shapes of stored documents and their mapping to domain models.
//!
//! Stored documents are loosely typed: fields may be missing on records
//! written by older clients or the CMS. Mapping fills the gaps with the
//! same defaults the board has always shown (anonymous author, `other`
//! category, empty text).

use chrono::{DateTime, Utc};
use ib_core::error::{AppError, Result};
use ib_core::models::{
    Author, Bio, Category, Comment, CommentId, Idea, IdeaDraft, IdeaId, UserId, VoteDirection,
    ANONYMOUS_AUTHOR_ID, ANONYMOUS_AUTHOR_NAME,
};
use serde::Deserialize;
use serde_json::{json, Value};

pub const IDEA_TYPE: &str = "idea";
pub const COMMENT_TYPE: &str = "comment";
pub const VOTE_TYPE: &str = "vote";
pub const BIO_TYPE: &str = "bio";

/// Projection for idea cards and detail views, tallies included.
pub const IDEA_PROJECTION: &str = r#"{ _id, _createdAt, title, "slug": slug.current, category, notes, publishedAt, author, "text": body[0].children[0].text, "voteTally": count(*[_type == "vote" && ideaId == ^._id && direction == "upvote"]) - count(*[_type == "vote" && ideaId == ^._id && direction == "downvote"]), "commentsCount": count(*[_type == "comment" && ideaId == ^._id]) }"#;

pub const COMMENT_PROJECTION: &str = "{ _id, _createdAt, ideaId, text, author, createdAt }";

pub const BIO_PROJECTION: &str = "{ _id, _createdAt, _updatedAt, bio, author, createdAt, updatedAt }";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorDoc {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl AuthorDoc {
    fn into_author(self) -> Author {
        Author {
            id: UserId::new(non_blank(self.id).unwrap_or_else(|| ANONYMOUS_AUTHOR_ID.to_string())),
            name: non_blank(self.name).unwrap_or_else(|| ANONYMOUS_AUTHOR_NAME.to_string()),
        }
    }
}

fn author_json(author: &Author) -> Value {
    json!({ "id": author.id.as_str(), "name": author.name })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeaDoc {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_createdAt", default)]
    pub system_created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub author: Option<AuthorDoc>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub vote_tally: Option<i64>,
    #[serde(default)]
    pub comments_count: Option<u32>,
}

impl IdeaDoc {
    pub fn into_idea(self) -> Idea {
        let title = self.title.unwrap_or_default();
        let slug = non_blank(self.slug).unwrap_or_else(|| ib_core::models::slugify(&title));
        Idea {
            id: IdeaId::new(self.id),
            category: Category::from_stored(self.category.as_deref()),
            body: self.text.unwrap_or_default(),
            notes: non_blank(self.notes),
            author: self.author.unwrap_or_default().into_author(),
            published_at: self
                .published_at
                .or(self.system_created_at)
                .unwrap_or_default(),
            vote_tally: self.vote_tally.unwrap_or(0),
            comments_count: self.comments_count.unwrap_or(0),
            title,
            slug,
        }
    }
}

/// Portable-text body holding a single plain paragraph.
fn body_blocks(text: &str) -> Value {
    json!([{
        "_type": "block",
        "_key": "description",
        "style": "normal",
        "markDefs": [],
        "children": [{ "_type": "span", "_key": "span1", "text": text, "marks": [] }]
    }])
}

/// Editable fields shared by create and patch.
fn draft_fields(draft: &IdeaDraft) -> Value {
    json!({
        "title": draft.title,
        "slug": { "_type": "slug", "current": draft.slug() },
        "body": body_blocks(&draft.body),
        "notes": draft.notes.clone().unwrap_or_default(),
        "category": draft.category.as_str(),
    })
}

pub fn new_idea_document(draft: &IdeaDraft, author: &Author, published_at: DateTime<Utc>) -> Value {
    let mut doc = draft_fields(draft);
    if let Value::Object(fields) = &mut doc {
        fields.insert("_type".into(), json!(IDEA_TYPE));
        fields.insert("author".into(), author_json(author));
        fields.insert("publishedAt".into(), json!(published_at));
    }
    doc
}

pub fn idea_patch(draft: &IdeaDraft, updated_at: DateTime<Utc>) -> Value {
    let mut set = draft_fields(draft);
    if let Value::Object(fields) = &mut set {
        fields.insert("updatedAt".into(), json!(updated_at));
    }
    set
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDoc {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_createdAt", default)]
    pub system_created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub idea_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub author: Option<AuthorDoc>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl CommentDoc {
    /// `idea` fills in documents that predate the `ideaId` field.
    pub fn into_comment(self, idea: &IdeaId) -> Comment {
        Comment {
            id: CommentId::new(self.id),
            idea_id: self.idea_id.map(IdeaId::new).unwrap_or_else(|| idea.clone()),
            text: self.text.unwrap_or_default(),
            author: self.author.unwrap_or_default().into_author(),
            created_at: self.created_at.or(self.system_created_at).unwrap_or_default(),
        }
    }
}

pub fn new_comment_document(idea: &IdeaId, text: &str, author: &Author, at: DateTime<Utc>) -> Value {
    json!({
        "_type": COMMENT_TYPE,
        "ideaId": idea.as_str(),
        "text": text,
        "author": author_json(author),
        "createdAt": at,
    })
}

/// Deterministic vote document id: one document per (idea, user), so a
/// vote change is a single replace.
///
/// Ids containing a dot are private path ids in the dataset, so the id has
/// none. ASCII alphanumerics pass through and every other byte becomes
/// `-xx`; `_` only ever appears as the separator, which keeps distinct
/// pairs on distinct documents.
pub fn vote_document_id(idea: &IdeaId, user: &UserId) -> String {
    fn escape(raw: &str, out: &mut String) {
        for byte in raw.bytes() {
            if byte.is_ascii_alphanumeric() {
                out.push(char::from(byte));
            } else {
                out.push_str(&format!("-{byte:02x}"));
            }
        }
    }
    let mut id = String::from("vote-");
    escape(idea.as_str(), &mut id);
    id.push('_');
    escape(user.as_str(), &mut id);
    id
}

pub fn vote_document(idea: &IdeaId, voter: &Author, direction: VoteDirection, at: DateTime<Utc>) -> Value {
    json!({
        "_id": vote_document_id(idea, &voter.id),
        "_type": VOTE_TYPE,
        "ideaId": idea.as_str(),
        "user": author_json(voter),
        "direction": direction.as_str(),
        "updatedAt": at,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteDoc {
    #[serde(default)]
    pub direction: Option<String>,
}

impl VoteDoc {
    pub fn direction(&self) -> Result<Option<VoteDirection>> {
        self.direction
            .as_deref()
            .map(|d| {
                d.parse::<VoteDirection>()
                    .map_err(|_| AppError::Remote(format!("stored vote has direction '{d}'")))
            })
            .transpose()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BioDoc {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_createdAt", default)]
    pub system_created_at: Option<DateTime<Utc>>,
    #[serde(rename = "_updatedAt", default)]
    pub system_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub author: Option<AuthorDoc>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl BioDoc {
    pub fn into_bio(self) -> Bio {
        let created_at = self.created_at.or(self.system_created_at).unwrap_or_default();
        Bio {
            id: self.id,
            text: self.bio.unwrap_or_default(),
            author: self.author.unwrap_or_default().into_author(),
            created_at,
            updated_at: self
                .updated_at
                .or(self.system_updated_at)
                .unwrap_or(created_at),
        }
    }
}

pub fn new_bio_document(text: &str, author: &Author, at: DateTime<Utc>) -> Value {
    json!({
        "_type": BIO_TYPE,
        "bio": text,
        "author": author_json(author),
        "createdAt": at,
        "updatedAt": at,
    })
}

/// Decodes the document echoed back by a mutation.
pub fn decode_returned<T: serde::de::DeserializeOwned>(document: Option<Value>, id: &str) -> Result<T> {
    let document = document
        .ok_or_else(|| AppError::Remote(format!("mutation of {id} returned no document")))?;
    Ok(serde_json::from_value(document)?)
}
