//! # ib-store-memory
//!
//! In-process implementation of `IdeaRepo` and `EngagementRepo`.
//! Used by tests, offline demos and as the reference behaviour of the
//! remote store: one vote document per (idea, user), comments immutable,
//! tallies computed at read time.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ib_core::error::{AppError, Result};
use ib_core::models::{
    Author, Bio, Comment, CommentId, CommentOrder, Idea, IdeaDraft, IdeaId, UserId, VoteDirection,
};
use ib_core::query::IdeaQuery;
use ib_core::traits::{EngagementRepo, IdeaRepo};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct IdeaRecord {
    id: IdeaId,
    draft: IdeaDraft,
    slug: String,
    author: Author,
    published_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    ideas: DashMap<IdeaId, IdeaRecord>,
    comments: DashMap<IdeaId, Vec<Comment>>,
    /// One vote document per (idea, user)
    votes: DashMap<(IdeaId, UserId), VoteDirection>,
    bios: DashMap<UserId, Bio>,
    /// When set, every write fails as if the backend were unreachable
    offline: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::Remote("store unreachable".into()));
        }
        Ok(())
    }

    /// Inserts a comment with a caller-chosen timestamp, bypassing validation.
    /// Lets tests model comments written by other sessions.
    pub fn insert_comment_at(&self, idea: &IdeaId, text: &str, author: Author, at: DateTime<Utc>) -> Comment {
        let comment = Comment {
            id: CommentId::new(Uuid::new_v4().to_string()),
            idea_id: idea.clone(),
            text: text.to_string(),
            author,
            created_at: at,
        };
        self.comments
            .entry(idea.clone())
            .or_default()
            .push(comment.clone());
        comment
    }

    fn tally_of(&self, idea: &IdeaId) -> i64 {
        self.votes
            .iter()
            .filter(|v| &v.key().0 == idea)
            .map(|v| VoteDirection::contribution(Some(*v.value())))
            .sum()
    }

    fn materialize(&self, record: &IdeaRecord) -> Idea {
        Idea {
            id: record.id.clone(),
            title: record.draft.title.clone(),
            slug: record.slug.clone(),
            category: record.draft.category,
            body: record.draft.body.clone(),
            notes: record.draft.notes.clone(),
            author: record.author.clone(),
            published_at: record.published_at,
            vote_tally: self.tally_of(&record.id),
            comments_count: self.comments.get(&record.id).map_or(0, |c| c.len() as u32),
        }
    }

    fn sorted_ideas(&self, filter: impl Fn(&Idea) -> bool) -> Vec<Idea> {
        let mut ideas: Vec<Idea> = self
            .ideas
            .iter()
            .map(|r| self.materialize(r.value()))
            .filter(|i| filter(i))
            .collect();
        ideas.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        ideas
    }
}

#[async_trait]
impl IdeaRepo for InMemoryStore {
    async fn list_ideas(&self, query: &IdeaQuery) -> Result<Vec<Idea>> {
        Ok(self
            .sorted_ideas(|i| query.matches(i))
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn count_ideas(&self, query: &IdeaQuery) -> Result<u64> {
        Ok(self.sorted_ideas(|i| query.matches(i)).len() as u64)
    }

    async fn get_idea(&self, id: &IdeaId) -> Result<Option<Idea>> {
        Ok(self.ideas.get(id).map(|r| self.materialize(r.value())))
    }

    async fn ideas_by_author(&self, author_id: &UserId) -> Result<Vec<Idea>> {
        Ok(self.sorted_ideas(|i| &i.author.id == author_id))
    }

    async fn create_idea(&self, draft: IdeaDraft, author: Author) -> Result<Idea> {
        self.ensure_online()?;
        let record = IdeaRecord {
            id: IdeaId::new(Uuid::new_v4().to_string()),
            slug: draft.slug(),
            draft,
            author,
            published_at: Utc::now(),
        };
        let idea = self.materialize(&record);
        self.ideas.insert(record.id.clone(), record);
        debug!(id = %idea.id, "idea created");
        Ok(idea)
    }

    async fn update_idea(&self, id: &IdeaId, draft: IdeaDraft) -> Result<Idea> {
        self.ensure_online()?;
        let record = {
            let mut record = self
                .ideas
                .get_mut(id)
                .ok_or_else(|| AppError::not_found("idea", id))?;
            record.slug = draft.slug();
            record.draft = draft;
            record.clone()
        };
        Ok(self.materialize(&record))
    }

    async fn get_bio(&self, author_id: &UserId) -> Result<Option<Bio>> {
        Ok(self.bios.get(author_id).map(|b| b.value().clone()))
    }

    async fn create_bio(&self, text: String, author: Author) -> Result<Bio> {
        self.ensure_online()?;
        if self.bios.contains_key(&author.id) {
            return Err(AppError::Conflict(format!("bio already exists for {}", author.id)));
        }
        let now = Utc::now();
        let bio = Bio {
            id: Uuid::new_v4().to_string(),
            text,
            author: author.clone(),
            created_at: now,
            updated_at: now,
        };
        self.bios.insert(author.id, bio.clone());
        Ok(bio)
    }

    async fn update_bio(&self, bio_id: &str, text: String) -> Result<Bio> {
        self.ensure_online()?;
        let mut bio = self
            .bios
            .iter_mut()
            .find(|b| b.id == bio_id)
            .ok_or_else(|| AppError::not_found("bio", bio_id))?;
        bio.text = text;
        bio.updated_at = Utc::now();
        Ok(bio.clone())
    }
}

#[async_trait]
impl EngagementRepo for InMemoryStore {
    async fn vote_tally(&self, idea: &IdeaId) -> Result<i64> {
        Ok(self.tally_of(idea))
    }

    async fn user_vote(&self, idea: &IdeaId, user: &UserId) -> Result<Option<VoteDirection>> {
        Ok(self
            .votes
            .get(&(idea.clone(), user.clone()))
            .map(|v| *v.value()))
    }

    async fn set_vote(&self, idea: &IdeaId, voter: &Author, direction: VoteDirection) -> Result<()> {
        self.ensure_online()?;
        if voter.is_anonymous() {
            return Err(AppError::Unauthorized("Sign in to vote".into()));
        }
        self.votes.insert((idea.clone(), voter.id.clone()), direction);
        debug!(%idea, user = %voter.id, %direction, "vote stored");
        Ok(())
    }

    async fn clear_vote(&self, idea: &IdeaId, user: &UserId) -> Result<()> {
        self.ensure_online()?;
        self.votes.remove(&(idea.clone(), user.clone()));
        debug!(%idea, %user, "vote cleared");
        Ok(())
    }

    async fn list_comments(&self, idea: &IdeaId, order: CommentOrder) -> Result<Vec<Comment>> {
        let mut comments = self
            .comments
            .get(idea)
            .map(|c| c.value().clone())
            .unwrap_or_default();
        comments.sort_by_key(|c| c.created_at);
        if order == CommentOrder::NewestFirst {
            comments.reverse();
        }
        Ok(comments)
    }

    async fn add_comment(&self, idea: &IdeaId, text: String, author: Author) -> Result<Comment> {
        self.ensure_online()?;
        let text = ib_core::models::validate_comment_text(&text)?;
        Ok(self.insert_comment_at(idea, &text, author, Utc::now()))
    }
}
