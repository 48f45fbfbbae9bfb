//! # Core Traits (Ports)
//!
//! Any remote store plugin must implement these traits to be used by the
//! binary. Implementations are plain request/response: they keep no local
//! state about pending mutations.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Author, Bio, Comment, CommentOrder, Idea, IdeaDraft, IdeaId, UserId, VoteDirection,
};
use crate::query::IdeaQuery;

/// Idea, profile and bio persistence contract.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait IdeaRepo: Send + Sync {
    // Idea Operations
    async fn list_ideas(&self, query: &IdeaQuery) -> Result<Vec<Idea>>;
    /// Total number of ideas matching the filter, ignoring its page window.
    async fn count_ideas(&self, query: &IdeaQuery) -> Result<u64>;
    async fn get_idea(&self, id: &IdeaId) -> Result<Option<Idea>>;
    async fn ideas_by_author(&self, author_id: &UserId) -> Result<Vec<Idea>>;
    async fn create_idea(&self, draft: IdeaDraft, author: Author) -> Result<Idea>;
    async fn update_idea(&self, id: &IdeaId, draft: IdeaDraft) -> Result<Idea>;

    // Bio Operations
    async fn get_bio(&self, author_id: &UserId) -> Result<Option<Bio>>;
    async fn create_bio(&self, text: String, author: Author) -> Result<Bio>;
    async fn update_bio(&self, bio_id: &str, text: String) -> Result<Bio>;
}

/// Vote and comment contract: the remote side of every optimistic mutation.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait EngagementRepo: Send + Sync {
    /// Upvote count minus downvote count.
    async fn vote_tally(&self, idea: &IdeaId) -> Result<i64>;
    async fn user_vote(&self, idea: &IdeaId, user: &UserId) -> Result<Option<VoteDirection>>;
    /// Replaces any existing vote of `voter` on `idea`.
    async fn set_vote(&self, idea: &IdeaId, voter: &Author, direction: VoteDirection) -> Result<()>;
    async fn clear_vote(&self, idea: &IdeaId, user: &UserId) -> Result<()>;

    async fn list_comments(&self, idea: &IdeaId, order: CommentOrder) -> Result<Vec<Comment>>;
    async fn add_comment(&self, idea: &IdeaId, text: String, author: Author) -> Result<Comment>;
}
