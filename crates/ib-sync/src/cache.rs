//! # Entity Cache
//!
//! Last authoritative state per idea, exactly as the remote store reported
//! it. Nothing optimistic is ever written here.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ib_core::models::{Comment, CommentOrder, Idea, IdeaId, UserId, VoteDirection};

/// Authoritative votes and comments of one idea.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IdeaSnapshot {
    pub tally: i64,
    /// Known votes per user; a user absent from the map has not been fetched
    pub votes: HashMap<UserId, Option<VoteDirection>>,
    pub comments: Vec<Comment>,
    pub comment_order: CommentOrder,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl IdeaSnapshot {
    /// The user's stored vote; unknown reads as no vote.
    pub fn vote_of(&self, user: &UserId) -> Option<VoteDirection> {
        self.votes.get(user).copied().flatten()
    }
}

/// One fetch of an idea's engagement state.
#[derive(Debug, Clone, PartialEq)]
pub struct Refreshed {
    /// `None` when the tally was not part of this fetch
    pub tally: Option<i64>,
    pub viewer_vote: Option<(UserId, Option<VoteDirection>)>,
    /// `None` when comments were not part of this fetch
    pub comments: Option<(CommentOrder, Vec<Comment>)>,
}

#[derive(Debug, Default)]
pub struct EntityCache {
    ideas: DashMap<IdeaId, IdeaSnapshot>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the idea's snapshot; an idea never fetched reads as empty.
    pub fn snapshot(&self, idea: &IdeaId) -> IdeaSnapshot {
        self.ideas
            .get(idea)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, idea: &IdeaId) -> bool {
        self.ideas.contains_key(idea)
    }

    pub fn apply(&self, idea: &IdeaId, refreshed: Refreshed) {
        let mut snapshot = self.ideas.entry(idea.clone()).or_default();
        if let Some(tally) = refreshed.tally {
            snapshot.tally = tally;
        }
        if let Some((user, vote)) = refreshed.viewer_vote {
            snapshot.votes.insert(user, vote);
        }
        if let Some((order, comments)) = refreshed.comments {
            snapshot.comment_order = order;
            snapshot.comments = comments;
        }
        snapshot.refreshed_at = Some(Utc::now());
    }

    /// Seeds tallies from a feed listing without disturbing ideas that were
    /// already refreshed individually.
    pub fn observe_ideas(&self, ideas: &[Idea]) {
        for idea in ideas {
            self.ideas
                .entry(idea.id.clone())
                .or_insert_with(|| IdeaSnapshot {
                    tally: idea.vote_tally,
                    ..IdeaSnapshot::default()
                });
        }
    }

    pub fn len(&self) -> usize {
        self.ideas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ideas.is_empty()
    }
}
